use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::{debug, warn};
use mlua::{Function, Lua, MultiValue, Table, Value};

use super::class::ScriptClass;
use super::marshal::{marshal_args, variant_from_lua};
use super::modules::{RendererBinding, ACTIVE_RENDERER_KEY};
use super::reference::ScriptRef;
use super::{ScriptError, DRAW_FUNCTION, INIT_FUNCTION, RESET_FUNCTION, THINK_FUNCTION};
use crate::renderer::Renderer;
use crate::variant::{FunctionCall, Variant};

/// Name under which a script reaches its own instance table.
pub const GAME_BINDING: &str = "game";
/// Name of the renderer handle while `draw` runs.
pub const RENDERER_BINDING: &str = "renderer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Constructed,
    Live,
    Destroyed,
}

/// One game object's script state.
///
/// The object table starts with a copy of every class function, and bare
/// global reads and writes inside those functions resolve against it. A
/// failed call leaves the instance usable.
pub struct ScriptInstance {
    class: Rc<ScriptClass>,
    id: u64,
    object: Option<ScriptRef>,
    env: Option<ScriptRef>,
    generation: Cell<u64>,
    copied: RefCell<Vec<String>>,
    state: InstanceState,
}

impl ScriptInstance {
    pub fn new(class: &Rc<ScriptClass>) -> Result<Self, ScriptError> {
        if !class.is_loaded() {
            return Err(ScriptError::ClassNotLoaded(class.path()));
        }
        let vm = class.vm()?;
        let lua = vm.lua();

        let object = lua.create_table()?;
        let object_meta = lua.create_table()?;
        object_meta.set("__index", lua.globals())?;
        object.set_metatable(Some(object_meta));
        let copied = copy_functions(class, lua, &object, &[])?;

        let env = lua.create_table()?;
        env.raw_set(GAME_BINDING, object.clone())?;
        let env_meta = lua.create_table()?;
        env_meta.set("__index", object.clone())?;
        env_meta.set("__newindex", object.clone())?;
        env.set_metatable(Some(env_meta));

        let owner = Rc::downgrade(&vm);
        let mut instance = Self {
            class: Rc::clone(class),
            id: class.next_instance_id(),
            object: Some(ScriptRef::new(lua, owner.clone(), object)?),
            env: Some(ScriptRef::new(lua, owner, env)?),
            generation: Cell::new(class.generation()),
            copied: RefCell::new(copied),
            state: InstanceState::Constructed,
        };

        if !instance.run_hook(INIT_FUNCTION, &[]) {
            warn!("[script] init failed for {} #{}; instance kept", class.path().display(), instance.id);
        }
        instance.state = InstanceState::Live;
        Ok(instance)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn class(&self) -> &Rc<ScriptClass> {
        &self.class
    }

    pub fn think(&self, elapsed_seconds: f64, delta_seconds: f64) -> bool {
        self.run_hook(THINK_FUNCTION, &[Variant::Double(elapsed_seconds), Variant::Double(delta_seconds)])
    }

    /// Runs the script's `draw` with `renderer` bound for the length of the
    /// call only.
    pub fn render(&self, renderer: &mut dyn Renderer) -> bool {
        match self.render_with(renderer) {
            Ok(()) => true,
            Err(err) => self.report(DRAW_FUNCTION, err, true),
        }
    }

    pub fn reset(&self) -> bool {
        self.run_hook(RESET_FUNCTION, &[])
    }

    /// Generic named call. Unlike the lifecycle hooks, calling a function the
    /// class does not define reports failure.
    pub fn call_function(&self, call: &FunctionCall) -> bool {
        match self.invoke(call) {
            Ok(_) => true,
            Err(err) => self.report(&call.name, err, false),
        }
    }

    /// Like [`ScriptInstance::call_function`] but hands back the script's
    /// return values.
    pub fn invoke(&self, call: &FunctionCall) -> Result<Vec<Variant>, ScriptError> {
        self.call_named(&call.name, call.args())
    }

    /// Reads one field of the instance table without running script code.
    pub fn field(&self, name: &str) -> Result<Variant, ScriptError> {
        self.ensure_alive()?;
        let vm = self.class.vm()?;
        let object: Table = self.object_ref()?.get(vm.lua())?;
        let value: Value = object.raw_get(name)?;
        Ok(variant_from_lua(&value))
    }

    /// Releases the instance's registry slots. Later calls fail with
    /// [`ScriptError::InstanceDestroyed`].
    pub fn destroy(&mut self) {
        if self.state == InstanceState::Destroyed {
            return;
        }
        self.release_handles();
        self.state = InstanceState::Destroyed;
    }

    fn run_hook(&self, name: &str, args: &[Variant]) -> bool {
        match self.call_named(name, args) {
            Ok(_) => true,
            Err(err) => self.report(name, err, true),
        }
    }

    fn report(&self, name: &str, err: ScriptError, missing_ok: bool) -> bool {
        if err.is_missing_function() {
            debug!("[script] {} #{}: {err}", self.class.path().display(), self.id);
            return missing_ok;
        }
        warn!("[script] {}:{name} #{} failed: {err}", self.class.path().display(), self.id);
        false
    }

    fn call_named(&self, name: &str, args: &[Variant]) -> Result<Vec<Variant>, ScriptError> {
        self.ensure_alive()?;
        let vm = self.class.vm()?;
        let lua = vm.lua();
        let func = self.lookup(lua, name)?;
        let args = marshal_args(lua, name, args)?;
        self.bind(lua)?;
        let results = vm.try_call(&func, args)?;
        Ok(results.into_iter().map(|value| variant_from_lua(&value)).collect())
    }

    fn render_with(&self, renderer: &mut dyn Renderer) -> Result<(), ScriptError> {
        self.ensure_alive()?;
        let vm = self.class.vm()?;
        let lua = vm.lua();
        let func = self.lookup(lua, DRAW_FUNCTION)?;
        let env = self.bind(lua)?;
        lua.scope(|scope| {
            let binding = scope.create_nonstatic_userdata(RendererBinding::new(renderer))?;
            env.raw_set(RENDERER_BINDING, binding.clone())?;
            lua.set_named_registry_value(ACTIVE_RENDERER_KEY, binding)?;
            let outcome = vm.try_call(&func, MultiValue::new()).map(|_| ());
            env.raw_set(RENDERER_BINDING, Value::Nil)?;
            lua.unset_named_registry_value(ACTIVE_RENDERER_KEY)?;
            Ok(outcome)
        })?
    }

    fn lookup<'lua>(&self, lua: &'lua Lua, name: &str) -> Result<Function<'lua>, ScriptError> {
        self.class.function(lua, name)?.ok_or_else(|| ScriptError::FunctionNotDefined(name.to_string()))
    }

    /// Makes this instance the context of the class functions and refreshes
    /// the instance's function copies after a reload.
    fn bind<'lua>(&self, lua: &'lua Lua) -> Result<Table<'lua>, ScriptError> {
        let env: Table = self.env_ref()?.get(lua)?;
        let generation = self.class.generation();
        if self.generation.get() != generation {
            let object: Table = self.object_ref()?.get(lua)?;
            let stale = self.copied.borrow().clone();
            *self.copied.borrow_mut() = copy_functions(&self.class, lua, &object, &stale)?;
            self.generation.set(generation);
        }
        self.class.bind_instance(lua, self.id, &env)?;
        Ok(env)
    }

    fn ensure_alive(&self) -> Result<(), ScriptError> {
        match self.state {
            InstanceState::Destroyed => Err(ScriptError::InstanceDestroyed),
            _ => Ok(()),
        }
    }

    fn object_ref(&self) -> Result<&ScriptRef, ScriptError> {
        self.object.as_ref().ok_or(ScriptError::InstanceDestroyed)
    }

    fn env_ref(&self) -> Result<&ScriptRef, ScriptError> {
        self.env.as_ref().ok_or(ScriptError::InstanceDestroyed)
    }

    fn release_handles(&mut self) {
        self.class.unbind_instance(self.id);
        if let Some(object) = self.object.take() {
            object.release();
        }
        if let Some(env) = self.env.take() {
            env.release();
        }
    }
}

impl Drop for ScriptInstance {
    fn drop(&mut self) {
        self.release_handles();
    }
}

/// Copies the class functions into `object`, clearing names copied by an
/// earlier generation first. Returns the names now present.
fn copy_functions<'lua>(
    class: &ScriptClass,
    lua: &'lua Lua,
    object: &Table<'lua>,
    stale: &[String],
) -> Result<Vec<String>, ScriptError> {
    for name in stale {
        object.raw_set(name.as_str(), Value::Nil)?;
    }
    let mut names = Vec::new();
    for (name, func) in class.functions(lua)? {
        object.raw_set(name.as_str(), func)?;
        names.push(name);
    }
    Ok(names)
}
