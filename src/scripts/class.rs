use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use log::{info, warn};
use mlua::{Error as LuaError, Function, Lua, MultiValue, Table, Value};

use super::host::ScriptVm;
use super::modules::set_function_env;
use super::reference::ScriptRef;
use super::ScriptError;
use crate::package;

const CHUNK_NAME: &str = "main";

type FunctionTable = Rc<RefCell<BTreeMap<String, ScriptRef>>>;

/// A script file compiled into a set of named functions.
///
/// Scripts never call a registration API. Every top-level assignment of a
/// function lands in an intercepted environment and is recorded here, and
/// anything that is not a function is rejected with `functions only`.
///
/// Once the chunk has run the capture hook is detached: the definition
/// environment then forwards reads and writes to the instance currently
/// bound, so chunk-level local helpers see instance state too.
pub struct ScriptClass {
    vm: Weak<ScriptVm>,
    path: RefCell<PathBuf>,
    functions: FunctionTable,
    forward: RefCell<Option<ScriptRef>>,
    source_hash: Cell<Option<blake3::Hash>>,
    loaded: Cell<bool>,
    generation: Cell<u64>,
    bound_instance: Cell<Option<u64>>,
    next_instance_id: Cell<u64>,
}

impl ScriptClass {
    pub(crate) fn new(vm: Weak<ScriptVm>) -> Self {
        Self {
            vm,
            path: RefCell::new(PathBuf::new()),
            functions: Rc::new(RefCell::new(BTreeMap::new())),
            forward: RefCell::new(None),
            source_hash: Cell::new(None),
            loaded: Cell::new(false),
            generation: Cell::new(0),
            bound_instance: Cell::new(None),
            next_instance_id: Cell::new(1),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.path.borrow().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.get()
    }

    /// Bumped on every successful load; instances use it to refresh their
    /// function copies after a hot reload.
    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    pub fn function_names(&self) -> Vec<String> {
        self.functions.borrow().keys().cloned().collect()
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.borrow().contains_key(name)
    }

    pub fn function_count(&self) -> usize {
        self.functions.borrow().len()
    }

    /// Compiles and runs `path`, replacing every previously defined function.
    /// On failure the class is left with no functions.
    pub fn load_from_file(&self, path: impl AsRef<Path>) -> Result<(), ScriptError> {
        let path = path.as_ref();
        *self.path.borrow_mut() = path.to_path_buf();
        self.reset_functions();
        let source = package::open_file(path).map_err(|source| ScriptError::Read { path: path.to_path_buf(), source })?;
        self.apply_source(path, &source)
    }

    /// Builds the class from source bytes that were already read, using
    /// `path` as the identity for later reloads.
    pub fn load_from_source(&self, path: impl AsRef<Path>, source: &[u8]) -> Result<(), ScriptError> {
        let path = path.as_ref();
        *self.path.borrow_mut() = path.to_path_buf();
        self.reset_functions();
        self.apply_source(path, source)
    }

    /// Re-runs the load against the recorded path.
    pub fn reload(&self) -> Result<(), ScriptError> {
        let path = self.path();
        if path.as_os_str().is_empty() {
            return Err(ScriptError::ClassNotLoaded(path));
        }
        self.load_from_file(&path)
    }

    /// Reloads only when the file's contents differ from the last successful
    /// load. Returns whether a reload happened.
    pub fn reload_if_changed(&self) -> Result<bool, ScriptError> {
        let path = self.path();
        if path.as_os_str().is_empty() {
            return Err(ScriptError::ClassNotLoaded(path));
        }
        let source = package::open_file(&path).map_err(|source| ScriptError::Read { path: path.clone(), source })?;
        if self.is_loaded() && self.source_hash.get() == Some(blake3::hash(&source)) {
            return Ok(false);
        }
        self.reset_functions();
        self.apply_source(&path, &source).map(|()| true)
    }

    fn apply_source(&self, path: &Path, source: &[u8]) -> Result<(), ScriptError> {
        let result = self.compile_and_run(path, source);
        match &result {
            Ok(()) => {
                self.source_hash.set(Some(blake3::hash(source)));
                self.loaded.set(true);
                self.generation.set(self.generation.get() + 1);
                info!("[script] loaded {} ({} functions)", path.display(), self.function_count());
            }
            Err(err) => {
                self.reset_functions();
                warn!("[script] failed to load {}: {err}", path.display());
            }
        }
        result
    }

    fn compile_and_run(&self, path: &Path, source: &[u8]) -> Result<(), ScriptError> {
        if source.is_empty() {
            return Err(ScriptError::EmptySource(path.to_path_buf()));
        }
        let vm = self.vm()?;
        let lua = vm.lua();
        let env = self.definition_env(lua)?;
        let chunk = lua
            .load(source)
            .set_name(CHUNK_NAME)
            .set_environment(env.clone())
            .into_function()
            .map_err(|err| ScriptError::Compile { path: path.to_path_buf(), message: err.to_string() })?;
        let outcome = vm.try_call(&chunk, MultiValue::new());
        let forward = self.seal_definition_env(lua, &env)?;
        match outcome {
            Ok(_) => {
                *self.forward.borrow_mut() = Some(forward);
                Ok(())
            }
            Err(err) => {
                forward.release();
                Err(err)
            }
        }
    }

    /// Replaces the capture hook with a forwarding metatable. Until an
    /// instance is bound it forwards to the VM globals.
    fn seal_definition_env<'lua>(&self, lua: &'lua Lua, env: &Table<'lua>) -> Result<ScriptRef, ScriptError> {
        let forward = lua.create_table()?;
        forward.raw_set("__index", lua.globals())?;
        forward.raw_set("__newindex", lua.globals())?;
        env.set_metatable(Some(forward.clone()));
        Ok(ScriptRef::new(lua, self.vm.clone(), forward)?)
    }

    /// Environment for the top-level chunk: reads fall through to the VM
    /// globals, writes go through the capture hook.
    fn definition_env<'lua>(&self, lua: &'lua Lua) -> Result<Table<'lua>, ScriptError> {
        let env = lua.create_table()?;
        let meta = lua.create_table()?;
        meta.set("__index", lua.globals())?;

        let functions = Rc::clone(&self.functions);
        let owner = self.vm.clone();
        let capture = lua.create_function(move |lua, (_env, name, value): (Table, String, Value)| {
            let Value::Function(func) = value else {
                return Err(LuaError::RuntimeError("functions only".to_string()));
            };
            set_function_env(lua, &func, &lua.globals())?;
            let reference = ScriptRef::new(lua, owner.clone(), func)?;
            let previous = functions.borrow_mut().insert(name, reference);
            if let Some(previous) = previous {
                previous.release();
            }
            Ok(())
        })?;
        meta.set("__newindex", capture)?;
        env.set_metatable(Some(meta));
        Ok(env)
    }

    fn reset_functions(&self) {
        let previous = std::mem::take(&mut *self.functions.borrow_mut());
        for reference in previous.into_values() {
            reference.release();
        }
        if let Some(forward) = self.forward.borrow_mut().take() {
            forward.release();
        }
        self.loaded.set(false);
        self.bound_instance.set(None);
    }

    pub(crate) fn vm(&self) -> Result<Rc<ScriptVm>, ScriptError> {
        self.vm.upgrade().ok_or(ScriptError::VmShutDown)
    }

    pub(crate) fn function<'lua>(&self, lua: &'lua Lua, name: &str) -> Result<Option<Function<'lua>>, ScriptError> {
        let functions = self.functions.borrow();
        match functions.get(name) {
            Some(reference) => reference.get(lua).map(Some),
            None => Ok(None),
        }
    }

    pub(crate) fn functions<'lua>(&self, lua: &'lua Lua) -> Result<Vec<(String, Function<'lua>)>, ScriptError> {
        let functions = self.functions.borrow();
        functions
            .iter()
            .map(|(name, reference)| -> Result<_, ScriptError> { Ok((name.clone(), reference.get::<Function>(lua)?)) })
            .collect()
    }

    /// Points every class function at `env`. Skipped when the same instance
    /// was bound last and nothing was reloaded since.
    pub(crate) fn bind_instance<'lua>(&self, lua: &'lua Lua, instance: u64, env: &Table<'lua>) -> Result<(), ScriptError> {
        if self.bound_instance.get() == Some(instance) {
            return Ok(());
        }
        for (_, func) in self.functions(lua)? {
            set_function_env(lua, &func, env)?;
        }
        if let Some(reference) = self.forward.borrow().as_ref() {
            let forward: Table = reference.get(lua)?;
            forward.raw_set("__index", env.clone())?;
            forward.raw_set("__newindex", env.clone())?;
        }
        self.bound_instance.set(Some(instance));
        Ok(())
    }

    pub(crate) fn unbind_instance(&self, instance: u64) {
        if self.bound_instance.get() == Some(instance) {
            self.bound_instance.set(None);
        }
    }

    pub(crate) fn next_instance_id(&self) -> u64 {
        let id = self.next_instance_id.get();
        self.next_instance_id.set(id + 1);
        id
    }
}

impl fmt::Debug for ScriptClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptClass")
            .field("path", &self.path())
            .field("loaded", &self.is_loaded())
            .field("functions", &self.function_names())
            .finish()
    }
}
