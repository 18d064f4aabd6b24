use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::{debug, info, warn};
use mlua::{Function, Lua, LuaOptions, MultiValue, Result as LuaResult, StdLib, Value};

use super::class::ScriptClass;
use super::instance::ScriptInstance;
use super::reference::ScriptRef;
use super::{marshal, modules, ScriptError};
use crate::config::ScriptConfig;
use crate::package::normalize_path;
use crate::variant::Variant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmOptions {
    pub enable_jit: bool,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self { enable_jit: true }
    }
}

impl From<&ScriptConfig> for VmOptions {
    fn from(config: &ScriptConfig) -> Self {
        Self { enable_jit: config.enable_jit }
    }
}

/// One live interpreter. Shared by the host, its classes and their
/// instances; everything except the host holds it weakly.
pub struct ScriptVm {
    lua: Lua,
}

impl ScriptVm {
    fn open(options: VmOptions) -> LuaResult<Self> {
        let libs = StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::BIT | StdLib::JIT;
        let lua = Lua::new_with(libs, LuaOptions::default())?;
        let mode = if options.enable_jit { "jit.on()" } else { "jit.off()" };
        lua.load(mode).set_name("jit_mode").exec()?;
        modules::install(&lua)?;
        Ok(Self { lua })
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Bytes currently held by the interpreter. Diagnostics only.
    pub fn memory_usage(&self) -> usize {
        self.lua.used_memory()
    }

    /// Marshals one variant for a call into the VM.
    pub fn push_value<'lua>(&'lua self, variant: &Variant) -> LuaResult<Value<'lua>> {
        marshal::variant_to_lua(&self.lua, variant)
    }

    /// Protected call that reports failure instead of returning it. The error
    /// text is logged and dropped.
    pub fn protected_call<'lua>(&'lua self, func: &Function<'lua>, args: MultiValue<'lua>) -> bool {
        match self.try_call(func, args) {
            Ok(_) => true,
            Err(err) => {
                warn!("[script] {err}");
                false
            }
        }
    }

    pub fn try_call<'lua>(
        &'lua self,
        func: &Function<'lua>,
        args: MultiValue<'lua>,
    ) -> Result<MultiValue<'lua>, ScriptError> {
        func.call::<_, MultiValue>(args).map_err(|err| ScriptError::Runtime(err.to_string()))
    }
}

/// Owner of the interpreter and the per-file class cache.
pub struct VmHost {
    options: VmOptions,
    vm: Option<Rc<ScriptVm>>,
    classes: HashMap<PathBuf, Rc<ScriptClass>>,
}

impl VmHost {
    pub fn new(options: VmOptions) -> Self {
        Self { options, vm: None, classes: HashMap::new() }
    }

    /// Safe to call repeatedly; an already running VM is kept.
    pub fn initialize(&mut self) -> Result<(), ScriptError> {
        if self.vm.is_some() {
            return Ok(());
        }
        let vm = ScriptVm::open(self.options)?;
        info!("[script] VM started (jit: {}, {} bytes)", self.options.enable_jit, vm.memory_usage());
        self.vm = Some(Rc::new(vm));
        Ok(())
    }

    /// Drops every cached class and the interpreter. References still held
    /// elsewhere resolve to [`ScriptError::VmShutDown`] from here on.
    pub fn shutdown(&mut self) {
        let Some(vm) = self.vm.take() else {
            return;
        };
        debug!("[script] VM shutting down ({} classes, {} bytes)", self.classes.len(), vm.memory_usage());
        self.classes.clear();
        drop(vm);
    }

    pub fn is_running(&self) -> bool {
        self.vm.is_some()
    }

    pub fn vm(&self) -> Result<&Rc<ScriptVm>, ScriptError> {
        self.vm.as_ref().ok_or(ScriptError::NotInitialized)
    }

    pub fn memory_usage(&self) -> usize {
        self.vm.as_ref().map_or(0, |vm| vm.memory_usage())
    }

    /// Returns the class compiled from `path`, compiling it on first use.
    ///
    /// The class is cached before it compiles, so one file always maps to one
    /// class object however its path is spelled. Asking again for a class
    /// whose load failed retries the load in place.
    pub fn load_or_get_class(&mut self, path: impl AsRef<Path>) -> Result<Rc<ScriptClass>, ScriptError> {
        let path = path.as_ref();
        let vm = Rc::downgrade(self.vm()?);
        let key = normalize_path(path);
        if let Some(class) = self.classes.get(&key) {
            if !class.is_loaded() {
                class.load_from_file(path)?;
            }
            return Ok(Rc::clone(class));
        }

        let class = Rc::new(ScriptClass::new(vm));
        self.classes.insert(key, Rc::clone(&class));
        class.load_from_file(path)?;
        Ok(class)
    }

    pub fn cached_class(&self, path: impl AsRef<Path>) -> Option<Rc<ScriptClass>> {
        self.classes.get(&normalize_path(path.as_ref())).cloned()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Reloads the cached class for `path` if its contents changed. `None`
    /// when no class was loaded from that path.
    pub fn reload_path(&self, path: impl AsRef<Path>) -> Option<Result<bool, ScriptError>> {
        let class = self.cached_class(path)?;
        Some(class.reload_if_changed())
    }

    /// Roots `value` in the VM on behalf of host code.
    pub fn create_ref(&self, value: &Variant) -> Result<ScriptRef, ScriptError> {
        let vm = self.vm()?;
        let lua_value = vm.push_value(value)?;
        Ok(ScriptRef::new(vm.lua(), Rc::downgrade(vm), lua_value)?)
    }

    pub fn create_instance(&self, class: &Rc<ScriptClass>) -> Result<ScriptInstance, ScriptError> {
        self.vm()?;
        ScriptInstance::new(class)
    }

    pub fn destroy_instance(&self, mut instance: ScriptInstance) {
        instance.destroy();
    }
}

impl Default for VmHost {
    fn default() -> Self {
        Self::new(VmOptions::default())
    }
}

impl Drop for VmHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}
