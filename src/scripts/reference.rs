use std::fmt;
use std::rc::{Rc, Weak};

use log::debug;
use mlua::{FromLua, IntoLua, Lua, RegistryKey, Result as LuaResult, Value};

use super::host::ScriptVm;
use super::marshal::variant_from_lua;
use super::ScriptError;
use crate::variant::Variant;

/// A Lua value rooted in the VM registry on behalf of host code.
///
/// The handle only holds a weak link to its VM, so resolving it after the
/// host shut down reports [`ScriptError::VmShutDown`].
pub struct ScriptRef {
    key: RegistryKey,
    vm: Weak<ScriptVm>,
}

impl ScriptRef {
    pub(crate) fn new<'lua>(lua: &'lua Lua, vm: Weak<ScriptVm>, value: impl IntoLua<'lua>) -> LuaResult<Self> {
        let key = lua.create_registry_value(value)?;
        Ok(Self { key, vm })
    }

    pub fn is_valid(&self) -> bool {
        self.vm.strong_count() > 0
    }

    /// Re-materializes the rooted value.
    pub(crate) fn get<'lua, T: FromLua<'lua>>(&self, lua: &'lua Lua) -> Result<T, ScriptError> {
        if !self.is_valid() || !lua.owns_registry_value(&self.key) {
            return Err(ScriptError::VmShutDown);
        }
        Ok(lua.registry_value(&self.key)?)
    }

    /// Reads the rooted value back as a [`Variant`]. Tables and functions
    /// come back as `None`.
    pub fn to_variant(&self) -> Result<Variant, ScriptError> {
        let vm = self.vm()?;
        let value: Value = self.get(vm.lua())?;
        Ok(variant_from_lua(&value))
    }

    pub(crate) fn vm(&self) -> Result<Rc<ScriptVm>, ScriptError> {
        self.vm.upgrade().ok_or(ScriptError::VmShutDown)
    }

    /// Frees the registry slot now instead of at the VM's next sweep.
    pub fn release(self) {
        let Some(vm) = self.vm.upgrade() else {
            return;
        };
        if let Err(err) = vm.lua().remove_registry_value(self.key) {
            debug!("[script] registry release failed: {err}");
        }
    }
}

impl fmt::Debug for ScriptRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptRef").field("valid", &self.is_valid()).finish_non_exhaustive()
    }
}
