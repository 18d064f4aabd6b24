//! Lua scripting core: VM host, script classes and per-object instances.
//!
//! A [`VmHost`] owns one LuaJIT state. Script files are compiled into
//! [`ScriptClass`]es, which discover their functions from plain top-level
//! assignments. Each game object gets a [`ScriptInstance`] that carries its own
//! state table and receives `init`/`think`/`draw`/`reset` and named calls.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub mod class;
pub mod host;
pub mod instance;
pub mod marshal;
pub mod modules;
pub mod reference;

pub use class::ScriptClass;
pub use host::{ScriptVm, VmHost, VmOptions};
pub use instance::{InstanceState, ScriptInstance};
pub use reference::ScriptRef;

pub const INIT_FUNCTION: &str = "init";
pub const THINK_FUNCTION: &str = "think";
pub const DRAW_FUNCTION: &str = "draw";
pub const RESET_FUNCTION: &str = "reset";

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script VM has not been initialized")]
    NotInitialized,
    #[error("script VM was shut down")]
    VmShutDown,
    #[error("reading {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("script {} is empty", .0.display())]
    EmptySource(PathBuf),
    #[error("compiling {}: {message}", path.display())]
    Compile { path: PathBuf, message: String },
    #[error("{0}")]
    Runtime(String),
    #[error("function '{0}' is not defined")]
    FunctionNotDefined(String),
    #[error("argument {index} of '{function}' could not be marshaled: {message}")]
    Marshal { function: String, index: usize, message: String },
    #[error("script instance was destroyed")]
    InstanceDestroyed,
    #[error("script class {} is not loaded", .0.display())]
    ClassNotLoaded(PathBuf),
    #[error(transparent)]
    Lua(#[from] mlua::Error),
}

impl ScriptError {
    /// Missing functions are expected for optional hooks and are not script faults.
    pub fn is_missing_function(&self) -> bool {
        matches!(self, ScriptError::FunctionNotDefined(_))
    }
}
