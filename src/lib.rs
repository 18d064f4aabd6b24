pub mod cli;
pub mod config;
pub mod native_string;
pub mod package;
pub mod renderer;
pub mod runtime;
pub mod script_harness;
pub mod script_watch;
pub mod scripts;
pub mod time;
pub mod variant;

pub use native_string::NativeString;
pub use runtime::GameRuntime;
pub use scripts::{ScriptClass, ScriptError, ScriptInstance, VmHost};
pub use variant::{FunctionCall, Variant};
