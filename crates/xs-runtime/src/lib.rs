mod config;
mod context;
mod host;
mod interpreter;
mod loader;
mod macros;
mod runtime;
mod scope;
#[cfg(test)]
mod test_support;
mod timer;

pub use config::{LineNumbering, RuntimeConfig, DEFAULT_IMPLICIT_TIMEOUT_MS, DEFAULT_TIMEOUT_MS, VALUE_ONLY_COMMANDS};
pub use context::{ScopeGuard, TestContext};
pub use host::{CommandExecutor, EmptyTestDataProvider, ScriptParser, TestDataProvider};
pub use interpreter::{ScriptInterpreter, DEFAULT_START_ACTION};
pub use loader::ScriptLoader;
pub use macros::{MacroFn, MacroProcessor};
pub use runtime::ScriptRuntime;
pub use scope::{is_valid_variable_name, ScopeStack, MAX_RESOLVE_ITERATIONS};
pub use timer::TimedExecutor;
