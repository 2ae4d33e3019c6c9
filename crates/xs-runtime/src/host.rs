use std::sync::Arc;

use xs_core::{LoadKind, Script, ScriptError, ScriptSource, TestData};

use crate::context::TestContext;

/// Turns a script name into a parsed script.
pub trait ScriptParser: Send + Sync {
    fn parse(&self, kind: LoadKind, name: &str) -> Result<Script, ScriptError>;
}

/// Supplies the data a script or module brings into its own scope frame.
pub trait TestDataProvider: Send + Sync {
    fn data_for(&self, source: &ScriptSource) -> Arc<TestData>;

    /// Lowest-precedence data, consulted after the whole scope chain.
    fn global_data(&self) -> Arc<TestData> {
        Arc::default()
    }
}

#[derive(Debug, Default)]
pub struct EmptyTestDataProvider;

impl TestDataProvider for EmptyTestDataProvider {
    fn data_for(&self, _source: &ScriptSource) -> Arc<TestData> {
        Arc::default()
    }
}

/// The backend that performs commands against a driver.
///
/// Implementations receive the worker's [`TestContext`] so they can store values,
/// resolve text or run time-bounded work.
pub trait CommandExecutor {
    fn do_command(
        &mut self,
        context: &TestContext,
        name: &str,
        target: &str,
        value: &str,
    ) -> Result<(), ScriptError>;

    fn evaluates_to_true(
        &mut self,
        context: &TestContext,
        expression: &str,
    ) -> Result<bool, ScriptError>;

    fn start_action(&mut self, _name: &str) {}

    fn stop_action(&mut self) {}

    /// `arguments` follow the module's formal parameter order; unbound ones are `None`.
    fn run_native_module(
        &mut self,
        _context: &TestContext,
        implementation: &str,
        _arguments: &[Option<String>],
    ) -> Result<(), ScriptError> {
        Err(ScriptError::new(
            "NATIVE_MODULE_UNSUPPORTED",
            format!(
                "Executor cannot run native module implementation \"{}\".",
                implementation
            ),
        ))
    }
}
