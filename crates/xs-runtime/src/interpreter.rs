use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};
use xs_core::{
    CallCondition, Script, ScriptElement, ScriptElementKind, ScriptError, ScriptKind,
    TestCaseBody, TestData,
};

use crate::config::LineNumbering;
use crate::context::TestContext;
use crate::host::CommandExecutor;
use crate::runtime::ScriptRuntime;

/// Action opened implicitly when a command runs before any explicit action.
pub const DEFAULT_START_ACTION: &str = "OpenStartPage";

#[derive(Debug, Clone, PartialEq, Eq)]
enum ActionState {
    NotStarted,
    Running(String),
    Finished,
}

/// Walks one test case for one worker, dispatching commands to the executor.
pub struct ScriptInterpreter<'a> {
    runtime: &'a ScriptRuntime,
    context: Arc<TestContext>,
    executor: &'a mut dyn CommandExecutor,
    action: ActionState,
}

impl<'a> ScriptInterpreter<'a> {
    pub fn new(
        runtime: &'a ScriptRuntime,
        context: Arc<TestContext>,
        executor: &'a mut dyn CommandExecutor,
    ) -> Self {
        Self {
            runtime,
            context,
            executor,
            action: ActionState::NotStarted,
        }
    }

    pub fn context(&self) -> &TestContext {
        &self.context
    }

    pub fn execute_script(&mut self, name: &str) -> Result<(), ScriptError> {
        self.execute_script_with_data(name, None)
    }

    /// Runs the named test case. `data_set` becomes an extra frame below the test
    /// case's own data, so its values win over everything except stored values.
    pub fn execute_script_with_data(
        &mut self,
        name: &str,
        data_set: Option<TestData>,
    ) -> Result<(), ScriptError> {
        let test_case = self.runtime.loader().test_case(name)?;
        let Some(body) = test_case.as_test_case() else {
            return Err(ScriptError::load(
                "LOAD_KIND",
                format!("Script \"{}\" is not a test case.", name),
            ));
        };
        if body.disabled {
            warn!("Test case \"{}\" is disabled and will not be executed.", name);
            return Ok(());
        }

        let context = Arc::clone(&self.context);
        let _data_set = data_set.map(|data| context.enter_scope(Arc::new(data)));
        let _test_case_scope = context.enter_scope(self.runtime.data().data_for(&test_case.source));

        if context.base_url().trim().is_empty() {
            if let Some(url) = body.base_url.as_deref().filter(|url| !url.trim().is_empty()) {
                context.set_base_url(url);
            }
        }

        self.action = ActionState::NotStarted;
        let mut position = 0;
        let main = body
            .elements
            .iter()
            .try_for_each(|element| self.run_element(&test_case, element, 0, &mut position));
        let post_step_failures = self.run_post_steps(&test_case, body);
        self.finish_action();

        let failures = main
            .err()
            .into_iter()
            .chain(post_step_failures)
            .collect::<Vec<_>>();
        if failures.is_empty() {
            return Ok(());
        }
        Err(ScriptError::aggregate(
            "TESTCASE_FAILED",
            format!("Test case \"{}\" failed.", name),
            failures,
        ))
    }

    /// Post-steps all run; their positions continue after the main body.
    fn run_post_steps(&mut self, test_case: &Script, body: &TestCaseBody) -> Vec<ScriptError> {
        let mut failures = Vec::new();
        let mut offset = 0;
        for element in &body.post_steps {
            let mut position = test_case.size() + offset;
            if let Err(error) = self.run_element(test_case, element, 0, &mut position) {
                failures.push(error);
            }
            offset += 1;
            if element.is_module_call() {
                offset += self.callee_size(&element.name);
            }
        }
        failures
    }

    fn callee_size(&self, name: &str) -> usize {
        self.runtime
            .loader()
            .module(name)
            .map_or(0, |module| module.size())
    }

    fn line_number(&self, element: &ScriptElement, relative: usize) -> usize {
        match self.runtime.config().line_numbering {
            LineNumbering::ScriptDeveloper => relative,
            LineNumbering::File => element.line,
        }
    }

    fn run_element(
        &mut self,
        script: &Script,
        element: &ScriptElement,
        base: usize,
        position: &mut usize,
    ) -> Result<(), ScriptError> {
        *position += 1;
        let current = *position;
        let line = self.line_number(element, current - base);

        if element.disabled {
            info!(
                "Skipping disabled script element: {} '{}'",
                element.kind_name(),
                element.name
            );
            if element.is_module_call() {
                *position = current + self.runtime.loader().module(&element.name)?.size();
            }
            return Ok(());
        }

        match &element.kind {
            ScriptElementKind::Command { target, value } => {
                self.ensure_action_started();
                self.run_command(&element.name, target, value)
                    .map_err(|error| error.with_frame(script.trace_frame(element, line)))
            }
            ScriptElementKind::Action => {
                self.start_action(&element.name);
                Ok(())
            }
            ScriptElementKind::Comment => {
                info!(
                    "Skipping comment: {}",
                    element.name.split_whitespace().collect::<Vec<_>>().join(" ")
                );
                Ok(())
            }
            ScriptElementKind::ModuleCall {
                arguments,
                condition,
            } => {
                let callee = self.runtime.loader().module(&element.name)?;
                let proceed = self
                    .condition_holds(condition.as_ref())
                    .map_err(|error| error.with_frame(script.trace_frame(element, line)))?;
                if !proceed {
                    info!("Skipping module: {}", element.name);
                    return Ok(());
                }

                info!("Calling module: {}", element.name);
                self.call_module(&callee, arguments, position)
                    .map_err(|error| error.push_frame(script.trace_frame(element, line)))?;
                info!("Returned from module: {}", element.name);
                Ok(())
            }
        }
    }

    fn run_command(&mut self, name: &str, target: &str, value: &str) -> Result<(), ScriptError> {
        let mut target = self.context.resolve(target)?;
        let mut value = self.context.resolve(value)?;
        if self.runtime.config().is_value_only(name) {
            target = std::mem::take(&mut value);
        }

        debug!(command = name, target = %target, value = %value, "Executing command");
        self.executor
            .do_command(&self.context, name, &target, &value)
            .map_err(|error| {
                if error.is_assertion() {
                    error
                } else {
                    ScriptError::new(
                        "COMMAND_FAILED",
                        format!("Failed to execute command \"{}\": {}", name, error.message),
                    )
                    .caused_by(error)
                }
            })
    }

    fn condition_holds(&mut self, condition: Option<&CallCondition>) -> Result<bool, ScriptError> {
        let Some(condition) = condition.filter(|condition| !condition.disabled) else {
            return Ok(true);
        };
        let expression = self.context.resolve(&condition.expression)?;
        self.executor
            .evaluates_to_true(&self.context, &expression)
            .map_err(|error| {
                if error.is_assertion() {
                    error
                } else {
                    ScriptError::new(
                        "CONDITION_FAILED",
                        format!("Failed to evaluate condition \"{}\".", expression),
                    )
                    .caused_by(error)
                }
            })
    }

    fn call_module(
        &mut self,
        callee: &Script,
        arguments: &BTreeMap<String, String>,
        position: &mut usize,
    ) -> Result<(), ScriptError> {
        let base = *position;
        let context = Arc::clone(&self.context);
        let _scope = context.enter_scope(self.runtime.data().data_for(&callee.source));

        let resolved = arguments
            .iter()
            .map(|(name, expression)| Ok((name.clone(), context.resolve(expression)?)))
            .collect::<Result<BTreeMap<_, _>, ScriptError>>()?;

        match &callee.kind {
            ScriptKind::CommandModule(body) => body
                .bind(&resolved)
                .iter()
                .try_for_each(|element| self.run_element(callee, element, base, position)),
            ScriptKind::NativeModule(module) => {
                let ordered = module
                    .parameters
                    .iter()
                    .map(|parameter| resolved.get(parameter).cloned())
                    .collect::<Vec<_>>();
                debug!(implementation = %module.implementation, "Running native module");
                self.executor
                    .run_native_module(&context, &module.implementation, &ordered)
                    .map_err(|error| {
                        if error.is_assertion() {
                            error
                        } else {
                            ScriptError::new(
                                "NATIVE_MODULE_FAILED",
                                format!(
                                    "Failed to execute native module \"{}\".",
                                    module.implementation
                                ),
                            )
                            .caused_by(error)
                        }
                    })
            }
            ScriptKind::TestCase(_) => Err(ScriptError::load(
                "LOAD_KIND",
                format!(
                    "Script \"{}\" is a test case and cannot be called as a module.",
                    callee.name()
                ),
            )),
        }
    }

    fn ensure_action_started(&mut self) {
        if self.action == ActionState::NotStarted {
            self.start_action(DEFAULT_START_ACTION);
        }
    }

    fn start_action(&mut self, name: &str) {
        if matches!(self.action, ActionState::Running(_)) {
            self.executor.stop_action();
        }
        self.executor.start_action(name);
        self.action = ActionState::Running(name.to_string());
    }

    fn finish_action(&mut self) {
        if matches!(self.action, ActionState::Running(_)) {
            self.executor.stop_action();
        }
        self.action = ActionState::Finished;
    }
}
