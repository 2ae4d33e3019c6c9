use std::thread;
use std::time::Duration;

use rhai::{Dynamic, Engine};
use tracing::info;
use xs_core::ScriptError;
use xs_runtime::{CommandExecutor, TestContext};

/// Executor without a browser: it logs each command and implements the handful of
/// commands that only need the test context.
pub(crate) struct ConsoleExecutor {
    worker: String,
    engine: Engine,
    executed: usize,
}

impl ConsoleExecutor {
    pub(crate) fn new(worker: impl Into<String>) -> Self {
        let mut engine = Engine::new();
        engine.set_strict_variables(true);
        Self {
            worker: worker.into(),
            engine,
            executed: 0,
        }
    }

    pub(crate) fn executed(&self) -> usize {
        self.executed
    }
}

fn parse_millis(command: &str, text: &str) -> Result<i64, ScriptError> {
    text.trim().parse::<i64>().map_err(|_| {
        ScriptError::new(
            "CONSOLE_INVALID_ARGUMENT",
            format!("{} expects a number of milliseconds, got \"{}\".", command, text),
        )
    })
}

fn join_url(base: &str, target: &str) -> String {
    if base.is_empty() || target.contains("://") {
        return target.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        target.trim_start_matches('/')
    )
}

impl CommandExecutor for ConsoleExecutor {
    fn do_command(
        &mut self,
        context: &TestContext,
        name: &str,
        target: &str,
        value: &str,
    ) -> Result<(), ScriptError> {
        self.executed += 1;
        match name {
            // Text in the target, variable name in the value.
            "store" => context.store(value, target),
            "echo" => {
                info!(worker = %self.worker, "echo: {}", target);
                Ok(())
            }
            "open" => {
                info!(worker = %self.worker, "open: {}", join_url(&context.base_url(), target));
                Ok(())
            }
            "pause" => {
                let millis = parse_millis(name, target)?.max(0) as u64;
                context.call_and_wait(move || {
                    thread::sleep(Duration::from_millis(millis));
                    Ok(())
                })
            }
            "setTimeout" => {
                context.set_timeout_ms(parse_millis(name, target)?);
                Ok(())
            }
            "assertText" if target != value => Err(ScriptError::assertion(
                format!("Expected text \"{}\" but found \"{}\".", value, target),
            )),
            "assertNotText" if target == value => {
                Err(ScriptError::assertion(format!(
                    "Text \"{}\" should not match.",
                    target
                )))
            }
            _ => {
                info!(worker = %self.worker, command = name, target, value, "command");
                Ok(())
            }
        }
    }

    fn evaluates_to_true(
        &mut self,
        _context: &TestContext,
        expression: &str,
    ) -> Result<bool, ScriptError> {
        let value = self
            .engine
            .eval_expression::<Dynamic>(expression)
            .map_err(|error| ScriptError::new("CONSOLE_CONDITION_EVAL", error.to_string()))?;
        value.as_bool().map_err(|type_name| {
            ScriptError::new(
                "CONSOLE_BOOLEAN_EXPECTED",
                format!(
                    "Condition \"{}\" must evaluate to boolean, got {}.",
                    expression, type_name
                ),
            )
        })
    }

    fn start_action(&mut self, name: &str) {
        info!(worker = %self.worker, "action: {}", name);
    }
}

#[cfg(test)]
mod console_tests {
    use std::sync::Arc;

    use xs_runtime::RuntimeConfig;

    use super::*;

    fn context() -> TestContext {
        TestContext::new("w1", &RuntimeConfig::default(), Arc::default())
    }

    #[test]
    fn store_keeps_target_text_under_value_name() {
        let context = context();
        let mut console = ConsoleExecutor::new("w1");
        console
            .do_command(&context, "store", "hi", "greeting")
            .expect("store should pass");
        assert_eq!(context.resolve("${greeting}!").expect("resolve"), "hi!");
        assert_eq!(context.stored_value("hi"), None);
        assert_eq!(console.executed(), 1);

        let error = console
            .do_command(&context, "store", "greeting", "not a name")
            .expect_err("invalid variable name");
        assert_eq!(error.code, "SCOPE_INVALID_NAME");
    }

    #[test]
    fn store_text_is_only_logged_without_a_page() {
        let context = context();
        let mut console = ConsoleExecutor::new("w1");
        console
            .do_command(&context, "storeText", "id=title", "title")
            .expect("storeText should pass");
        assert_eq!(context.stored_value("title"), None);
    }

    #[test]
    fn text_assertions_compare_target_and_value() {
        let context = context();
        let mut console = ConsoleExecutor::new("w1");
        console
            .do_command(&context, "assertText", "a", "a")
            .expect("equal text passes");
        let error = console
            .do_command(&context, "assertText", "a", "b")
            .expect_err("different text fails");
        assert!(error.is_assertion());
        let error = console
            .do_command(&context, "assertNotText", "a", "a")
            .expect_err("equal text fails");
        assert!(error.is_assertion());
    }

    #[test]
    fn set_timeout_and_pause_use_the_context_timer() {
        let context = context();
        let mut console = ConsoleExecutor::new("w1");
        console
            .do_command(&context, "setTimeout", "20", "")
            .expect("setTimeout should pass");
        assert_eq!(context.timeout(), Duration::from_millis(20));

        let error = console
            .do_command(&context, "pause", "500", "")
            .expect_err("pause longer than timeout fails");
        assert_eq!(error.code, "TIMER_TIMEOUT");

        let error = console
            .do_command(&context, "pause", "soon", "")
            .expect_err("non-numeric pause fails");
        assert_eq!(error.code, "CONSOLE_INVALID_ARGUMENT");
    }

    #[test]
    fn conditions_are_rhai_boolean_expressions() {
        let context = context();
        let mut console = ConsoleExecutor::new("w1");
        assert!(console
            .evaluates_to_true(&context, "\"yes\" == \"yes\" && 2 > 1")
            .expect("eval"));
        assert!(!console.evaluates_to_true(&context, "false").expect("eval"));
        assert_eq!(
            console
                .evaluates_to_true(&context, "1 + 1")
                .expect_err("non-boolean")
                .code,
            "CONSOLE_BOOLEAN_EXPECTED"
        );
        assert_eq!(
            console
                .evaluates_to_true(&context, "unknown_name")
                .expect_err("strict variables")
                .code,
            "CONSOLE_CONDITION_EVAL"
        );
    }

    #[test]
    fn join_url_respects_absolute_targets() {
        assert_eq!(join_url("http://a/", "/b"), "http://a/b");
        assert_eq!(join_url("http://a", "https://c/d"), "https://c/d");
        assert_eq!(join_url("", "/b"), "/b");
    }
}
