use std::collections::HashMap;
use std::sync::Mutex;

use xs_core::{
    CommandBody, LoadKind, NativeModule, Script, ScriptElement, ScriptError, ScriptKind,
    ScriptSource, TestCaseBody,
};

use crate::context::TestContext;
use crate::host::{CommandExecutor, ScriptParser};

pub(crate) fn command_module(name: &str, elements: Vec<ScriptElement>) -> (ScriptSource, ScriptKind) {
    command_module_with_params(name, &[], elements)
}

pub(crate) fn command_module_with_params(
    name: &str,
    parameters: &[&str],
    elements: Vec<ScriptElement>,
) -> (ScriptSource, ScriptKind) {
    (
        ScriptSource::from_name(name),
        ScriptKind::CommandModule(CommandBody {
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
            elements,
        }),
    )
}

pub(crate) fn test_case(
    name: &str,
    elements: Vec<ScriptElement>,
    post_steps: Vec<ScriptElement>,
) -> (ScriptSource, ScriptKind) {
    (
        ScriptSource::from_name(name),
        ScriptKind::TestCase(TestCaseBody {
            elements,
            post_steps,
            base_url: None,
            disabled: false,
        }),
    )
}

pub(crate) fn native_module(
    name: &str,
    parameters: &[&str],
    implementation: &str,
) -> (ScriptSource, ScriptKind) {
    (
        ScriptSource::from_name(name),
        ScriptKind::NativeModule(NativeModule {
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
            implementation: implementation.to_string(),
        }),
    )
}

/// Parser over an in-memory set of scripts that counts how often each is parsed.
#[derive(Debug, Default)]
pub(crate) struct MemoryParser {
    scripts: HashMap<String, (ScriptSource, ScriptKind)>,
    parses: Mutex<HashMap<String, usize>>,
}

impl MemoryParser {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, (source, kind): (ScriptSource, ScriptKind)) -> Self {
        self.scripts.insert(source.name.clone(), (source, kind));
        self
    }

    pub(crate) fn parse_count(&self, name: &str) -> usize {
        self.parses
            .lock()
            .expect("parse counter lock")
            .get(name)
            .copied()
            .unwrap_or(0)
    }
}

impl ScriptParser for MemoryParser {
    fn parse(&self, _kind: LoadKind, name: &str) -> Result<Script, ScriptError> {
        *self
            .parses
            .lock()
            .expect("parse counter lock")
            .entry(name.to_string())
            .or_default() += 1;
        let (source, kind) = self.scripts.get(name).cloned().ok_or_else(|| {
            ScriptError::load("LOAD_NOT_FOUND", format!("Script \"{}\" does not exist.", name))
        })?;
        Ok(Script::new(source, kind))
    }
}

/// Executor that records every call and fails the commands it is told to fail.
///
/// `store` writes `value` under the variable named by `target`. Conditions are true
/// unless their resolved text is `false`.
#[derive(Debug, Default)]
pub(crate) struct RecordingExecutor {
    pub(crate) calls: Vec<String>,
    failures: HashMap<String, ScriptError>,
}

impl RecordingExecutor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing(mut self, command: &str, error: ScriptError) -> Self {
        self.failures.insert(command.to_string(), error);
        self
    }

    pub(crate) fn commands(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|call| call.strip_prefix("cmd:"))
            .collect()
    }
}

impl CommandExecutor for RecordingExecutor {
    fn do_command(
        &mut self,
        context: &TestContext,
        name: &str,
        target: &str,
        value: &str,
    ) -> Result<(), ScriptError> {
        self.calls.push(format!("cmd:{}|{}|{}", name, target, value));
        if let Some(error) = self.failures.get(name) {
            return Err(error.clone());
        }
        if name == "store" {
            context.store(value, target)?;
        }
        Ok(())
    }

    fn evaluates_to_true(
        &mut self,
        _context: &TestContext,
        expression: &str,
    ) -> Result<bool, ScriptError> {
        self.calls.push(format!("cond:{}", expression));
        if let Some(error) = self.failures.get("condition") {
            return Err(error.clone());
        }
        Ok(expression.trim() != "false")
    }

    fn start_action(&mut self, name: &str) {
        self.calls.push(format!("start:{}", name));
    }

    fn stop_action(&mut self) {
        self.calls.push("stop".to_string());
    }

    fn run_native_module(
        &mut self,
        _context: &TestContext,
        implementation: &str,
        arguments: &[Option<String>],
    ) -> Result<(), ScriptError> {
        let rendered = arguments
            .iter()
            .map(|argument| argument.as_deref().unwrap_or("<none>"))
            .collect::<Vec<_>>()
            .join(",");
        self.calls.push(format!("native:{}({})", implementation, rendered));
        if let Some(error) = self.failures.get(implementation) {
            return Err(error.clone());
        }
        Ok(())
    }
}
