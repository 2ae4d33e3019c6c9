use serde::Serialize;
use xs_core::{FailureKind, ScriptError, TraceFrame};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WorkerFailure {
    pub(crate) worker: String,
    pub(crate) code: String,
    pub(crate) kind: FailureKind,
    pub(crate) message: String,
    pub(crate) trace: Vec<TraceFrame>,
    pub(crate) report: String,
}

impl WorkerFailure {
    pub(crate) fn from_error(worker: &str, error: &ScriptError) -> Self {
        Self {
            worker: worker.to_string(),
            code: error.code.clone(),
            kind: error.kind,
            message: error.message.clone(),
            trace: error.trace.clone(),
            report: error.report(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct WorkerOutcome {
    pub(crate) worker: String,
    pub(crate) commands: usize,
    pub(crate) failure: Option<ScriptError>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RunSummary {
    pub(crate) test_case: String,
    pub(crate) size: usize,
    pub(crate) workers: usize,
    pub(crate) passed: usize,
    pub(crate) failed: usize,
    pub(crate) commands: usize,
    pub(crate) elapsed_ms: u128,
}

impl RunSummary {
    pub(crate) fn is_success(&self) -> bool {
        self.failed == 0
    }
}
