use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad classification of a failure; the interpreter uses it to decide whether a
/// failure is passed through unchanged or wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    Script,
    Assertion,
    Resolution,
    Load,
    Timeout,
    Aggregate,
}

/// One script-relative diagnostic frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceFrame {
    pub package: String,
    pub element: String,
    pub file: String,
    pub line: usize,
}

impl std::fmt::Display for TraceFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.package.is_empty() {
            write!(f, "at {}({}:{})", self.element, self.file, self.line)
        } else {
            write!(
                f,
                "at {}.{}({}:{})",
                self.package, self.element, self.file, self.line
            )
        }
    }
}

#[derive(Debug, Error, Clone)]
#[error("{code}: {message}")]
pub struct ScriptError {
    pub code: String,
    pub message: String,
    pub kind: FailureKind,
    /// Deepest frame first; call sites are appended as the failure propagates outward.
    pub trace: Vec<TraceFrame>,
    pub suppressed: Vec<ScriptError>,
    #[source]
    pub cause: Option<Box<ScriptError>>,
}

impl ScriptError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_kind(FailureKind::Script, code, message)
    }

    pub fn with_kind(
        kind: FailureKind,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            kind,
            trace: Vec::new(),
            suppressed: Vec::new(),
            cause: None,
        }
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Self::with_kind(FailureKind::Assertion, "ASSERTION_FAILED", message)
    }

    pub fn resolution(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_kind(FailureKind::Resolution, code, message)
    }

    pub fn load(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_kind(FailureKind::Load, code, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::with_kind(FailureKind::Timeout, "TIMER_TIMEOUT", message)
    }

    pub fn aggregate(
        code: impl Into<String>,
        message: impl Into<String>,
        failures: Vec<ScriptError>,
    ) -> Self {
        let mut error = Self::with_kind(FailureKind::Aggregate, code, message);
        error.suppressed = failures;
        error
    }

    pub fn is_assertion(&self) -> bool {
        self.kind == FailureKind::Assertion
    }

    pub fn caused_by(mut self, cause: ScriptError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Discards whatever frames are present and keeps `frame` as the only one.
    pub fn with_frame(mut self, frame: TraceFrame) -> Self {
        self.trace.clear();
        self.trace.push(frame);
        self
    }

    pub fn push_frame(mut self, frame: TraceFrame) -> Self {
        self.trace.push(frame);
        self
    }

    /// Multi-line rendering including frames, causes and suppressed failures.
    pub fn report(&self) -> String {
        let mut out = String::new();
        self.write_report(&mut out, 0);
        out
    }

    fn write_report(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        out.push_str(&format!("{}{}\n", indent, self));
        for frame in &self.trace {
            out.push_str(&format!("{}    {}\n", indent, frame));
        }
        if let Some(cause) = &self.cause {
            out.push_str(&format!("{}Caused by:\n", indent));
            cause.write_report(out, depth + 1);
        }
        for suppressed in &self.suppressed {
            out.push_str(&format!("{}Suppressed:\n", indent));
            suppressed.write_report(out, depth + 1);
        }
    }
}
