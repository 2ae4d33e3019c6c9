use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use xs_core::ScriptError;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_IMPLICIT_TIMEOUT_MS: u64 = 1_000;

/// Commands that take their single argument from `value`; it is passed on as the target.
pub const VALUE_ONLY_COMMANDS: [&str; 15] = [
    "assertLoadTime",
    "assertNotTextPresent",
    "assertNotTitle",
    "assertPageSize",
    "assertTextPresent",
    "assertTitle",
    "echo",
    "open",
    "pause",
    "setTimeout",
    "storeTitle",
    "waitForTextPresent",
    "waitForTitle",
    "waitForNotTextPresent",
    "waitForNotTitle",
];

/// How failure positions are reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LineNumbering {
    /// Structural step position relative to the enclosing script.
    #[default]
    ScriptDeveloper,
    /// Line of the element in its source file.
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    pub default_timeout_ms: u64,
    pub default_implicit_timeout_ms: u64,
    pub line_numbering: LineNumbering,
    pub value_only_commands: BTreeSet<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            default_implicit_timeout_ms: DEFAULT_IMPLICIT_TIMEOUT_MS,
            line_numbering: LineNumbering::default(),
            value_only_commands: VALUE_ONLY_COMMANDS.iter().map(|name| name.to_string()).collect(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ScriptError> {
        serde_json::from_str(text)
            .map_err(|error| ScriptError::new("CONFIG_INVALID", error.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ScriptError> {
        let text = fs::read_to_string(path).map_err(|error| {
            ScriptError::new(
                "CONFIG_READ",
                format!("{}: {}", path.display(), error),
            )
        })?;
        Self::from_json_str(&text)
    }

    pub fn is_value_only(&self, command: &str) -> bool {
        self.value_only_commands.contains(command)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}
