use std::path::PathBuf;
use std::sync::Arc;

use xs_core::ScriptError;
use xs_runtime::{RuntimeConfig, ScriptRuntime};

mod script_files;
mod test_data;

pub use script_files::FileScriptParser;
pub use test_data::{FileTestDataProvider, GLOBAL_DATA_FILE, PACKAGE_DATA_NAME};

#[derive(Debug, Clone)]
pub struct CreateRuntimeOptions {
    pub scripts_dir: PathBuf,
    pub config: Option<RuntimeConfig>,
}

impl CreateRuntimeOptions {
    pub fn new(scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
            config: None,
        }
    }
}

/// Builds a runtime that reads scripts and their test data from `scripts_dir`.
pub fn create_runtime_from_dir(options: CreateRuntimeOptions) -> Result<ScriptRuntime, ScriptError> {
    let scripts_dir = options.scripts_dir;
    if !scripts_dir.exists() {
        return Err(ScriptError::new(
            "API_SCRIPTS_DIR_NOT_FOUND",
            format!("scripts-dir does not exist: {}", scripts_dir.display()),
        ));
    }
    if !scripts_dir.is_dir() {
        return Err(ScriptError::new(
            "API_SCRIPTS_DIR_NOT_DIR",
            format!("scripts-dir is not a directory: {}", scripts_dir.display()),
        ));
    }

    Ok(ScriptRuntime::new(
        options.config.unwrap_or_default(),
        Arc::new(FileScriptParser::new(&scripts_dir)),
        Arc::new(FileTestDataProvider::new(&scripts_dir)),
    ))
}
