use std::fmt::Display;

use xs_core::ScriptError;

fn map_error(code: &'static str, error: impl Display) -> ScriptError {
    ScriptError::new(code, error.to_string())
}

pub(crate) fn json_string(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("\"{}\"", text.escape_default()))
}

pub(crate) fn emit_error(error: ScriptError) -> i32 {
    println!("RESULT:ERROR");
    println!("ERROR_CODE:{}", error.code);
    println!("ERROR_MSG_JSON:{}", json_string(&error.message));
    1
}

pub(crate) fn map_cli_source_path(error: std::io::Error) -> ScriptError {
    map_error("CLI_SOURCE_PATH", error)
}

pub(crate) fn map_cli_source_scan(error: std::path::StripPrefixError) -> ScriptError {
    map_error("CLI_SOURCE_SCAN", error)
}

pub(crate) fn map_cli_source_read(error: std::io::Error) -> ScriptError {
    map_error("CLI_SOURCE_READ", error)
}

pub(crate) fn map_cli_worker_panic(worker: &str) -> ScriptError {
    ScriptError::new(
        "CLI_WORKER_PANIC",
        format!("Worker \"{}\" panicked.", worker),
    )
}
