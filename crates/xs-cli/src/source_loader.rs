use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;
use xs_core::{ScriptError, ScriptSource};
use xs_parser::parse_script_xml;

use crate::{map_cli_source_path, map_cli_source_read, map_cli_source_scan};

pub(crate) fn resolve_scripts_dir(scripts_dir: &str) -> Result<PathBuf, ScriptError> {
    let path = PathBuf::from(scripts_dir);
    let absolute = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .map_err(map_cli_source_path)?
            .join(path)
    };

    if !absolute.exists() {
        return Err(ScriptError::new(
            "CLI_SOURCE_NOT_FOUND",
            format!("scripts-dir does not exist: {}", absolute.display()),
        ));
    }

    if !absolute.is_dir() {
        return Err(ScriptError::new(
            "CLI_SOURCE_NOT_DIR",
            format!("scripts-dir is not a directory: {}", absolute.display()),
        ));
    }

    Ok(absolute)
}

/// `a/b/C.xml` -> `a.b.C`
pub(crate) fn script_name_from_relative(relative: &Path) -> String {
    relative
        .with_extension("")
        .to_string_lossy()
        .replace(['\\', '/'], ".")
}

/// Names of every parseable test case under `scripts_dir`, sorted. Data files and
/// modules are skipped; unparseable files are skipped with a debug note.
pub(crate) fn list_test_cases(scripts_dir: &Path) -> Result<Vec<String>, ScriptError> {
    let mut names = Vec::new();

    for entry in WalkDir::new(scripts_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("xml") {
            continue;
        }

        let relative = path.strip_prefix(scripts_dir).map_err(map_cli_source_scan)?;
        let name = script_name_from_relative(relative);
        let text = fs::read_to_string(path).map_err(map_cli_source_read)?;
        match parse_script_xml(ScriptSource::from_name(&name), &text) {
            Ok(script) if script.as_test_case().is_some() => names.push(name),
            Ok(_) => {}
            Err(error) => debug!("Skipping {}: {}", path.display(), error),
        }
    }

    names.sort();
    Ok(names)
}
