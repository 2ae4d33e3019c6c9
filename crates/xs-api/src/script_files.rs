use std::fs;
use std::path::{Path, PathBuf};

use xs_core::{LoadKind, Script, ScriptError, ScriptSource};
use xs_parser::parse_script_xml;
use xs_runtime::ScriptParser;

/// Reads scripts from a directory tree: `a.b.C` lives at `<root>/a/b/C.xml`.
#[derive(Debug, Clone)]
pub struct FileScriptParser {
    scripts_dir: PathBuf,
}

impl FileScriptParser {
    pub fn new(scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
        }
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    pub fn script_path(&self, name: &str) -> PathBuf {
        self.scripts_dir.join(ScriptSource::from_name(name).path)
    }
}

impl ScriptParser for FileScriptParser {
    fn parse(&self, kind: LoadKind, name: &str) -> Result<Script, ScriptError> {
        let source = ScriptSource::from_name(name);
        let path = self.scripts_dir.join(&source.path);
        if !path.is_file() {
            return Err(ScriptError::load(
                "LOAD_NOT_FOUND",
                format!(
                    "No {} script \"{}\" found at {}.",
                    kind,
                    name,
                    path.display()
                ),
            ));
        }
        let text = fs::read_to_string(&path).map_err(|error| {
            ScriptError::load("LOAD_READ", format!("{}: {}", path.display(), error))
        })?;
        parse_script_xml(source, &text)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        std::env::temp_dir().join(format!("xscript-rs-{}-{}", name, nanos))
    }

    #[test]
    fn maps_dotted_names_to_nested_files() {
        let root = temp_path("parser-nested");
        fs::create_dir_all(root.join("shop")).expect("dirs");
        fs::write(
            root.join("shop").join("Login.xml"),
            r#"<scriptmodule><parameter name="user"/><command name="type" target="id=u" value="@{user}"/></scriptmodule>"#,
        )
        .expect("write");

        let parser = FileScriptParser::new(&root);
        assert_eq!(parser.script_path("shop.Login"), root.join("shop/Login.xml"));
        let script = parser
            .parse(LoadKind::Module, "shop.Login")
            .expect("parse should pass");
        assert_eq!(script.name(), "shop.Login");
        assert_eq!(script.parameters(), ["user".to_string()]);
        assert_eq!(script.source.package(), "shop");
    }

    #[test]
    fn missing_file_is_load_not_found() {
        let parser = FileScriptParser::new(temp_path("parser-missing"));
        let error = parser
            .parse(LoadKind::TestCase, "nope.Missing")
            .expect_err("missing should fail");
        assert_eq!(error.code, "LOAD_NOT_FOUND");
        assert!(error.message.contains("test case"));
    }
}
