use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::bind::bind_parameters;
use crate::error::{ScriptError, TraceFrame};

/// Named string values: a frame's own data, a data-set row or a loaded test-data file.
pub type TestData = BTreeMap<String, String>;

/// Where a script came from. `path` is relative to the scripts root and uses `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScriptSource {
    pub name: String,
    pub path: String,
}

impl ScriptSource {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Source reference derived from a dotted script name, `a.b.C` -> `a/b/C.xml`.
    pub fn from_name(name: &str) -> Self {
        Self::new(name, format!("{}.xml", name.replace('.', "/")))
    }

    /// Dotted package of the directory holding the script; empty for the root directory.
    pub fn package(&self) -> String {
        match self.path.rsplit_once('/') {
            Some((dir, _)) => dir.trim_matches('/').replace('/', "."),
            None => String::new(),
        }
    }

    pub fn file_name(&self) -> &str {
        match self.path.rsplit_once('/') {
            Some((_, file)) => file,
            None => self.path.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallCondition {
    pub disabled: bool,
    pub expression: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ScriptElementKind {
    Command {
        target: String,
        value: String,
    },
    Action,
    Comment,
    ModuleCall {
        arguments: BTreeMap<String, String>,
        condition: Option<CallCondition>,
    },
}

/// One step of a command script. For module calls `name` is the callee's script name,
/// for comments it is the comment text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptElement {
    pub name: String,
    pub disabled: bool,
    pub line: usize,
    pub kind: ScriptElementKind,
}

impl ScriptElement {
    pub fn command(
        name: impl Into<String>,
        target: impl Into<String>,
        value: impl Into<String>,
        line: usize,
    ) -> Self {
        Self {
            name: name.into(),
            disabled: false,
            line,
            kind: ScriptElementKind::Command {
                target: target.into(),
                value: value.into(),
            },
        }
    }

    pub fn action(name: impl Into<String>, line: usize) -> Self {
        Self {
            name: name.into(),
            disabled: false,
            line,
            kind: ScriptElementKind::Action,
        }
    }

    pub fn comment(text: impl Into<String>, line: usize) -> Self {
        Self {
            name: text.into(),
            disabled: false,
            line,
            kind: ScriptElementKind::Comment,
        }
    }

    pub fn module_call(
        callee: impl Into<String>,
        arguments: BTreeMap<String, String>,
        condition: Option<CallCondition>,
        line: usize,
    ) -> Self {
        Self {
            name: callee.into(),
            disabled: false,
            line,
            kind: ScriptElementKind::ModuleCall {
                arguments,
                condition,
            },
        }
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn is_module_call(&self) -> bool {
        matches!(self.kind, ScriptElementKind::ModuleCall { .. })
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ScriptElementKind::Command { .. } => "command",
            ScriptElementKind::Action => "action",
            ScriptElementKind::Comment => "comment",
            ScriptElementKind::ModuleCall { .. } => "module",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandBody {
    pub parameters: Vec<String>,
    pub elements: Vec<ScriptElement>,
}

impl CommandBody {
    /// Fresh copy of the elements with `@{name}` placeholders bound to `arguments`.
    pub fn bind(&self, arguments: &BTreeMap<String, String>) -> Vec<ScriptElement> {
        self.elements
            .iter()
            .map(|element| bind_element(element, arguments))
            .collect()
    }
}

fn bind_element(element: &ScriptElement, arguments: &BTreeMap<String, String>) -> ScriptElement {
    let kind = match &element.kind {
        ScriptElementKind::Command { target, value } => ScriptElementKind::Command {
            target: bind_parameters(target, arguments),
            value: bind_parameters(value, arguments),
        },
        ScriptElementKind::ModuleCall {
            arguments: call_arguments,
            condition,
        } => ScriptElementKind::ModuleCall {
            arguments: call_arguments
                .iter()
                .map(|(name, expr)| (name.clone(), bind_parameters(expr, arguments)))
                .collect(),
            condition: condition.as_ref().map(|condition| CallCondition {
                disabled: condition.disabled,
                expression: bind_parameters(&condition.expression, arguments),
            }),
        },
        other => other.clone(),
    };
    ScriptElement {
        name: element.name.clone(),
        disabled: element.disabled,
        line: element.line,
        kind,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseBody {
    pub elements: Vec<ScriptElement>,
    pub post_steps: Vec<ScriptElement>,
    pub base_url: Option<String>,
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeModule {
    pub parameters: Vec<String>,
    pub implementation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ScriptKind {
    TestCase(TestCaseBody),
    CommandModule(CommandBody),
    NativeModule(NativeModule),
}

/// Which memoisation table a script is requested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadKind {
    TestCase,
    Module,
}

impl std::fmt::Display for LoadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TestCase => f.write_str("test case"),
            Self::Module => f.write_str("module"),
        }
    }
}

#[derive(Debug)]
pub struct Script {
    pub source: ScriptSource,
    pub kind: ScriptKind,
    size: OnceLock<usize>,
}

impl Script {
    pub fn new(source: ScriptSource, kind: ScriptKind) -> Self {
        Self {
            source,
            kind,
            size: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.source.name
    }

    /// Structural step count. Native modules always report 0.
    pub fn size(&self) -> usize {
        match self.kind {
            ScriptKind::NativeModule(_) => 0,
            _ => self.size.get().copied().unwrap_or(0),
        }
    }

    pub fn is_sized(&self) -> bool {
        self.size.get().is_some()
    }

    pub fn set_size(&self, size: usize) -> Result<(), ScriptError> {
        self.size.set(size).map_err(|_| {
            ScriptError::load(
                "SCRIPT_SIZE_SET",
                format!("Size of script \"{}\" is already set.", self.name()),
            )
        })
    }

    /// Main body elements; empty for native modules.
    pub fn elements(&self) -> &[ScriptElement] {
        match &self.kind {
            ScriptKind::TestCase(body) => &body.elements,
            ScriptKind::CommandModule(body) => &body.elements,
            ScriptKind::NativeModule(_) => &[],
        }
    }

    pub fn parameters(&self) -> &[String] {
        match &self.kind {
            ScriptKind::TestCase(_) => &[],
            ScriptKind::CommandModule(body) => &body.parameters,
            ScriptKind::NativeModule(module) => &module.parameters,
        }
    }

    pub fn as_test_case(&self) -> Option<&TestCaseBody> {
        match &self.kind {
            ScriptKind::TestCase(body) => Some(body),
            _ => None,
        }
    }

    /// Callee names of every module call in the main body and post-steps, in order.
    pub fn called_modules(&self) -> Vec<&str> {
        let post_steps: &[ScriptElement] = match &self.kind {
            ScriptKind::TestCase(body) => &body.post_steps,
            _ => &[],
        };
        self.elements()
            .iter()
            .chain(post_steps)
            .filter(|element| element.is_module_call())
            .map(|element| element.name.as_str())
            .collect()
    }

    pub fn trace_frame(&self, element: &ScriptElement, line: usize) -> TraceFrame {
        let element_name = match element.name.rsplit_once('.') {
            Some((_, last)) => last,
            None => element.name.as_str(),
        };
        TraceFrame {
            package: self.source.package(),
            element: element_name.to_string(),
            file: self.source.file_name().to_string(),
            line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(elements: Vec<ScriptElement>) -> Script {
        Script::new(
            ScriptSource::from_name("shop.Login"),
            ScriptKind::CommandModule(CommandBody {
                parameters: vec!["user".to_string()],
                elements,
            }),
        )
    }

    #[test]
    fn source_derives_package_and_file_from_path() {
        let source = ScriptSource::from_name("shop.checkout.Order");
        assert_eq!(source.path, "shop/checkout/Order.xml");
        assert_eq!(source.package(), "shop.checkout");
        assert_eq!(source.file_name(), "Order.xml");

        let root = ScriptSource::from_name("Main");
        assert_eq!(root.package(), "");
        assert_eq!(root.file_name(), "Main.xml");
    }

    #[test]
    fn size_is_set_once() {
        let script = module(vec![ScriptElement::command("open", "/", "", 1)]);
        assert!(!script.is_sized());
        script.set_size(1).expect("first set should pass");
        let error = script.set_size(2).expect_err("second set should fail");
        assert_eq!(error.code, "SCRIPT_SIZE_SET");
        assert_eq!(script.size(), 1);
    }

    #[test]
    fn native_module_size_is_always_zero() {
        let script = Script::new(
            ScriptSource::from_name("ext.Upload"),
            ScriptKind::NativeModule(NativeModule {
                parameters: vec!["a".to_string(), "b".to_string(), "c".to_string()],
                implementation: "ext::upload".to_string(),
            }),
        );
        script.set_size(7).expect("set should pass");
        assert_eq!(script.size(), 0);
        assert!(script.elements().is_empty());
        assert_eq!(script.parameters().len(), 3);
    }

    #[test]
    fn bind_substitutes_commands_calls_and_conditions() {
        let mut arguments = BTreeMap::new();
        arguments.insert("who".to_string(), "@{user}".to_string());
        let body = CommandBody {
            parameters: vec!["user".to_string()],
            elements: vec![
                ScriptElement::command("type", "id=@{user}", "mail@@host", 1),
                ScriptElement::module_call(
                    "shop.Greet",
                    arguments,
                    Some(CallCondition {
                        disabled: false,
                        expression: "'@{user}' != ''".to_string(),
                    }),
                    2,
                ),
                ScriptElement::action("@{user}", 3),
            ],
        };
        let mut bound_args = BTreeMap::new();
        bound_args.insert("user".to_string(), "alice".to_string());

        let bound = body.bind(&bound_args);
        assert_eq!(
            bound[0].kind,
            ScriptElementKind::Command {
                target: "id=alice".to_string(),
                value: "mail@host".to_string(),
            }
        );
        let ScriptElementKind::ModuleCall {
            arguments,
            condition,
        } = &bound[1].kind
        else {
            panic!("module call expected");
        };
        assert_eq!(arguments.get("who").map(String::as_str), Some("alice"));
        assert_eq!(
            condition.as_ref().map(|c| c.expression.as_str()),
            Some("'alice' != ''")
        );
        assert_eq!(bound[2].name, "@{user}");
        // the source body is untouched
        assert_eq!(body.elements[0], ScriptElement::command("type", "id=@{user}", "mail@@host", 1));
    }

    #[test]
    fn called_modules_include_post_steps() {
        let script = Script::new(
            ScriptSource::from_name("T"),
            ScriptKind::TestCase(TestCaseBody {
                elements: vec![
                    ScriptElement::module_call("a.M", BTreeMap::new(), None, 1),
                    ScriptElement::command("echo", "", "x", 2),
                ],
                post_steps: vec![ScriptElement::module_call("a.Cleanup", BTreeMap::new(), None, 4)],
                base_url: None,
                disabled: false,
            }),
        );
        assert_eq!(script.called_modules(), vec!["a.M", "a.Cleanup"]);
    }

    #[test]
    fn trace_frame_uses_last_segment_of_element_name() {
        let script = module(Vec::new());
        let element = ScriptElement::module_call("shop.util.Search", BTreeMap::new(), None, 9);
        let frame = script.trace_frame(&element, 5);
        assert_eq!(
            frame,
            TraceFrame {
                package: "shop".to_string(),
                element: "Search".to_string(),
                file: "Login.xml".to_string(),
                line: 5,
            }
        );
    }

    #[test]
    fn element_kind_serializes_with_tag() {
        let json = serde_json::to_string(&ScriptElement::action("Start", 2)).expect("json");
        assert!(json.contains("\"kind\":\"action\""));
    }
}
