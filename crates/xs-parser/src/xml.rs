use std::collections::BTreeMap;

use roxmltree::{Document, Node};
use tracing::error;
use xs_core::{
    CallCondition, CommandBody, NativeModule, Script, ScriptElement, ScriptElementKind,
    ScriptError, ScriptKind, ScriptSource, TestCaseBody,
};

/// Parses one script file. The root tag selects the script kind: `testcase`,
/// `javamodule`, anything else is a command module.
pub fn parse_script_xml(source: ScriptSource, text: &str) -> Result<Script, ScriptError> {
    let document = Document::parse(text).map_err(|error| {
        ScriptError::load(
            "XML_PARSE_ERROR",
            format!("{}: {}", source.path, error),
        )
    })?;
    let root = document.root_element();

    let kind = match root.tag_name().name() {
        "testcase" => parse_test_case(&document, root, &source)?,
        "javamodule" => parse_native_module(&document, root, &source)?,
        _ => parse_command_module(&document, root, &source)?,
    };
    Ok(Script::new(source, kind))
}

fn parse_test_case(
    document: &Document<'_>,
    root: Node<'_, '_>,
    source: &ScriptSource,
) -> Result<ScriptKind, ScriptError> {
    let mut elements = Vec::new();
    let mut post_steps = Vec::new();

    for child in root.children().filter(Node::is_element) {
        if let Some(element) = parse_element(document, child, source)? {
            elements.push(element);
        } else if child.tag_name().name() == "postSteps" {
            for step in child.children().filter(Node::is_element) {
                if let Some(element) = parse_element(document, step, source)? {
                    post_steps.push(element);
                }
            }
        }
    }

    let base_url = root
        .attribute("baseURL")
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string);

    Ok(ScriptKind::TestCase(TestCaseBody {
        elements,
        post_steps,
        base_url,
        disabled: flag(root, "disabled"),
    }))
}

fn parse_command_module(
    document: &Document<'_>,
    root: Node<'_, '_>,
    source: &ScriptSource,
) -> Result<ScriptKind, ScriptError> {
    let mut elements = Vec::new();
    let mut parameters = Vec::new();

    for child in root.children().filter(Node::is_element) {
        if let Some(element) = parse_element(document, child, source)? {
            elements.push(element);
        } else if child.tag_name().name() == "parameter" {
            parameters.push(required_attribute(document, child, "name", source)?);
        }
    }

    Ok(ScriptKind::CommandModule(CommandBody {
        parameters,
        elements,
    }))
}

fn parse_native_module(
    document: &Document<'_>,
    root: Node<'_, '_>,
    source: &ScriptSource,
) -> Result<ScriptKind, ScriptError> {
    let implementation = required_attribute(document, root, "class", source)?;
    let mut parameters = Vec::new();
    for child in root.children().filter(Node::is_element) {
        if child.tag_name().name() == "parameter" {
            parameters.push(required_attribute(document, child, "name", source)?);
        }
    }
    Ok(ScriptKind::NativeModule(NativeModule {
        parameters,
        implementation,
    }))
}

/// Returns `None` for tags that are not steps.
fn parse_element(
    document: &Document<'_>,
    node: Node<'_, '_>,
    source: &ScriptSource,
) -> Result<Option<ScriptElement>, ScriptError> {
    let line = line_of(document, node);
    let disabled = flag(node, "disabled");

    let element = match node.tag_name().name() {
        "command" => {
            let name = required_attribute(document, node, "name", source)?;
            ScriptElement {
                name,
                disabled,
                line,
                kind: ScriptElementKind::Command {
                    target: attribute_or_child_text(node, "target"),
                    value: attribute_or_child_text(node, "value"),
                },
            }
        }
        "module" => {
            let name = required_attribute(document, node, "name", source)?;
            let mut arguments = BTreeMap::new();
            let mut condition = None;
            for child in node.children().filter(Node::is_element) {
                match child.tag_name().name() {
                    "parameter" => {
                        let parameter = required_attribute(document, child, "name", source)?;
                        let value = child.attribute("value").unwrap_or_default().to_string();
                        arguments.insert(parameter, value);
                    }
                    "condition" => {
                        if condition.is_some() {
                            error!(
                                "More than one condition found for module call '{}' in script '{}' at line {}",
                                name, source.path, line
                            );
                        }
                        condition = Some(CallCondition {
                            disabled: flag(child, "disabled"),
                            expression: text_content(child),
                        });
                    }
                    _ => {}
                }
            }
            ScriptElement {
                name,
                disabled,
                line,
                kind: ScriptElementKind::ModuleCall {
                    arguments,
                    condition,
                },
            }
        }
        "action" => ScriptElement {
            name: required_attribute(document, node, "name", source)?,
            disabled,
            line,
            kind: ScriptElementKind::Action,
        },
        "codecomment" => ScriptElement {
            name: text_content(node),
            disabled,
            line,
            kind: ScriptElementKind::Comment,
        },
        _ => return Ok(None),
    };
    Ok(Some(element))
}

fn required_attribute(
    document: &Document<'_>,
    node: Node<'_, '_>,
    name: &str,
    source: &ScriptSource,
) -> Result<String, ScriptError> {
    match node.attribute(name) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(ScriptError::load(
            "XML_SCRIPT_INVALID",
            format!(
                "<{}> at {}:{} requires attribute \"{}\".",
                node.tag_name().name(),
                source.path,
                line_of(document, node),
                name
            ),
        )),
    }
}

fn attribute_or_child_text(node: Node<'_, '_>, name: &str) -> String {
    if let Some(value) = node.attribute(name).filter(|value| !value.is_empty()) {
        return value.to_string();
    }
    node.descendants()
        .find(|child| child.is_element() && child.tag_name().name() == name)
        .map(text_content)
        .unwrap_or_default()
}

fn text_content(node: Node<'_, '_>) -> String {
    node.descendants()
        .filter(Node::is_text)
        .filter_map(|child| child.text())
        .collect()
}

fn flag(node: Node<'_, '_>, name: &str) -> bool {
    node.attribute(name)
        .map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn line_of(document: &Document<'_>, node: Node<'_, '_>) -> usize {
    document.text_pos_at(node.range().start).row as usize
}
