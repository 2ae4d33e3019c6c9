use roxmltree::{Document, Node};
use xs_core::{ScriptError, TestData};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Xml,
    Csv,
    Properties,
}

impl DataFormat {
    /// Lookup order used when several data files exist for the same base name.
    pub const LOOKUP_ORDER: [DataFormat; 3] = [DataFormat::Xml, DataFormat::Csv, DataFormat::Properties];

    pub fn extension(self) -> &'static str {
        match self {
            Self::Xml => "xml",
            Self::Csv => "csv",
            Self::Properties => "properties",
        }
    }
}

pub fn parse_test_data(format: DataFormat, text: &str) -> Result<TestData, ScriptError> {
    match format {
        DataFormat::Xml => parse_xml_data(text),
        DataFormat::Csv => parse_csv_data(text),
        DataFormat::Properties => Ok(parse_properties_data(text)),
    }
}

/// Every child element of the root becomes one entry: tag name -> text content.
pub fn parse_xml_data(text: &str) -> Result<TestData, ScriptError> {
    let document = Document::parse(text)
        .map_err(|error| ScriptError::new("DATA_PARSE", error.to_string()))?;
    Ok(document
        .root_element()
        .children()
        .filter(|node| node.is_element())
        .map(|node| {
            let value = node
                .descendants()
                .filter(Node::is_text)
                .filter_map(|child| child.text())
                .collect::<String>();
            (node.tag_name().name().to_string(), value)
        })
        .collect())
}

/// Lines holding exactly two CSV fields become `key -> value`; other lines are ignored.
pub fn parse_csv_data(text: &str) -> Result<TestData, ScriptError> {
    let mut data = TestData::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields = decode_csv_line(line).map_err(|message| {
            ScriptError::new("DATA_PARSE", format!("line {}: {}", index + 1, message))
        })?;
        if let [key, value] = fields.as_slice() {
            data.insert(key.clone(), value.clone());
        }
    }
    Ok(data)
}

fn decode_csv_line(line: &str) -> Result<Vec<String>, String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match (ch, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            ('"', true) => quoted = false,
            ('"', false) if field.is_empty() => quoted = true,
            (',', false) => fields.push(std::mem::take(&mut field)),
            _ => field.push(ch),
        }
    }
    if quoted {
        return Err("unterminated quoted field".to_string());
    }
    fields.push(field);
    Ok(fields)
}

/// Java-style properties: `key=value` or `key: value`, `#`/`!` comments and
/// backslash line continuations.
pub fn parse_properties_data(text: &str) -> TestData {
    let mut data = TestData::new();
    let mut logical = String::new();

    for raw in text.lines() {
        let line = raw.trim_start();
        if logical.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!')) {
            continue;
        }

        let continued = ends_with_odd_backslashes(line);
        if continued {
            logical.push_str(&line[..line.len() - 1]);
            continue;
        }
        logical.push_str(line);

        let (key, value) = split_property(&logical);
        data.insert(unescape_property(key), unescape_property(value));
        logical.clear();
    }

    if !logical.is_empty() {
        let (key, value) = split_property(&logical);
        data.insert(unescape_property(key), unescape_property(value));
    }
    data
}

fn ends_with_odd_backslashes(line: &str) -> bool {
    line.chars().rev().take_while(|ch| *ch == '\\').count() % 2 == 1
}

fn split_property(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (index, ch) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '=' | ':' => {
                return (line[..index].trim_end(), line[index + 1..].trim_start());
            }
            ch if ch.is_whitespace() => {
                let rest = line[index..].trim_start();
                let rest = rest
                    .strip_prefix('=')
                    .or_else(|| rest.strip_prefix(':'))
                    .unwrap_or(rest);
                return (&line[..index], rest.trim_start());
            }
            _ => {}
        }
    }
    (line, "")
}

fn unescape_property(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
