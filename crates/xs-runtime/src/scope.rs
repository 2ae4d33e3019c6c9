use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use xs_core::{ScriptError, TestData};

use crate::macros::MacroProcessor;

/// Upper bound on variable and macro substitution rounds for one resolution.
pub const MAX_RESOLVE_ITERATIONS: usize = 1000;

fn name_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("variable name regex must compile")
    })
}

fn variable_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"\$\{[^\s{}$]+\}").expect("variable expression regex must compile")
    })
}

fn macro_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"\$\$|\$\{[^\s${}]+\}").expect("macro expression regex must compile")
    })
}

pub fn is_valid_variable_name(name: &str) -> bool {
    name_regex().is_match(name)
}

/// The variable scope chain of one worker.
///
/// The root frame holds stored values, `frames` mirror test-case and module-call
/// entry (outermost first) and `global` is consulted after all of them. Lookup walks
/// from the root towards the innermost frame, so bindings made closer to the root win.
#[derive(Debug, Clone)]
pub struct ScopeStack {
    root: TestData,
    frames: Vec<Arc<TestData>>,
    global: Arc<TestData>,
    macros: &'static MacroProcessor,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new(Arc::default())
    }
}

impl ScopeStack {
    pub fn new(global: Arc<TestData>) -> Self {
        Self::with_macros(global, MacroProcessor::global())
    }

    pub fn with_macros(global: Arc<TestData>, macros: &'static MacroProcessor) -> Self {
        Self {
            root: TestData::new(),
            frames: Vec::new(),
            global,
            macros,
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push(&mut self, data: Arc<TestData>) {
        self.frames.push(data);
    }

    pub fn pop(&mut self) -> Option<Arc<TestData>> {
        self.frames.pop()
    }

    pub fn stored_values(&self) -> &TestData {
        &self.root
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        std::iter::once(&self.root)
            .chain(self.frames.iter().map(|frame| frame.as_ref()))
            .chain(std::iter::once(self.global.as_ref()))
            .find_map(|data| data.get(name))
            .map(String::as_str)
    }

    /// Writes into the root frame regardless of the current depth.
    pub fn store(&mut self, name: &str, value: &str) -> Result<(), ScriptError> {
        if !is_valid_variable_name(name) {
            return Err(ScriptError::resolution(
                "SCOPE_INVALID_NAME",
                format!("Invalid variable name '{}'", name),
            ));
        }
        self.root.insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Substitutes variables, then macros, then collapses `$$` to `$`.
    pub fn resolve(&self, text: &str) -> Result<String, ScriptError> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }
        let variables_resolved = self.resolve_variables(text, &mut HashSet::new())?;
        let macros_resolved = self.resolve_macros(&variables_resolved)?;
        Ok(macros_resolved.replace("$$", "$"))
    }

    /// Resolves a bare name (or a text that already holds a placeholder).
    /// Returns `None` when resolution leaves the text unchanged.
    pub fn resolve_key(&self, key: &str) -> Result<Option<String>, ScriptError> {
        if key.trim().is_empty() {
            return Ok(Some(key.to_string()));
        }
        let lookup_text = if variable_regex().is_match(key) {
            key.to_string()
        } else {
            format!("${{{}}}", key)
        };
        let resolved = self.resolve(&lookup_text)?;
        Ok((resolved != lookup_text).then_some(resolved))
    }

    fn resolve_variables(
        &self,
        value: &str,
        in_progress: &mut HashSet<String>,
    ) -> Result<String, ScriptError> {
        if value.trim().is_empty() {
            return Ok(value.to_string());
        }

        let mut current = value.to_string();
        let mut iterations = 0usize;
        loop {
            if iterations > MAX_RESOLVE_ITERATIONS {
                return Err(ScriptError::resolution(
                    "RESOLVE_ITERATIONS",
                    format!("Failed to resolve '{}'", value),
                ));
            }
            iterations += 1;

            let input = current.clone();
            for token in unescaped_variable_tokens(&input) {
                let name = &token[2..token.len() - 1];
                if !is_valid_variable_name(name)
                    || in_progress.contains(name)
                    || self.macros.is_macro(name)
                {
                    continue;
                }
                in_progress.insert(name.to_string());

                if let Some(found) = self.lookup(name) {
                    let expanded = self.resolve_variables(found, &mut in_progress.clone())?;
                    current = replace_unescaped(&current, &token, &expanded);
                }
            }

            if current == input {
                return Ok(current);
            }
        }
    }

    fn resolve_macros(&self, value: &str) -> Result<String, ScriptError> {
        if value.is_empty() {
            return Ok(value.to_string());
        }

        let mut current = value.to_string();
        let mut iterations = 0usize;
        loop {
            if iterations > MAX_RESOLVE_ITERATIONS {
                return Err(ScriptError::resolution(
                    "RESOLVE_ITERATIONS",
                    format!("Failed to resolve macros for '{}'", value),
                ));
            }
            iterations += 1;

            let mut out = String::with_capacity(current.len());
            let mut last = 0;
            for found in macro_regex().find_iter(&current) {
                let token = found.as_str();
                if token == "$$" {
                    continue;
                }
                let statement = &token[2..token.len() - 1];
                if self.macros.is_macro(statement) {
                    out.push_str(&current[last..found.start()]);
                    out.push_str(&self.macros.execute(statement)?);
                    last = found.end();
                }
            }
            out.push_str(&current[last..]);

            if out == current {
                return Ok(out);
            }
            current = out;
        }
    }
}

/// `${...}` tokens not preceded by an escaping `$`, in order of appearance.
fn unescaped_variable_tokens(text: &str) -> Vec<String> {
    variable_regex()
        .find_iter(text)
        .filter(|found| !preceded_by_dollar(text, found.start()))
        .map(|found| found.as_str().to_string())
        .collect()
}

fn preceded_by_dollar(text: &str, index: usize) -> bool {
    index > 0 && text.as_bytes()[index - 1] == b'$'
}

fn replace_unescaped(text: &str, token: &str, replacement: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for (start, _) in text.match_indices(token) {
        if preceded_by_dollar(text, start) {
            continue;
        }
        out.push_str(&text[last..start]);
        out.push_str(replacement);
        last = start + token.len();
    }
    out.push_str(&text[last..]);
    out
}
