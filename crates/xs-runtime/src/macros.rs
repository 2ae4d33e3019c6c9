use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use regex::Regex;
use xs_core::ScriptError;

pub type MacroFn = fn(&[String]) -> String;

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

/// Registry of named, stateless text macros. A macro statement is either a bare
/// name (`NOW`) or a call (`RANDOM.String(8)`).
#[derive(Clone)]
pub struct MacroProcessor {
    macros: BTreeMap<&'static str, MacroFn>,
}

impl std::fmt::Debug for MacroProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.macros.keys()).finish()
    }
}

impl MacroProcessor {
    /// Process-wide registry holding the built-in macros.
    pub fn global() -> &'static MacroProcessor {
        static GLOBAL: OnceLock<MacroProcessor> = OnceLock::new();
        GLOBAL.get_or_init(MacroProcessor::with_builtins)
    }

    pub fn with_builtins() -> Self {
        let mut macros: BTreeMap<&'static str, MacroFn> = BTreeMap::new();
        macros.insert("NOW", now_millis);
        macros.insert("RANDOM.String", random_string);
        macros.insert("RANDOM.Number", random_number);
        Self { macros }
    }

    /// Adds or replaces a macro.
    pub fn register(&mut self, name: &'static str, run: MacroFn) {
        self.macros.insert(name, run);
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.macros.keys().copied()
    }

    pub fn is_macro(&self, statement: &str) -> bool {
        let (name, _) = split_statement(statement);
        self.macros.contains_key(name)
    }

    /// Callers are expected to gate with [`MacroProcessor::is_macro`] first.
    pub fn execute(&self, statement: &str) -> Result<String, ScriptError> {
        let (name, arguments) = split_statement(statement);
        let Some(run) = self.macros.get(name) else {
            return Err(ScriptError::new(
                "MACRO_UNKNOWN",
                format!(
                    "Macro statement \"{}\" could not be recognized as valid macro.",
                    statement
                ),
            ));
        };
        Ok(run(&arguments))
    }
}

fn statement_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^(.+?)\((.*?)\)$").expect("macro statement regex must compile"))
}

fn split_statement(statement: &str) -> (&str, Vec<String>) {
    let Some(caps) = statement_regex().captures(statement) else {
        return (statement, Vec::new());
    };
    let name = caps.get(1).map_or(statement, |m| m.as_str());
    let mut arguments = caps
        .get(2)
        .map_or("", |m| m.as_str())
        .split(',')
        .map(|argument| argument.trim().to_string())
        .collect::<Vec<_>>();
    while arguments.len() > 1 && arguments.last().is_some_and(String::is_empty) {
        arguments.pop();
    }
    (name, arguments)
}

fn int_argument(arguments: &[String], index: usize) -> i64 {
    arguments
        .get(index)
        .and_then(|argument| argument.parse::<i32>().ok())
        .map(i64::from)
        .unwrap_or(0)
}

fn now_millis(_arguments: &[String]) -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
        .to_string()
}

fn random_below(bound: i64) -> i64 {
    if bound <= 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..bound)
}

fn random_string(arguments: &[String]) -> String {
    let length = int_argument(arguments, 0).max(0) as usize;
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(LOWERCASE[rng.gen_range(0..LOWERCASE.len())]))
        .collect()
}

fn random_number(arguments: &[String]) -> String {
    match arguments {
        [_] => random_below(int_argument(arguments, 0).max(0)).to_string(),
        [_, _] => {
            let low = int_argument(arguments, 0).max(0);
            let high = int_argument(arguments, 1).max(low);
            (low + random_below(high - low)).to_string()
        }
        _ => String::new(),
    }
}
