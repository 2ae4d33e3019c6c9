use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::info;
use xs_core::{FailureKind, LoadKind, Script, ScriptError, ScriptKind};

use crate::host::ScriptParser;

type ScriptTable = HashMap<String, Arc<Script>>;

/// One memoisation table. Its lock is held for a whole load so concurrent requests
/// for the same name parse it once and every caller sees a fully sized script.
#[derive(Debug, Default)]
struct ScriptCache {
    scripts: Mutex<ScriptTable>,
}

impl ScriptCache {
    fn lock(&self) -> MutexGuard<'_, ScriptTable> {
        self.scripts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Loads scripts on demand, along with every module they transitively call, and
/// computes each script's size before publishing it.
///
/// Lock order is test cases first, then modules.
pub struct ScriptLoader {
    parser: Arc<dyn ScriptParser>,
    test_cases: ScriptCache,
    modules: ScriptCache,
}

impl std::fmt::Debug for ScriptLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptLoader")
            .field("test_cases", &self.test_cases.lock().len())
            .field("modules", &self.modules.lock().len())
            .finish()
    }
}

impl ScriptLoader {
    pub fn new(parser: Arc<dyn ScriptParser>) -> Self {
        Self {
            parser,
            test_cases: ScriptCache::default(),
            modules: ScriptCache::default(),
        }
    }

    pub fn test_case(&self, name: &str) -> Result<Arc<Script>, ScriptError> {
        self.get_or_load(LoadKind::TestCase, name)
    }

    pub fn module(&self, name: &str) -> Result<Arc<Script>, ScriptError> {
        self.get_or_load(LoadKind::Module, name)
    }

    pub fn get_or_load(&self, kind: LoadKind, name: &str) -> Result<Arc<Script>, ScriptError> {
        match kind {
            LoadKind::Module => {
                let mut modules = self.modules.lock();
                self.load_module(&mut modules, name, &mut Vec::new())
            }
            LoadKind::TestCase => {
                let mut test_cases = self.test_cases.lock();
                if let Some(script) = test_cases.get(name) {
                    return Ok(Arc::clone(script));
                }

                let script = self.parse(LoadKind::TestCase, name)?;
                if script.as_test_case().is_none() {
                    return Err(ScriptError::load(
                        "LOAD_KIND",
                        format!("Script \"{}\" is not a test case.", name),
                    ));
                }
                {
                    let mut modules = self.modules.lock();
                    self.prepare(&script, &mut modules, &mut Vec::new())?;
                }

                let script = Arc::new(script);
                test_cases.insert(name.to_string(), Arc::clone(&script));
                Ok(script)
            }
        }
    }

    /// Already-published script, without triggering a load.
    pub fn cached(&self, kind: LoadKind, name: &str) -> Option<Arc<Script>> {
        let cache = match kind {
            LoadKind::TestCase => &self.test_cases,
            LoadKind::Module => &self.modules,
        };
        cache.lock().get(name).cloned()
    }

    pub fn cached_count(&self, kind: LoadKind) -> usize {
        match kind {
            LoadKind::TestCase => self.test_cases.lock().len(),
            LoadKind::Module => self.modules.lock().len(),
        }
    }

    fn parse(&self, kind: LoadKind, name: &str) -> Result<Script, ScriptError> {
        info!("Parsing {} script: {}", kind, name);
        self.parser.parse(kind, name).map_err(|error| {
            if error.kind == FailureKind::Load {
                error
            } else {
                ScriptError::load(
                    "LOAD_PARSE",
                    format!("Failed to parse {} script \"{}\".", kind, name),
                )
                .caused_by(error)
            }
        })
    }

    fn load_module(
        &self,
        modules: &mut ScriptTable,
        name: &str,
        loading: &mut Vec<String>,
    ) -> Result<Arc<Script>, ScriptError> {
        if let Some(script) = modules.get(name) {
            return Ok(Arc::clone(script));
        }
        if let Some(start) = loading.iter().position(|pending| pending == name) {
            let mut chain = loading[start..].to_vec();
            chain.push(name.to_string());
            return Err(ScriptError::load(
                "LOAD_CYCLE",
                format!("Module call cycle detected: {}", chain.join(" -> ")),
            ));
        }

        let script = self.parse(LoadKind::Module, name)?;
        if script.as_test_case().is_some() {
            return Err(ScriptError::load(
                "LOAD_KIND",
                format!(
                    "Script \"{}\" is a test case and cannot be called as a module.",
                    name
                ),
            ));
        }

        loading.push(name.to_string());
        let prepared = self.prepare(&script, modules, loading);
        loading.pop();
        prepared?;

        let script = Arc::new(script);
        modules.insert(name.to_string(), Arc::clone(&script));
        Ok(script)
    }

    /// Loads every callee (post-steps included) and fixes the script's size: one per
    /// main-body element plus the size of each called module.
    fn prepare(
        &self,
        script: &Script,
        modules: &mut ScriptTable,
        loading: &mut Vec<String>,
    ) -> Result<(), ScriptError> {
        for callee in script.called_modules() {
            self.load_module(modules, callee, loading)?;
        }

        if matches!(script.kind, ScriptKind::NativeModule(_)) {
            return script.set_size(0);
        }
        let size = script
            .elements()
            .iter()
            .map(|element| {
                let callee = if element.is_module_call() {
                    modules.get(&element.name).map_or(0, |module| module.size())
                } else {
                    0
                };
                1 + callee
            })
            .sum();
        script.set_size(size)
    }
}
