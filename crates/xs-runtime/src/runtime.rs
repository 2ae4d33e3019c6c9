use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;
use xs_core::{LoadKind, ScriptError};

use crate::config::RuntimeConfig;
use crate::context::TestContext;
use crate::host::{CommandExecutor, ScriptParser, TestDataProvider};
use crate::interpreter::ScriptInterpreter;
use crate::loader::ScriptLoader;

/// Shared, thread-safe engine state: the script caches, the data provider and one
/// [`TestContext`] per worker.
pub struct ScriptRuntime {
    config: RuntimeConfig,
    loader: ScriptLoader,
    data: Arc<dyn TestDataProvider>,
    contexts: DashMap<String, Arc<TestContext>>,
}

impl std::fmt::Debug for ScriptRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptRuntime")
            .field("config", &self.config)
            .field("loader", &self.loader)
            .field("workers", &self.contexts.len())
            .finish()
    }
}

impl ScriptRuntime {
    pub fn new(
        config: RuntimeConfig,
        parser: Arc<dyn ScriptParser>,
        data: Arc<dyn TestDataProvider>,
    ) -> Self {
        Self {
            config,
            loader: ScriptLoader::new(parser),
            data,
            contexts: DashMap::new(),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn loader(&self) -> &ScriptLoader {
        &self.loader
    }

    pub fn data(&self) -> &dyn TestDataProvider {
        self.data.as_ref()
    }

    /// The worker's context, created on first request.
    pub fn context(&self, worker: &str) -> Arc<TestContext> {
        if let Some(context) = self.contexts.get(worker) {
            return Arc::clone(context.value());
        }
        let entry = self.contexts.entry(worker.to_string()).or_insert_with(|| {
            info!(worker, "Creating test context");
            Arc::new(TestContext::new(worker, &self.config, self.data.global_data()))
        });
        Arc::clone(entry.value())
    }

    pub fn worker_count(&self) -> usize {
        self.contexts.len()
    }

    pub fn interpreter<'a>(
        &'a self,
        worker: &str,
        executor: &'a mut dyn CommandExecutor,
    ) -> ScriptInterpreter<'a> {
        ScriptInterpreter::new(self, self.context(worker), executor)
    }

    pub fn execute_script(
        &self,
        worker: &str,
        name: &str,
        executor: &mut dyn CommandExecutor,
    ) -> Result<(), ScriptError> {
        self.interpreter(worker, executor).execute_script(name)
    }

    /// Structural size of a script, loading it (and its callees) if needed.
    pub fn script_size(&self, kind: LoadKind, name: &str) -> Result<usize, ScriptError> {
        Ok(self.loader.get_or_load(kind, name)?.size())
    }

    /// Removes the worker's context and shuts its timer down. Returns `false` when
    /// the worker had no context or its timer did not drain in time.
    pub fn shutdown_context(&self, worker: &str) -> bool {
        let Some((_, context)) = self.contexts.remove(worker) else {
            return false;
        };
        info!(worker, "Shutting down test context");
        context.shut_down()
    }
}
