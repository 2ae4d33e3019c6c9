use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;
use xs_core::{ScriptError, TestData};

use crate::config::RuntimeConfig;
use crate::scope::ScopeStack;
use crate::timer::TimedExecutor;

/// Per-worker execution state: the scope chain, session settings and the timer
/// used for time-bounded work. One context serves one worker at a time.
#[derive(Debug)]
pub struct TestContext {
    worker: String,
    scope: Mutex<ScopeStack>,
    base_url: Mutex<String>,
    timeout_ms: AtomicU64,
    implicit_timeout_ms: AtomicU64,
    timer: TimedExecutor,
}

/// Pops the frame pushed by [`TestContext::enter_scope`] when dropped.
#[must_use = "the scope is exited as soon as the guard is dropped"]
pub struct ScopeGuard<'a> {
    context: &'a TestContext,
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.context.scope().pop();
    }
}

impl TestContext {
    pub fn new(worker: impl Into<String>, config: &RuntimeConfig, global: Arc<TestData>) -> Self {
        let worker = worker.into();
        Self {
            timer: TimedExecutor::new(worker.clone()),
            worker,
            scope: Mutex::new(ScopeStack::new(global)),
            base_url: Mutex::new(String::new()),
            timeout_ms: AtomicU64::new(config.default_timeout_ms),
            implicit_timeout_ms: AtomicU64::new(config.default_implicit_timeout_ms),
        }
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }

    fn scope(&self) -> MutexGuard<'_, ScopeStack> {
        self.scope.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pushes `data` as the new innermost frame.
    pub fn enter_scope(&self, data: Arc<TestData>) -> ScopeGuard<'_> {
        self.scope().push(data);
        ScopeGuard { context: self }
    }

    pub fn scope_depth(&self) -> usize {
        self.scope().depth()
    }

    pub fn resolve(&self, text: &str) -> Result<String, ScriptError> {
        self.scope().resolve(text)
    }

    pub fn resolve_key(&self, key: &str) -> Result<Option<String>, ScriptError> {
        self.scope().resolve_key(key)
    }

    pub fn store(&self, name: &str, value: &str) -> Result<(), ScriptError> {
        debug!(worker = %self.worker, name, value, "Storing value");
        self.scope().store(name, value)
    }

    pub fn stored_value(&self, name: &str) -> Option<String> {
        self.scope().stored_values().get(name).cloned()
    }

    pub fn base_url(&self) -> String {
        self.base_url
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_base_url(&self, url: &str) {
        *self.base_url.lock().unwrap_or_else(PoisonError::into_inner) = url.to_string();
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }

    /// Negative values clamp to zero.
    pub fn set_timeout_ms(&self, millis: i64) {
        self.timeout_ms.store(millis.max(0) as u64, Ordering::Relaxed);
    }

    pub fn implicit_timeout(&self) -> Duration {
        Duration::from_millis(self.implicit_timeout_ms.load(Ordering::Relaxed))
    }

    pub fn set_implicit_timeout_ms(&self, millis: i64) {
        self.implicit_timeout_ms
            .store(millis.max(0) as u64, Ordering::Relaxed);
    }

    /// Runs `work` on this worker's timer, bounded by the current timeout.
    pub fn call_and_wait<T, F>(&self, work: F) -> Result<T, ScriptError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, ScriptError> + Send + 'static,
    {
        self.timer.call_and_wait(self.timeout(), work)
    }

    /// Shuts the timer down, waiting up to the current timeout for running work.
    pub fn shut_down(&self) -> bool {
        self.timer.shutdown(self.timeout())
    }
}
