use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};
use xs_core::ScriptError;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct TimerState {
    sender: Option<Sender<Job>>,
    finished: Option<mpsc::Receiver<()>>,
    shut_down: bool,
}

/// A single background worker running one unit of work at a time with a deadline.
///
/// Work that overruns its deadline keeps running in the background; the caller gets
/// `TIMER_TIMEOUT` and later work queues behind it.
pub struct TimedExecutor {
    name: String,
    state: Mutex<TimerState>,
}

impl std::fmt::Debug for TimedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedExecutor")
            .field("name", &self.name)
            .field("shut_down", &self.state().shut_down)
            .finish()
    }
}

impl TimedExecutor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(TimerState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sender(&self) -> Result<Sender<Job>, ScriptError> {
        let mut state = self.state();
        if state.shut_down {
            return Err(ScriptError::new(
                "TIMER_SHUT_DOWN",
                format!("Timer of \"{}\" has been shut down.", self.name),
            ));
        }
        if let Some(sender) = &state.sender {
            return Ok(sender.clone());
        }

        let (sender, jobs) = mpsc::channel::<Job>();
        let (finished_tx, finished_rx) = mpsc::channel();
        thread::Builder::new()
            .name(format!("{}-timer", self.name))
            .spawn(move || {
                for job in jobs {
                    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        warn!("Timed work panicked");
                    }
                }
                let _ = finished_tx.send(());
            })
            .map_err(|error| ScriptError::new("TIMER_SPAWN", error.to_string()))?;

        state.sender = Some(sender.clone());
        state.finished = Some(finished_rx);
        Ok(sender)
    }

    /// Runs `work` on the background worker and waits up to `timeout` for its result.
    pub fn call_and_wait<T, F>(&self, timeout: Duration, work: F) -> Result<T, ScriptError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, ScriptError> + Send + 'static,
    {
        let sender = self.sender()?;
        let (result_tx, result_rx) = mpsc::channel();
        let job: Job = Box::new(move || {
            let _ = result_tx.send(work());
        });
        sender.send(job).map_err(|_| {
            ScriptError::new(
                "TIMER_SHUT_DOWN",
                format!("Timer of \"{}\" is no longer accepting work.", self.name),
            )
        })?;

        match result_rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(ScriptError::timeout(format!(
                "Work did not finish within {} ms.",
                timeout.as_millis()
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(ScriptError::new(
                "TIMER_ABORTED",
                "Timed work ended without producing a result.",
            )),
        }
    }

    /// Stops accepting work and waits up to `timeout` for queued work to drain.
    /// Returns `true` when the worker finished in time (or never started).
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let finished = {
            let mut state = self.state();
            state.shut_down = true;
            state.sender = None;
            state.finished.take()
        };
        let Some(finished) = finished else {
            return true;
        };
        let drained = matches!(
            finished.recv_timeout(timeout),
            Ok(()) | Err(RecvTimeoutError::Disconnected)
        );
        debug!(timer = %self.name, drained, "Timer shut down");
        drained
    }

    pub fn is_shut_down(&self) -> bool {
        self.state().shut_down
    }
}
