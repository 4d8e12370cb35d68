// Numan Thabit 2026
// sched.rs - command scheduler: queue, readiness gating, lifecycle hooks

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::metrics::Metrics;

/// Opaque per-attempt identifier correlating logs and resource bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Socket readiness condition a command is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
}

/// Result of one successful step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The command wants to run again when its readiness condition holds.
    Continue,
    /// Terminal success; the scheduler discards the command without hooks.
    Finished,
}

/// Error type carried out of [`Command::step`]; concrete commands use their
/// own `thiserror` enums and convert with `?`.
pub type CommandError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Where hooks enqueue follow-up commands and mint fresh connection ids.
pub trait CommandSink {
    fn enqueue(&mut self, command: Box<dyn Command>);

    fn mint_id(&mut self) -> ConnectionId;
}

/// A resumable unit of work driven by the scheduler.
///
/// The scheduler applies a fixed discipline per poll pass: `should_abort`
/// first (terminate without a step), then the deadline, then `ready` gating
/// the actual `step`. `on_abort` runs exactly once when a command is discarded
/// without success, never on success. `prepare_fallback` runs on the failure
/// path only (deadline exceeded or `step` error), before `on_abort`.
pub trait Command: Send {
    fn id(&self) -> ConnectionId;

    fn interest(&self) -> Interest;

    fn deadline(&self) -> Instant;

    /// True when the registered readiness condition is currently met.
    fn ready(&self) -> bool;

    fn should_abort(&self) -> bool {
        false
    }

    fn step(&mut self, sink: &mut dyn CommandSink) -> Result<Progress, CommandError>;

    /// Decides and schedules a replacement attempt after a failure. Returns
    /// true when the failure was fully handled.
    fn prepare_fallback(&mut self, _sink: &mut dyn CommandSink) -> bool {
        true
    }

    fn on_abort(&mut self) {}
}

/// Summary of one poll pass.
#[derive(Debug, Default)]
pub struct PollOutcome {
    pub stepped: usize,
    pub completed: Vec<ConnectionId>,
    pub failed: Vec<ConnectionId>,
    pub aborted: Vec<ConnectionId>,
}

/// Owns the command queue and drives every unit cooperatively on one worker.
pub struct Scheduler {
    queue: VecDeque<Box<dyn Command>>,
    next_id: u64,
    metrics: Arc<Metrics>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("queued", &self.queue.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl CommandSink for Scheduler {
    fn enqueue(&mut self, command: Box<dyn Command>) {
        self.queue.push_back(command);
    }

    fn mint_id(&mut self) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        id
    }
}

impl Scheduler {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            queue: VecDeque::new(),
            next_id: 1,
            metrics,
        }
    }

    pub fn add(&mut self, command: Box<dyn Command>) {
        self.enqueue(command);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Runs one pass over every queued command. Commands enqueued by hooks
    /// during the pass run from the next pass onward.
    pub fn poll(&mut self, now: Instant) -> PollOutcome {
        let mut outcome = PollOutcome::default();
        let pass: Vec<Box<dyn Command>> = self.queue.drain(..).collect();

        for mut command in pass {
            let id = command.id();

            if command.should_abort() {
                command.on_abort();
                self.metrics.discarded.with_label_values(&["halt"]).inc();
                debug!(conn = %id, "command aborted before step");
                outcome.aborted.push(id);
                continue;
            }

            if now >= command.deadline() {
                warn!(conn = %id, "command deadline exceeded");
                self.fail(command, "timeout");
                outcome.failed.push(id);
                continue;
            }

            if !command.ready() {
                self.queue.push_back(command);
                continue;
            }

            outcome.stepped += 1;
            match command.step(self) {
                Ok(Progress::Continue) => self.queue.push_back(command),
                Ok(Progress::Finished) => {
                    debug!(conn = %id, "command finished");
                    outcome.completed.push(id);
                }
                Err(err) => {
                    warn!(conn = %id, %err, "command failed");
                    self.fail(command, "error");
                    outcome.failed.push(id);
                }
            }
        }

        self.metrics.queue_depth.set(self.queue.len() as i64);
        outcome
    }

    /// Aborts every queued command. Used for global teardown; the halt flag
    /// normally drains commands one poll earlier.
    pub fn shutdown(&mut self) {
        let pass: Vec<Box<dyn Command>> = self.queue.drain(..).collect();
        for mut command in pass {
            command.on_abort();
            self.metrics.discarded.with_label_values(&["halt"]).inc();
        }
        self.metrics.queue_depth.set(0);
    }

    fn fail(&mut self, mut command: Box<dyn Command>, reason: &str) {
        let handled = command.prepare_fallback(self);
        debug_assert!(handled, "fallback policies report failures as handled");
        command.on_abort();
        self.metrics.discarded.with_label_values(&[reason]).inc();
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if !self.queue.is_empty() {
            self.shutdown();
        }
    }
}
