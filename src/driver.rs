#![cfg(feature = "driver")]

//! Tokio scaffolding for driving a [`Scheduler`](crate::sched::Scheduler).
//!
//! The scheduler itself is a plain synchronous object; this module hosts it on
//! a single task that polls it on a fixed interval, accepts new commands over
//! a channel, and surfaces per-command outcomes as events. Keeping everything
//! on one task preserves the cooperative single-worker model the commands are
//! written against.

use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::{
    sync::mpsc::{self, error::TrySendError, Receiver, Sender},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::debug;

use crate::sched::{Command, ConnectionId, Scheduler};

/// Parameters controlling how the scheduler task runs.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Interval between scheduler polls.
    pub tick: Duration,
    /// Capacity of the command channel between handle and task.
    pub command_buffer: usize,
    /// Capacity of the event channel surfaced to the caller.
    pub event_buffer: usize,
    /// Quiet time after which a single idle notification is emitted; zero
    /// disables idle notifications.
    pub idle_after: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(10),
            command_buffer: 256,
            event_buffer: 1024,
            idle_after: Duration::from_secs(1),
        }
    }
}

/// Events emitted by the scheduler task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverEvent {
    /// A command reached terminal success.
    Completed(ConnectionId),
    /// A command was discarded through the failure path.
    Failed(ConnectionId),
    /// A command was discarded before stepping (halt).
    Aborted(ConnectionId),
    /// No command made progress for at least `idle_after`.
    Idle(Duration),
    /// The task drained its queue and exited.
    Stopped,
}

/// Errors returned by [`DriverHandle`].
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver channel closed")]
    ChannelClosed,
    #[error("driver command queue is full")]
    QueueFull,
    #[error("driver join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

enum DriverCommand {
    Submit(Box<dyn Command>),
    Shutdown,
}

/// Handle used to feed commands to a spawned scheduler task.
#[derive(Debug)]
pub struct DriverHandle {
    commands: Sender<DriverCommand>,
    join: JoinHandle<()>,
}

impl DriverHandle {
    /// Queues a command for the next poll pass.
    pub fn submit(&self, command: Box<dyn Command>) -> Result<(), DriverError> {
        self.commands
            .try_send(DriverCommand::Submit(command))
            .map_err(|err| match err {
                TrySendError::Closed(_) => DriverError::ChannelClosed,
                TrySendError::Full(_) => DriverError::QueueFull,
            })
    }

    /// Stops the task, aborting whatever is still queued, and waits for it.
    pub async fn shutdown(self) -> Result<(), DriverError> {
        self.commands
            .send(DriverCommand::Shutdown)
            .await
            .map_err(|_| DriverError::ChannelClosed)?;
        self.join.await?;
        Ok(())
    }
}

/// Spawns the task that owns and continuously polls `scheduler`.
pub fn spawn_scheduler(
    scheduler: Scheduler,
    config: DriverConfig,
) -> (DriverHandle, Receiver<DriverEvent>) {
    let (command_tx, command_rx) = mpsc::channel(config.command_buffer.max(1));
    let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));
    let join = tokio::spawn(run_scheduler(scheduler, config, command_rx, event_tx));
    (
        DriverHandle {
            commands: command_tx,
            join,
        },
        event_rx,
    )
}

async fn run_scheduler(
    mut scheduler: Scheduler,
    config: DriverConfig,
    mut commands: Receiver<DriverCommand>,
    events: Sender<DriverEvent>,
) {
    let mut ticker = time::interval(config.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last_progress = Instant::now();
    let mut idle_notified = false;

    loop {
        tokio::select! {
            biased;
            maybe_command = commands.recv() => {
                match maybe_command {
                    Some(DriverCommand::Submit(command)) => scheduler.add(command),
                    Some(DriverCommand::Shutdown) | None => break,
                }
            }
            _ = ticker.tick() => {
                let outcome = scheduler.poll(Instant::now());
                let progressed = outcome.stepped > 0
                    || !outcome.completed.is_empty()
                    || !outcome.failed.is_empty()
                    || !outcome.aborted.is_empty();

                for id in outcome.completed {
                    push_event(&events, DriverEvent::Completed(id));
                }
                for id in outcome.failed {
                    push_event(&events, DriverEvent::Failed(id));
                }
                for id in outcome.aborted {
                    push_event(&events, DriverEvent::Aborted(id));
                }

                if progressed {
                    last_progress = Instant::now();
                    idle_notified = false;
                } else if !idle_notified
                    && !config.idle_after.is_zero()
                    && last_progress.elapsed() >= config.idle_after
                {
                    push_event(&events, DriverEvent::Idle(last_progress.elapsed()));
                    idle_notified = true;
                }
            }
        }
    }

    scheduler.shutdown();
    push_event(&events, DriverEvent::Stopped);
}

fn push_event(events: &Sender<DriverEvent>, event: DriverEvent) {
    if let Err(TrySendError::Full(dropped)) = events.try_send(event) {
        debug!(?dropped, "driver event channel full; dropping event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use crate::metrics::Metrics;
    use crate::sched::{CommandError, CommandSink, Interest, Progress};

    struct TickCommand {
        id: ConnectionId,
        remaining: usize,
    }

    impl Command for TickCommand {
        fn id(&self) -> ConnectionId {
            self.id
        }

        fn interest(&self) -> Interest {
            Interest::Read
        }

        fn deadline(&self) -> Instant {
            Instant::now() + Duration::from_secs(60)
        }

        fn ready(&self) -> bool {
            true
        }

        fn step(&mut self, _sink: &mut dyn CommandSink) -> Result<Progress, CommandError> {
            self.remaining -= 1;
            if self.remaining == 0 {
                Ok(Progress::Finished)
            } else {
                Ok(Progress::Continue)
            }
        }
    }

    async fn next_event(events: &mut Receiver<DriverEvent>) -> Option<DriverEvent> {
        tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn drives_commands_to_completion() {
        let scheduler = Scheduler::new(Arc::new(Metrics::new().expect("metrics")));
        let config = DriverConfig {
            tick: Duration::from_millis(2),
            ..DriverConfig::default()
        };
        let (handle, mut events) = spawn_scheduler(scheduler, config);

        handle
            .submit(Box::new(TickCommand {
                id: ConnectionId(5),
                remaining: 3,
            }))
            .expect("submit");

        let mut completed = None;
        while let Some(event) = next_event(&mut events).await {
            if let DriverEvent::Completed(id) = event {
                completed = Some(id);
                break;
            }
        }
        assert_eq!(completed, Some(ConnectionId(5)));

        handle.shutdown().await.expect("shutdown");
        let mut stopped = false;
        while let Some(event) = next_event(&mut events).await {
            if event == DriverEvent::Stopped {
                stopped = true;
                break;
            }
        }
        assert!(stopped, "expected stopped event");
    }

    #[tokio::test]
    async fn emits_idle_after_quiet_period() {
        let scheduler = Scheduler::new(Arc::new(Metrics::new().expect("metrics")));
        let config = DriverConfig {
            tick: Duration::from_millis(2),
            idle_after: Duration::from_millis(10),
            ..DriverConfig::default()
        };
        let (handle, mut events) = spawn_scheduler(scheduler, config);

        let mut idle_seen = false;
        while let Some(event) = next_event(&mut events).await {
            if matches!(event, DriverEvent::Idle(_)) {
                idle_seen = true;
                break;
            }
        }
        assert!(idle_seen, "expected idle event");

        handle.shutdown().await.expect("shutdown");
    }
}
