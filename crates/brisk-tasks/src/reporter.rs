//! Task execution reporting

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::sync::lock;

/// Events emitted while tasks run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// A task run is starting; a cache lookup follows
    Started { fqn: String },
    /// The cached result was reused
    CacheHit { fqn: String },
    /// The task has to run
    CacheMiss { fqn: String, reason: String },
    /// A shell command is about to run
    Command { fqn: String, command: String },
    /// A shell command produced a line of output
    Output {
        fqn: String,
        line: String,
        is_stderr: bool,
    },
    /// The task ran successfully
    Completed { fqn: String, duration: Duration },
    /// The task failed
    Failed { fqn: String, error: String },
    /// A caller attached to a run already in flight
    Joined { fqn: String },
}

impl TaskEvent {
    pub fn fqn(&self) -> &str {
        match self {
            Self::Started { fqn }
            | Self::CacheHit { fqn }
            | Self::CacheMiss { fqn, .. }
            | Self::Command { fqn, .. }
            | Self::Output { fqn, .. }
            | Self::Completed { fqn, .. }
            | Self::Failed { fqn, .. }
            | Self::Joined { fqn } => fqn,
        }
    }
}

/// Trait for reporting task execution progress
pub trait TaskReporter: Send + Sync {
    /// Handle a task event
    fn report(&self, event: &TaskEvent);
}

/// Reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl TaskReporter for TracingReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Started { fqn } => {
                tracing::debug!(task = %fqn, "starting");
            }
            TaskEvent::CacheHit { fqn } => {
                tracing::info!(task = %fqn, "up to date");
            }
            TaskEvent::CacheMiss { fqn, reason } => {
                tracing::info!(task = %fqn, %reason, "out of date");
            }
            TaskEvent::Command { fqn, command } => {
                tracing::info!("[{}] $ {}", fqn, command);
            }
            TaskEvent::Output { fqn, line, is_stderr } => {
                tracing::debug!(stderr = is_stderr, "[{}] {}", fqn, line);
            }
            TaskEvent::Completed { fqn, duration } => {
                tracing::info!("{} completed in {:.1}s", fqn, duration.as_secs_f64());
            }
            TaskEvent::Failed { fqn, error } => {
                tracing::error!("{} failed: {}", fqn, error);
            }
            TaskEvent::Joined { fqn } => {
                tracing::debug!(task = %fqn, "joined run in flight");
            }
        }
    }
}

/// Reporter that collects events for later inspection
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<TaskEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<TaskEvent> {
        lock(&self.events).clone()
    }

    /// Collected events of one task
    pub fn events_for(&self, fqn: &str) -> Vec<TaskEvent> {
        lock(&self.events)
            .iter()
            .filter(|e| e.fqn() == fqn)
            .cloned()
            .collect()
    }
}

impl TaskReporter for CollectingReporter {
    fn report(&self, event: &TaskEvent) {
        lock(&self.events).push(event.clone());
    }
}

/// Fans events out to several reporters
pub struct TaskReporterRegistry {
    reporters: Vec<Arc<dyn TaskReporter>>,
}

impl TaskReporterRegistry {
    pub fn new() -> Self {
        Self {
            reporters: vec![Arc::new(TracingReporter)],
        }
    }

    pub fn empty() -> Self {
        Self {
            reporters: Vec::new(),
        }
    }

    pub fn register<R: TaskReporter + 'static>(&mut self, reporter: R) {
        self.reporters.push(Arc::new(reporter));
    }

    pub fn all(&self) -> &[Arc<dyn TaskReporter>] {
        &self.reporters
    }
}

impl Default for TaskReporterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskReporter for TaskReporterRegistry {
    fn report(&self, event: &TaskEvent) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}
