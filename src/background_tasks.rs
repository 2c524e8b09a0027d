//! Background task orchestration.
//!
//! The broker owns a small number of maintenance loops (today: idle
//! transaction expiry). [`BackgroundTaskRegistry`] spawns them by name on a
//! runtime handle, reports their health and stops them together on shutdown.
//!
//! ```rust,no_run
//! use broker_core::background_tasks::{BackgroundTaskRegistry, TaskStatus};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut registry = BackgroundTaskRegistry::new(tokio::runtime::Handle::current());
//!
//!     registry.spawn_periodic("sweep", Duration::from_secs(10), |_tick| async {
//!         // periodic work
//!     });
//!
//!     for (name, status) in registry.health_check() {
//!         println!("{}: {:?}", name, status);
//!     }
//!
//!     registry.shutdown_all().await;
//! }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Status of a background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskStatus {
    /// Task is currently running.
    Running = 0,
    /// Task future returned on its own.
    Completed = 1,
    /// Task panicked.
    Failed = 2,
    /// Task was stopped via shutdown.
    Stopped = 3,
}

impl TaskStatus {
    /// Returns true if the task is healthy (running or completed).
    pub fn is_healthy(&self) -> bool {
        matches!(self, TaskStatus::Running | TaskStatus::Completed)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => TaskStatus::Running,
            1 => TaskStatus::Completed,
            2 => TaskStatus::Failed,
            _ => TaskStatus::Stopped,
        }
    }
}

struct TaskInfo {
    handle: JoinHandle<()>,
    status: Arc<AtomicU8>,
    spawned_at: Instant,
}

/// Registry of named background tasks.
pub struct BackgroundTaskRegistry {
    runtime: Handle,
    tasks: HashMap<&'static str, TaskInfo>,
    shutdown_tx: broadcast::Sender<()>,
    shutting_down: bool,
}

impl BackgroundTaskRegistry {
    /// Create a registry that spawns onto `runtime`.
    pub fn new(runtime: Handle) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            runtime,
            tasks: HashMap::new(),
            shutdown_tx,
            shutting_down: false,
        }
    }

    /// Spawn a named background task.
    ///
    /// A task with the same name is aborted and replaced. The task is dropped
    /// at its next await point once shutdown is signalled.
    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.shutting_down {
            tracing::warn!(task = name, "Ignoring spawn during shutdown");
            return;
        }

        if let Some(old_info) = self.tasks.remove(name) {
            old_info.handle.abort();
            tracing::debug!(task = name, "Aborted previous task instance");
        }

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let status = Arc::new(AtomicU8::new(TaskStatus::Running as u8));
        let task_status = status.clone();

        let handle = self.runtime.spawn(async move {
            let outcome = tokio::select! {
                result = AssertUnwindSafe(task).catch_unwind() => match result {
                    Ok(()) => TaskStatus::Completed,
                    Err(_) => {
                        tracing::error!(task = name, "Background task panicked");
                        TaskStatus::Failed
                    }
                },
                _ = shutdown_rx.recv() => {
                    tracing::debug!(task = name, "Task received shutdown signal");
                    TaskStatus::Stopped
                }
            };
            task_status.store(outcome as u8, Ordering::Release);
        });

        tracing::info!(task = name, "Spawned background task");

        self.tasks.insert(
            name,
            TaskInfo {
                handle,
                status,
                spawned_at: Instant::now(),
            },
        );
    }

    /// Spawn a task that runs `task` every `interval`.
    ///
    /// The first tick fires after one full interval, not immediately.
    pub fn spawn_periodic<F, Fut>(&mut self, name: &'static str, interval: Duration, mut task: F)
    where
        F: FnMut(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        self.spawn(name, async move {
            let mut tick = 0u64;
            let start = tokio::time::Instant::now() + interval;
            let mut interval_timer = tokio::time::interval_at(start, interval);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval_timer.tick().await;
                task(tick).await;
                tick = tick.wrapping_add(1);
            }
        });
    }

    /// Status of every registered task.
    pub fn health_check(&self) -> Vec<(&'static str, TaskStatus)> {
        self.tasks
            .iter()
            .map(|(name, info)| {
                (
                    *name,
                    TaskStatus::from_u8(info.status.load(Ordering::Acquire)),
                )
            })
            .collect()
    }

    /// True when no task has failed.
    pub fn all_healthy(&self) -> bool {
        self.health_check().iter().all(|(_, s)| s.is_healthy())
    }

    /// Names of tasks that panicked.
    pub fn failed_tasks(&self) -> Vec<&'static str> {
        self.health_check()
            .into_iter()
            .filter(|(_, s)| *s == TaskStatus::Failed)
            .map(|(name, _)| name)
            .collect()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn running_count(&self) -> usize {
        self.health_check()
            .iter()
            .filter(|(_, s)| *s == TaskStatus::Running)
            .count()
    }

    /// Time since the named task was spawned.
    pub fn task_uptime(&self, name: &str) -> Option<Duration> {
        self.tasks.get(name).map(|info| info.spawned_at.elapsed())
    }

    /// Shutdown all tasks, waiting up to five seconds.
    pub async fn shutdown_all(&mut self) {
        self.shutdown_all_with_timeout(Duration::from_secs(5)).await;
    }

    /// Shutdown all tasks; tasks still running at the deadline are aborted.
    pub async fn shutdown_all_with_timeout(&mut self, timeout: Duration) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;

        tracing::info!(
            task_count = self.tasks.len(),
            "Initiating background task shutdown"
        );

        let _ = self.shutdown_tx.send(());

        let deadline = tokio::time::Instant::now() + timeout;

        for (name, info) in self.tasks.drain() {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());

            if remaining.is_zero() {
                tracing::warn!(task = name, "Aborting task (timeout exceeded)");
                info.handle.abort();
                continue;
            }

            let abort = info.handle.abort_handle();
            match tokio::time::timeout(remaining, info.handle).await {
                Ok(Ok(())) => {
                    tracing::debug!(task = name, "Task shutdown complete");
                }
                Ok(Err(e)) => {
                    tracing::warn!(task = name, error = %e, "Task failed during shutdown");
                }
                Err(_) => {
                    tracing::warn!(task = name, "Task did not respond to shutdown, aborting");
                    abort.abort();
                }
            }
        }

        tracing::info!("All background tasks shutdown complete");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }
}

impl Drop for BackgroundTaskRegistry {
    fn drop(&mut self) {
        if !self.shutting_down {
            let _ = self.shutdown_tx.send(());
            for (name, info) in self.tasks.drain() {
                tracing::debug!(task = name, "Aborting task on registry drop");
                info.handle.abort();
            }
        }
    }
}
