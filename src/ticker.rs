//! Cancellable periodic tasks.
//!
//! Every timer the viewer or publisher starts is owned by a [`PeriodicTask`]
//! or a [`TaskScope`]. Stopping (or dropping) the owner cancels the timer, so
//! tearing a view down never leaks a running poll.

use std::future::Future;
use std::time::Duration;

use log::debug;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// A task that runs `tick` immediately and then once per `period` until stopped.
///
/// A tick that is still running when the task is stopped is abandoned at its
/// next await point.
#[derive(Debug)]
pub struct PeriodicTask {
    name: String,
    period: Duration,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn the task on the current tokio runtime.
    pub fn start<F, Fut>(name: impl Into<String>, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let period = period.max(Duration::from_millis(1));
        let cancel = CancellationToken::new();

        let token = cancel.clone();
        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = tick() => {}
                        }
                    }
                }
            }
            debug!("[PeriodicTask] '{}' stopped", task_name);
        });

        debug!("[PeriodicTask] '{}' started (every {:?})", name, period);

        Self {
            name,
            period,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel the task and wait for it to finish.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// A group of periodic tasks torn down together.
#[derive(Debug, Default)]
pub struct TaskScope {
    tasks: Vec<PeriodicTask>,
}

impl TaskScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a task owned by this scope.
    pub fn spawn<F, Fut>(&mut self, name: impl Into<String>, period: Duration, tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tasks.push(PeriodicTask::start(name, period, tick));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name()).collect()
    }

    /// Stop every task and wait for all of them.
    pub async fn shutdown(mut self) {
        for task in self.tasks.drain(..) {
            task.stop().await;
        }
    }
}
