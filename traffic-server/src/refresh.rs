//! Periodic background refresh of cached values, keyed per cache entry.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::error::AppError;

/// Re-produces a cached value and writes it back.
pub type RefreshAction = Arc<dyn Fn() -> BoxFuture<'static, Result<(), AppError>> + Send + Sync>;

/// Per-key lifecycle: `Unscheduled` until the first cache population, then
/// `Scheduled` until the key goes idle. Retiring a job drops it from the
/// coordinator entirely, so a retired key reports `Unscheduled` and only a
/// fresh cache miss schedules it again. Keeping no record of retired keys
/// keeps the coordinator bounded by the number of live keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Unscheduled,
    Scheduled,
}

struct RefreshJob {
    last_run: Arc<Mutex<Option<Instant>>>,
    last_access: Instant,
    handle: JoinHandle<()>,
}

pub struct RefreshCoordinator<K> {
    jobs: HashMap<K, RefreshJob>,
}

impl<K> RefreshCoordinator<K>
where
    K: Eq + Hash + Clone + Display + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            jobs: HashMap::new(),
        }
    }

    /// Starts running `action` every `interval`, first tick one interval from
    /// now. Does nothing if `key` already has a job. Returns whether a job was
    /// created.
    pub fn schedule(&mut self, key: K, interval: Duration, action: RefreshAction) -> bool {
        if self.jobs.contains_key(&key) {
            return false;
        }

        let last_run = Arc::new(Mutex::new(None));
        let first_tick = Instant::now() + interval;
        let handle = tokio::spawn(run_job(
            key.to_string(),
            first_tick,
            interval,
            action,
            Arc::clone(&last_run),
        ));

        info!("scheduled refresh for {key} every {interval:?}");
        self.jobs.insert(
            key,
            RefreshJob {
                last_run,
                last_access: Instant::now(),
                handle,
            },
        );
        true
    }

    /// Records that `key` was just served.
    pub fn touch(&mut self, key: &K) {
        if let Some(job) = self.jobs.get_mut(key) {
            job.last_access = Instant::now();
        }
    }

    pub fn state(&self, key: &K) -> JobState {
        if self.jobs.contains_key(key) {
            JobState::Scheduled
        } else {
            JobState::Unscheduled
        }
    }

    /// When the job for `key` last completed successfully.
    pub fn last_run(&self, key: &K) -> Option<Instant> {
        let job = self.jobs.get(key)?;
        *job.last_run.lock().unwrap()
    }

    /// Cancels every job not touched within `idle_after` and returns their keys.
    pub fn retire_idle(&mut self, idle_after: Duration) -> Vec<K> {
        let now = Instant::now();
        let idle: Vec<K> = self
            .jobs
            .iter()
            .filter(|(_, job)| now.duration_since(job.last_access) > idle_after)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &idle {
            self.retire(key);
        }
        idle
    }

    pub fn retire(&mut self, key: &K) -> bool {
        match self.jobs.remove(key) {
            Some(job) => {
                job.handle.abort();
                info!("retired refresh for {key}");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Cancels all jobs.
    pub fn shutdown(&mut self) {
        for (_, job) in self.jobs.drain() {
            job.handle.abort();
        }
    }
}

impl<K> Default for RefreshCoordinator<K>
where
    K: Eq + Hash + Clone + Display + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Drop for RefreshCoordinator<K> {
    fn drop(&mut self) {
        for job in self.jobs.values() {
            job.handle.abort();
        }
    }
}

async fn run_job(
    key: String,
    first_tick: Instant,
    interval: Duration,
    action: RefreshAction,
    last_run: Arc<Mutex<Option<Instant>>>,
) {
    let mut ticker = tokio::time::interval_at(first_tick, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match action().await {
            Ok(()) => {
                *last_run.lock().unwrap() = Some(Instant::now());
                debug!("refreshed {key}");
            }
            // The job stays registered; the next tick retries.
            Err(e) => error!("refresh of {key} failed: {e}"),
        }
    }
}
