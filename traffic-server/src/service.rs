//! Two-tier cache in front of the traffic source and the chart renderer.
//!
//! Traffic snapshots are cached per username; rendered charts per request
//! key *and* snapshot version, so a data refresh makes older charts
//! unreachable without re-rendering them eagerly. Every populated key gets a
//! background refresh job, retired once the key goes unrequested for
//! `Settings::idle_after`.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::cache::CacheStore;
use crate::charts::{ChartConfig, svg};
use crate::error::AppError;
use crate::github::TrafficSource;
use crate::refresh::{RefreshAction, RefreshCoordinator};
use crate::settings::Settings;
use crate::theme::ThemeStore;
use crate::traffic::{RepoTraffic, aggregate};

/// Upstream data for one account, immutable once built.
#[derive(Debug, PartialEq)]
pub struct TrafficSnapshot {
    pub profile_name: String,
    pub repos: Vec<RepoTraffic>,
    /// Changes only when the fetched data does.
    pub version: u64,
}

#[derive(Debug)]
pub struct RenderedChart {
    pub svg: String,
    /// Quoted strong validator derived from the SVG bytes.
    pub etag: String,
    pub data_version: u64,
}

impl RenderedChart {
    fn new(svg: String, data_version: u64) -> Self {
        let mut hasher = DefaultHasher::new();
        svg.hash(&mut hasher);
        Self {
            etag: format!("\"{:016x}\"", hasher.finish()),
            svg,
            data_version,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RefreshKey {
    Traffic(String),
    Chart(String),
}

impl fmt::Display for RefreshKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshKey::Traffic(username) => write!(f, "traffic:{username}"),
            RefreshKey::Chart(key) => write!(f, "chart:{key}"),
        }
    }
}

fn versioned_key(request_key: &str, version: u64) -> String {
    format!("{request_key}@v{version}")
}

/// True when `key` is `request_key` at some data version. Request keys may
/// themselves contain `@v`, so the version suffix has to be all digits.
fn is_version_of(key: &str, request_key: &str) -> bool {
    key.strip_prefix(request_key)
        .and_then(|rest| rest.strip_prefix("@v"))
        .is_some_and(|version| !version.is_empty() && version.bytes().all(|b| b.is_ascii_digit()))
}

pub struct CacheService {
    source: Arc<dyn TrafficSource>,
    themes: ThemeStore,
    settings: Settings,
    traffic: RwLock<CacheStore<Arc<TrafficSnapshot>>>,
    charts: RwLock<CacheStore<Arc<RenderedChart>>>,
    refresh: Mutex<RefreshCoordinator<RefreshKey>>,
    /// One lock per key being populated, so concurrent misses fetch once.
    population_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    next_version: AtomicU64,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl CacheService {
    pub fn new(source: Arc<dyn TrafficSource>, themes: ThemeStore, settings: Settings) -> Self {
        CacheService {
            source,
            themes,
            traffic: RwLock::new(CacheStore::new(settings.cache_capacity)),
            charts: RwLock::new(CacheStore::new(settings.cache_capacity)),
            settings,
            refresh: Mutex::new(RefreshCoordinator::new()),
            population_locks: Mutex::new(HashMap::new()),
            next_version: AtomicU64::new(0),
            sweeper: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Spawns the idle sweep.
    pub fn start(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let every = self.settings.sweep_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(service) = weak.upgrade() else {
                    break;
                };
                service.sweep_idle();
            }
        });

        if let Some(previous) = self.sweeper.lock().unwrap().replace(handle) {
            previous.abort();
        }
        info!("cache service started, idle sweep every {every:?}");
    }

    /// Cancels all background work and drops every cached value.
    pub fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }
        self.refresh.lock().unwrap().shutdown();
        self.traffic.write().unwrap().clear();
        self.charts.write().unwrap().clear();
        info!("cache service stopped");
    }

    /// Retires refresh jobs for keys nobody asked for within `idle_after`
    /// and deletes their cache entries. Returns how many jobs were retired.
    pub fn sweep_idle(&self) -> usize {
        let (retired, remaining) = {
            let mut refresh = self.refresh.lock().unwrap();
            let retired = refresh.retire_idle(self.settings.idle_after);
            (retired, refresh.len())
        };

        for key in &retired {
            match key {
                RefreshKey::Traffic(username) => {
                    self.traffic.write().unwrap().remove(username);
                }
                RefreshKey::Chart(request_key) => {
                    self.charts
                        .write()
                        .unwrap()
                        .retain(|k| !is_version_of(k, request_key));
                }
            }
        }

        let purged = self.traffic.write().unwrap().purge_expired()
            + self.charts.write().unwrap().purge_expired();
        info!(
            "idle sweep retired {} jobs, purged {purged} expired entries, {remaining} jobs remain",
            retired.len()
        );
        retired.len()
    }

    /// The chart for `username` under `config`, rendering it on a miss.
    pub async fn chart(
        self: &Arc<Self>,
        username: &str,
        config: &ChartConfig,
    ) -> Result<Arc<RenderedChart>, AppError> {
        // Fail an unknown theme before doing any upstream work.
        self.themes.load(&config.theme)?;

        let request_key = config.cache_key(username);
        let snapshot = self.traffic(username).await?;
        self.touch(&RefreshKey::Chart(request_key.clone()));

        let key = versioned_key(&request_key, snapshot.version);
        let cached = self.charts.read().unwrap().get(&key);
        if let Some(chart) = cached {
            return Ok(chart);
        }

        let lock = self.population_lock(&key);
        let _guard = lock.lock().await;

        let cached = self.charts.read().unwrap().get(&key);
        if let Some(chart) = cached {
            return Ok(chart);
        }

        let chart = self.render(Arc::clone(&snapshot), config.clone()).await;
        let chart = match chart {
            Ok(chart) => chart,
            Err(e) => {
                self.release_population_lock(&key);
                return Err(e);
            }
        };

        self.charts
            .write()
            .unwrap()
            .put(key.clone(), Arc::clone(&chart), Some(self.settings.chart_ttl));
        self.release_population_lock(&key);
        self.schedule_chart_refresh(username, request_key, config.clone());

        Ok(chart)
    }

    /// The traffic snapshot for `username`, fetching it on a miss.
    pub async fn traffic(self: &Arc<Self>, username: &str) -> Result<Arc<TrafficSnapshot>, AppError> {
        let refresh_key = RefreshKey::Traffic(username.to_owned());
        self.touch(&refresh_key);

        let cached = self.traffic.read().unwrap().get(username);
        if let Some(snapshot) = cached {
            return Ok(snapshot);
        }

        let lock_key = refresh_key.to_string();
        let lock = self.population_lock(&lock_key);
        let _guard = lock.lock().await;

        let cached = self.traffic.read().unwrap().get(username);
        if let Some(snapshot) = cached {
            return Ok(snapshot);
        }

        info!("fetching traffic for {username}");
        let snapshot = match self.fetch_snapshot(username).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.release_population_lock(&lock_key);
                return Err(e);
            }
        };
        self.release_population_lock(&lock_key);
        self.schedule_data_refresh(username);

        Ok(snapshot)
    }

    /// Fetches fresh data and caches it. The version only moves when the
    /// data differs from what is already cached.
    async fn fetch_snapshot(&self, username: &str) -> Result<Arc<TrafficSnapshot>, AppError> {
        let no_exclusions = HashSet::new();
        let (repos, profile_name) = tokio::try_join!(
            self.source.fetch_all_traffic(username, &no_exclusions),
            self.source.fetch_profile_name(),
        )?;

        let mut traffic = self.traffic.write().unwrap();
        let snapshot = match traffic.get(username) {
            Some(current) if current.repos == repos && current.profile_name == profile_name => current,
            _ => Arc::new(TrafficSnapshot {
                profile_name,
                repos,
                version: self.next_version.fetch_add(1, Ordering::Relaxed) + 1,
            }),
        };
        traffic.put(username, Arc::clone(&snapshot), Some(self.settings.data_ttl));
        Ok(snapshot)
    }

    /// Renders off the async runtime, bounded by the configured timeout.
    async fn render(
        &self,
        snapshot: Arc<TrafficSnapshot>,
        config: ChartConfig,
    ) -> Result<Arc<RenderedChart>, AppError> {
        let theme = self.themes.load(&config.theme)?;

        let task = tokio::task::spawn_blocking(move || {
            let series = aggregate(&snapshot.repos, &config.excluded_set());
            let svg = svg::render(&snapshot.profile_name, &series, &config, &theme);
            RenderedChart::new(svg, snapshot.version)
        });

        match tokio::time::timeout(self.settings.render_timeout, task).await {
            Ok(Ok(chart)) => Ok(Arc::new(chart)),
            Ok(Err(e)) => Err(AppError::Unexpected(format!("chart generation failed: {e}"))),
            Err(_) => Err(AppError::GenerationTimeout),
        }
    }

    fn schedule_data_refresh(self: &Arc<Self>, username: &str) {
        let weak = Arc::downgrade(self);
        let username = username.to_owned();
        let key = RefreshKey::Traffic(username.clone());

        let action: RefreshAction = Arc::new(move || {
            let weak = Weak::clone(&weak);
            let username = username.clone();
            async move {
                let Some(service) = weak.upgrade() else {
                    return Ok(());
                };
                let snapshot = service.fetch_snapshot(&username).await?;
                debug!("traffic for {username} now at v{}", snapshot.version);
                Ok(())
            }
            .boxed()
        });

        self.refresh
            .lock()
            .unwrap()
            .schedule(key, self.settings.data_refresh, action);
    }

    fn schedule_chart_refresh(self: &Arc<Self>, username: &str, request_key: String, config: ChartConfig) {
        let weak = Arc::downgrade(self);
        let username = username.to_owned();
        let key = RefreshKey::Chart(request_key.clone());

        let action: RefreshAction = Arc::new(move || {
            let weak = Weak::clone(&weak);
            let username = username.clone();
            let request_key = request_key.clone();
            let config = config.clone();
            async move {
                let Some(service) = weak.upgrade() else {
                    return Ok(());
                };
                service.refresh_chart(&username, &request_key, config).await
            }
            .boxed()
        });

        self.refresh
            .lock()
            .unwrap()
            .schedule(key, self.settings.chart_refresh, action);
    }

    /// Re-stores the chart for the current data version, rendering only
    /// when that version has no chart yet.
    async fn refresh_chart(
        self: &Arc<Self>,
        username: &str,
        request_key: &str,
        config: ChartConfig,
    ) -> Result<(), AppError> {
        let cached = self.traffic.read().unwrap().get(username);
        let snapshot = match cached {
            Some(snapshot) => snapshot,
            None => self.fetch_snapshot(username).await?,
        };

        let key = versioned_key(request_key, snapshot.version);
        let existing = self.charts.read().unwrap().get(&key);
        let chart = match existing {
            Some(chart) => chart,
            None => {
                debug!("re-rendering {key}");
                self.render(snapshot, config).await?
            }
        };

        self.charts
            .write()
            .unwrap()
            .put(key, chart, Some(self.settings.chart_ttl));
        Ok(())
    }

    fn touch(&self, key: &RefreshKey) {
        self.refresh.lock().unwrap().touch(key);
    }

    fn population_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.population_locks.lock().unwrap();
        Arc::clone(locks.entry(key.to_owned()).or_default())
    }

    /// Called while still holding the lock: later arrivals either queue on
    /// the same mutex or find the value already cached.
    fn release_population_lock(&self, key: &str) {
        self.population_locks.lock().unwrap().remove(key);
    }
}

impl Drop for CacheService {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().ok().and_then(Option::take) {
            handle.abort();
        }
    }
}
