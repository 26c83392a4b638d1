use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::config;

const MINUTE: u64 = 60;
const HOUR: u64 = 3600;

/// Service tuning, resolved to durations.
#[derive(Debug, Clone)]
pub struct Settings {
    pub cache_capacity: usize,
    pub data_ttl: Duration,
    pub chart_ttl: Duration,
    pub data_refresh: Duration,
    pub chart_refresh: Duration,
    pub sweep_interval: Duration,
    pub idle_after: Duration,
    pub fetch_concurrency: usize,
    pub render_timeout: Duration,
    /// Overrides the bundled theme directory.
    pub themes_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            cache_capacity: config::CACHE_CAPACITY,
            data_ttl: config::DATA_TTL,
            chart_ttl: config::CHART_TTL,
            data_refresh: config::DATA_REFRESH_INTERVAL,
            chart_refresh: config::CHART_REFRESH_INTERVAL,
            sweep_interval: config::IDLE_SWEEP_INTERVAL,
            idle_after: config::IDLE_AFTER,
            fetch_concurrency: config::FETCH_CONCURRENCY,
            render_timeout: config::RENDER_TIMEOUT,
            themes_dir: None,
        }
    }
}

impl Settings {
    /// Refreshes must land before the TTL they protect, and a key must stay
    /// idle longer than any refresh interval before it is retired.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("refresh.data_interval_minutes", self.data_refresh),
            ("refresh.chart_interval_minutes", self.chart_refresh),
            ("refresh.sweep_interval_hours", self.sweep_interval),
            ("render.timeout_secs", self.render_timeout),
        ] {
            if value.is_zero() {
                return Err(format!("{name} must be positive"));
            }
        }
        if self.data_refresh >= self.data_ttl {
            return Err("refresh.data_interval_minutes must be shorter than cache.data_ttl_minutes".into());
        }
        if self.chart_refresh >= self.chart_ttl {
            return Err("refresh.chart_interval_minutes must be shorter than cache.chart_ttl_minutes".into());
        }
        if self.idle_after <= self.data_refresh.max(self.chart_refresh) {
            return Err("refresh.idle_after_hours must exceed every refresh interval".into());
        }
        if self.cache_capacity == 0 || self.fetch_concurrency == 0 {
            return Err("cache.capacity and github.concurrency must be positive".into());
        }
        Ok(())
    }
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct SettingsFile {
    cache: CacheSection,
    refresh: RefreshSection,
    github: GitHubSection,
    render: RenderSection,
    themes_dir: Option<PathBuf>,
}

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CacheSection {
    capacity: usize,
    data_ttl_minutes: u64,
    chart_ttl_minutes: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        CacheSection {
            capacity: config::CACHE_CAPACITY,
            data_ttl_minutes: config::DATA_TTL.as_secs() / MINUTE,
            chart_ttl_minutes: config::CHART_TTL.as_secs() / MINUTE,
        }
    }
}

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RefreshSection {
    data_interval_minutes: u64,
    chart_interval_minutes: u64,
    sweep_interval_hours: u64,
    idle_after_hours: u64,
}

impl Default for RefreshSection {
    fn default() -> Self {
        RefreshSection {
            data_interval_minutes: config::DATA_REFRESH_INTERVAL.as_secs() / MINUTE,
            chart_interval_minutes: config::CHART_REFRESH_INTERVAL.as_secs() / MINUTE,
            sweep_interval_hours: config::IDLE_SWEEP_INTERVAL.as_secs() / HOUR,
            idle_after_hours: config::IDLE_AFTER.as_secs() / HOUR,
        }
    }
}

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct GitHubSection {
    concurrency: usize,
}

impl Default for GitHubSection {
    fn default() -> Self {
        GitHubSection {
            concurrency: config::FETCH_CONCURRENCY,
        }
    }
}

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RenderSection {
    timeout_secs: u64,
}

impl Default for RenderSection {
    fn default() -> Self {
        RenderSection {
            timeout_secs: config::RENDER_TIMEOUT.as_secs(),
        }
    }
}

impl From<SettingsFile> for Settings {
    fn from(file: SettingsFile) -> Self {
        Settings {
            cache_capacity: file.cache.capacity,
            data_ttl: Duration::from_secs(file.cache.data_ttl_minutes * MINUTE),
            chart_ttl: Duration::from_secs(file.cache.chart_ttl_minutes * MINUTE),
            data_refresh: Duration::from_secs(file.refresh.data_interval_minutes * MINUTE),
            chart_refresh: Duration::from_secs(file.refresh.chart_interval_minutes * MINUTE),
            sweep_interval: Duration::from_secs(file.refresh.sweep_interval_hours * HOUR),
            idle_after: Duration::from_secs(file.refresh.idle_after_hours * HOUR),
            fetch_concurrency: file.github.concurrency,
            render_timeout: Duration::from_secs(file.render.timeout_secs),
            themes_dir: file.themes_dir,
        }
    }
}

/// Loads settings from a TOML file. Returns `Settings::default()` if the file
/// doesn't exist; parse errors and inconsistent values are `InvalidData`.
pub fn load(path: &Path) -> io::Result<Settings> {
    let settings = match fs::read_to_string(path) {
        Ok(content) => {
            let file: SettingsFile = toml::from_str(&content)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            Settings::from(file)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Settings::default(),
        Err(e) => return Err(e),
    };

    settings
        .validate()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(settings)
}
