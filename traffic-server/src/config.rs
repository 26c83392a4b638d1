//! Behavioral constants for caching, refresh scheduling, and chart rendering.

use std::time::Duration;

pub const CACHE_CAPACITY: usize = 100;
pub const DATA_TTL: Duration = Duration::from_secs(30 * 60);
pub const CHART_TTL: Duration = Duration::from_secs(30 * 60);

pub const DATA_REFRESH_INTERVAL: Duration = Duration::from_secs(26 * 60);
pub const CHART_REFRESH_INTERVAL: Duration = Duration::from_secs(28 * 60);
pub const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(3 * 24 * 3600);
pub const IDLE_AFTER: Duration = Duration::from_secs(2 * 24 * 3600);

pub const FETCH_CONCURRENCY: usize = 5;
pub const RENDER_TIMEOUT: Duration = Duration::from_secs(10);

pub const CACHE_CONTROL: &str = "public, max-age=1800, s-maxage=3600, stale-while-revalidate=86400";
pub const SVG_CONTENT_TYPE: &str = "image/svg+xml; charset=utf-8";
pub const HOMEPAGE_URL: &str = "https://github.com/FuseFairy/github-repo-traffic";

pub const DEFAULT_THEME: &str = "default";
pub const DEFAULT_RADIUS: u32 = 20;
pub const MIN_HEIGHT: u32 = 400;
pub const MIN_WIDTH: u32 = 800;
pub const MIN_TICKS: u32 = 5;
