pub mod axis;
pub mod path;
pub mod svg;

use std::collections::HashSet;
use std::fmt::Write;

use crate::color::Color;
use crate::config::{DEFAULT_RADIUS, DEFAULT_THEME, MIN_HEIGHT, MIN_TICKS, MIN_WIDTH};

/// Everything that decides a chart's pixels, apart from the traffic itself.
///
/// Each optional color falls back to the matching entry of the resolved
/// theme: `bg_color` to `background_color`, `clones_color`/`views_color` to
/// `line_colors`, and the point colors to `point_colors`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartConfig {
    pub theme: String,
    pub bg_color: Option<Color>,
    pub clones_color: Option<Color>,
    pub views_color: Option<Color>,
    pub clones_point_color: Option<Color>,
    pub views_point_color: Option<Color>,
    /// Corner radius of the background rectangle.
    pub radius: u32,
    pub height: u32,
    pub width: u32,
    /// Target number of y-axis intervals.
    pub ticks: u32,
    /// Sorted and deduplicated.
    pub exclude_repos: Vec<String>,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            theme: DEFAULT_THEME.to_owned(),
            bg_color: None,
            clones_color: None,
            views_color: None,
            clones_point_color: None,
            views_point_color: None,
            radius: DEFAULT_RADIUS,
            height: MIN_HEIGHT,
            width: MIN_WIDTH,
            ticks: MIN_TICKS,
            exclude_repos: Vec::new(),
        }
    }
}

impl ChartConfig {
    pub fn with_excluded_repos(mut self, mut repos: Vec<String>) -> Self {
        repos.sort();
        repos.dedup();
        self.exclude_repos = repos;
        self
    }

    pub fn excluded_set(&self) -> HashSet<String> {
        self.exclude_repos.iter().cloned().collect()
    }

    /// Identifies the rendered chart for `username` under this configuration.
    /// Equal keys always render to equal SVG given the same traffic data.
    pub fn cache_key(&self, username: &str) -> String {
        let mut key = format!("{username}|{}", self.theme);
        for color in [
            &self.bg_color,
            &self.clones_color,
            &self.views_color,
            &self.clones_point_color,
            &self.views_point_color,
        ] {
            let _ = match color {
                Some(color) => write!(key, "|{color}"),
                None => write!(key, "|-"),
            };
        }
        let _ = write!(
            key,
            "|{}|{}|{}|{}|{}",
            self.radius,
            self.height,
            self.width,
            self.ticks,
            self.exclude_repos.join(",")
        );
        key
    }
}
