use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficPoint {
    pub date: NaiveDate,
    pub count: u64,
}

/// Clone and view history of one repository, as returned by a single fetch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RepoTraffic {
    pub repo_name: String,
    pub clones: Vec<TrafficPoint>,
    pub views: Vec<TrafficPoint>,
}

impl RepoTraffic {
    /// A repository whose traffic couldn't be fetched still takes part, with no data.
    pub fn empty(repo_name: impl Into<String>) -> Self {
        Self {
            repo_name: repo_name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DayTotals {
    pub clones: u64,
    pub views: u64,
}

/// Per-day totals across repositories. Iteration is ascending by date.
pub type DailySeries = BTreeMap<NaiveDate, DayTotals>;

pub fn aggregate(repos: &[RepoTraffic], exclude_repos: &HashSet<String>) -> DailySeries {
    let mut series = DailySeries::new();

    for repo in repos.iter().filter(|r| !exclude_repos.contains(&r.repo_name)) {
        for point in &repo.clones {
            series.entry(point.date).or_default().clones += point.count;
        }
        for point in &repo.views {
            series.entry(point.date).or_default().views += point.count;
        }
    }

    series
}

/// Splits a comma-separated exclusion list, trimming names and dropping empties.
pub fn parse_exclude_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}
