//! Upstream traffic retrieval.

mod client;

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use crate::traffic::RepoTraffic;

pub use client::GitHubClient;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("GitHub request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitHub returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("unexpected GitHub payload: {0}")]
    Payload(String),
}

/// Where traffic comes from. Implementations degrade a single repository's
/// failure to empty series; only listing or profile failures are errors.
#[async_trait]
pub trait TrafficSource: Send + Sync {
    /// Traffic for every public repository of `username`, skipping `excluded`.
    async fn fetch_all_traffic(
        &self,
        username: &str,
        excluded: &HashSet<String>,
    ) -> Result<Vec<RepoTraffic>, UpstreamError>;

    /// Display name of the account the token belongs to.
    async fn fetch_profile_name(&self) -> Result<String, UpstreamError>;
}
