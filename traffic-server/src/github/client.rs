//! GitHub REST client for repository listing, traffic, and profile lookups.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, LINK, USER_AGENT};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::{TrafficSource, UpstreamError};
use crate::traffic::{RepoTraffic, TrafficPoint};

const GITHUB_API_BASE: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";
const REPOS_PER_PAGE: u32 = 100;

#[derive(Deserialize)]
struct RepoSummary {
    name: String,
}

#[derive(Deserialize)]
struct TrafficEntry {
    timestamp: DateTime<Utc>,
    count: u64,
}

impl From<TrafficEntry> for TrafficPoint {
    fn from(entry: TrafficEntry) -> Self {
        TrafficPoint {
            date: entry.timestamp.date_naive(),
            count: entry.count,
        }
    }
}

#[derive(Deserialize)]
struct ClonesResponse {
    #[serde(default)]
    clones: Vec<TrafficEntry>,
}

#[derive(Deserialize)]
struct ViewsResponse {
    #[serde(default)]
    views: Vec<TrafficEntry>,
}

#[derive(Deserialize)]
struct UserProfile {
    login: String,
    name: Option<String>,
}

/// Authenticated GitHub API client with bounded per-repository fan-out.
pub struct GitHubClient {
    client: Client,
    base_url: String,
    concurrency: usize,
}

impl GitHubClient {
    pub fn new(token: &str, concurrency: usize) -> Result<Self, UpstreamError> {
        let mut headers = HeaderMap::new();

        let auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| UpstreamError::Payload(format!("invalid token: {e}")))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(GITHUB_API_VERSION),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("repo-traffic-chart"));

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            base_url: GITHUB_API_BASE.to_owned(),
            concurrency: concurrency.max(1),
        })
    }

    #[cfg(test)]
    fn with_base_url(base_url: &str, concurrency: usize) -> Self {
        let mut client = Self::new("test-token", concurrency).unwrap();
        client.base_url = base_url.trim_end_matches('/').to_owned();
        client
    }

    /// GETs `endpoint`, turning non-success statuses into errors.
    async fn get(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Response, UpstreamError> {
        let url = format!("{}{endpoint}", self.base_url);
        let response = self.client.get(&url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status { status, body });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, UpstreamError> {
        Ok(self.get(endpoint, &[]).await?.json().await?)
    }

    async fn list_repos(&self, username: &str) -> Result<Vec<String>, UpstreamError> {
        let endpoint = format!("/users/{username}/repos");
        let mut repos = Vec::new();
        let mut page = 1u32;

        loop {
            let response = self
                .get(
                    &endpoint,
                    &[
                        ("type", "public".to_owned()),
                        ("per_page", REPOS_PER_PAGE.to_string()),
                        ("page", page.to_string()),
                    ],
                )
                .await?;
            let more = has_next_page(response.headers());
            let batch: Vec<RepoSummary> = response.json().await?;
            if batch.is_empty() {
                break;
            }
            repos.extend(batch.into_iter().map(|r| r.name));
            if !more {
                break;
            }
            page += 1;
        }

        debug!("{username} has {} public repositories", repos.len());
        Ok(repos)
    }

    async fn repo_traffic(&self, owner: &str, repo: &str) -> Result<RepoTraffic, UpstreamError> {
        let clones_endpoint = format!("/repos/{owner}/{repo}/traffic/clones");
        let views_endpoint = format!("/repos/{owner}/{repo}/traffic/views");
        let (clones, views) = tokio::try_join!(
            self.get_json::<ClonesResponse>(&clones_endpoint),
            self.get_json::<ViewsResponse>(&views_endpoint),
        )?;

        Ok(RepoTraffic {
            repo_name: repo.to_owned(),
            clones: clones.clones.into_iter().map(TrafficPoint::from).collect(),
            views: views.views.into_iter().map(TrafficPoint::from).collect(),
        })
    }
}

#[async_trait]
impl TrafficSource for GitHubClient {
    async fn fetch_all_traffic(
        &self,
        username: &str,
        excluded: &HashSet<String>,
    ) -> Result<Vec<RepoTraffic>, UpstreamError> {
        let repos = self.list_repos(username).await?;
        let semaphore = Semaphore::new(self.concurrency);

        let tasks = repos
            .into_iter()
            .filter(|repo| !excluded.contains(repo))
            .map(|repo| {
                let semaphore = &semaphore;
                async move {
                    let Ok(_permit) = semaphore.acquire().await else {
                        return RepoTraffic::empty(repo);
                    };
                    match self.repo_traffic(username, &repo).await {
                        Ok(traffic) => traffic,
                        Err(e) => {
                            warn!("traffic for {username}/{repo} unavailable: {e}");
                            RepoTraffic::empty(repo)
                        }
                    }
                }
            });

        Ok(join_all(tasks).await)
    }

    async fn fetch_profile_name(&self) -> Result<String, UpstreamError> {
        let profile: UserProfile = self.get_json("/user").await?;
        Ok(profile.name.filter(|n| !n.is_empty()).unwrap_or(profile.login))
    }
}

/// True when a `Link` header advertises a `rel="next"` page.
fn has_next_page(headers: &HeaderMap) -> bool {
    headers
        .get(LINK)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|link| link.split(',').any(|part| part.contains("rel=\"next\"")))
}
