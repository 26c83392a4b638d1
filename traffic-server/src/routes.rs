use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;
use tracing::{debug, error};

use crate::charts::ChartConfig;
use crate::color::Color;
use crate::config::{
    CACHE_CONTROL, DEFAULT_RADIUS, DEFAULT_THEME, HOMEPAGE_URL, MIN_HEIGHT, MIN_TICKS, MIN_WIDTH,
    SVG_CONTENT_TYPE,
};
use crate::error::AppError;
use crate::service::CacheService;
use crate::traffic::parse_exclude_list;

const MAX_LOGIN_LEN: usize = 39;

/// Query string of `GET /api`. Both camelCase and snake_case names are
/// accepted.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartQuery {
    username: String,
    #[serde(default = "default_theme")]
    theme: String,
    #[serde(default, alias = "bg_color")]
    bg_color: Option<String>,
    #[serde(default, alias = "clones_color")]
    clones_color: Option<String>,
    #[serde(default, alias = "views_color")]
    views_color: Option<String>,
    #[serde(default, alias = "clones_point_color")]
    clones_point_color: Option<String>,
    #[serde(default, alias = "views_point_color")]
    views_point_color: Option<String>,
    #[serde(default = "default_radius")]
    radius: u32,
    #[serde(default = "default_height")]
    height: u32,
    #[serde(default = "default_width")]
    width: u32,
    #[serde(default = "default_ticks")]
    ticks: u32,
    #[serde(default, alias = "exclude_repos")]
    exclude_repos: Option<String>,
}

fn default_theme() -> String {
    DEFAULT_THEME.to_owned()
}

fn default_radius() -> u32 {
    DEFAULT_RADIUS
}

fn default_height() -> u32 {
    MIN_HEIGHT
}

fn default_width() -> u32 {
    MIN_WIDTH
}

fn default_ticks() -> u32 {
    MIN_TICKS
}

/// An empty value counts as absent, so `bgColor=` means "use the theme".
fn parse_color(name: &str, raw: Option<&str>) -> Result<Option<Color>, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(digits) => Color::from_hex_digits(digits)
            .map(Some)
            .map_err(|e| AppError::InvalidParameter(format!("{name}: {e}"))),
    }
}

/// GitHub logins: 1 to 39 ASCII alphanumerics or hyphens. The name ends up
/// in API paths, so nothing else gets through.
fn is_github_login(name: &str) -> bool {
    (1..=MAX_LOGIN_LEN).contains(&name.len())
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

fn at_least(name: &str, value: u32, min: u32) -> Result<u32, AppError> {
    if value < min {
        return Err(AppError::InvalidParameter(format!(
            "{name} must be at least {min}, got {value}"
        )));
    }
    Ok(value)
}

impl ChartQuery {
    /// Validates the raw query and splits it into the username and the
    /// chart configuration.
    pub fn into_request(self) -> Result<(String, ChartConfig), AppError> {
        let username = self.username.trim();
        if !is_github_login(username) {
            return Err(AppError::InvalidParameter(format!(
                "username {username:?} is not a valid GitHub login"
            )));
        }

        let config = ChartConfig {
            theme: self.theme,
            bg_color: parse_color("bgColor", self.bg_color.as_deref())?,
            clones_color: parse_color("clonesColor", self.clones_color.as_deref())?,
            views_color: parse_color("viewsColor", self.views_color.as_deref())?,
            clones_point_color: parse_color("clonesPointColor", self.clones_point_color.as_deref())?,
            views_point_color: parse_color("viewsPointColor", self.views_point_color.as_deref())?,
            radius: self.radius,
            height: at_least("height", self.height, MIN_HEIGHT)?,
            width: at_least("width", self.width, MIN_WIDTH)?,
            ticks: at_least("ticks", self.ticks, MIN_TICKS)?,
            exclude_repos: Vec::new(),
        }
        .with_excluded_repos(parse_exclude_list(self.exclude_repos.as_deref().unwrap_or("")));

        Ok((username.to_owned(), config))
    }
}

/// True when any tag in an `If-None-Match` header names `etag`.
/// Weak tags compare by their opaque part.
fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    let etag = etag.trim_start_matches("W/");
    if_none_match
        .split(',')
        .map(str::trim)
        .any(|tag| tag == "*" || tag.trim_start_matches("W/") == etag)
}

pub async fn root() -> Redirect {
    Redirect::temporary(HOMEPAGE_URL)
}

pub async fn traffic_chart(
    State(service): State<Arc<CacheService>>,
    headers: HeaderMap,
    query: Result<Query<ChartQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let result = serve_chart(&service, &headers, query).await;
    if let Err(e) = &result {
        error!("chart request failed: {e}");
    }
    result
}

async fn serve_chart(
    service: &Arc<CacheService>,
    headers: &HeaderMap,
    query: Result<Query<ChartQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(query) = query.map_err(|e| AppError::InvalidParameter(e.body_text()))?;
    let (username, config) = query.into_request()?;

    let chart = service.chart(&username, &config).await?;

    let not_modified = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| etag_matches(value, &chart.etag));

    if not_modified {
        debug!("{username}: client copy of {} is current", chart.etag);
        return Ok((
            StatusCode::NOT_MODIFIED,
            [
                (header::ETAG, chart.etag.clone()),
                (header::CACHE_CONTROL, CACHE_CONTROL.to_owned()),
            ],
        )
            .into_response());
    }

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, SVG_CONTENT_TYPE.to_owned()),
            (header::CACHE_CONTROL, CACHE_CONTROL.to_owned()),
            (header::ETAG, chart.etag.clone()),
        ],
        chart.svg.clone(),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use async_trait::async_trait;
    use axum::http::{HeaderValue, Uri};
    use chrono::NaiveDate;

    use super::*;
    use crate::github::{TrafficSource, UpstreamError};
    use crate::settings::Settings;
    use crate::theme::ThemeStore;
    use crate::traffic::{RepoTraffic, TrafficPoint};

    struct OneRepo;

    #[async_trait]
    impl TrafficSource for OneRepo {
        async fn fetch_all_traffic(
            &self,
            _username: &str,
            _excluded: &HashSet<String>,
        ) -> Result<Vec<RepoTraffic>, UpstreamError> {
            Ok(vec![RepoTraffic {
                repo_name: "r1".to_owned(),
                clones: vec![TrafficPoint {
                    date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                    count: 3,
                }],
                views: Vec::new(),
            }])
        }

        async fn fetch_profile_name(&self) -> Result<String, UpstreamError> {
            Ok("Alice".to_owned())
        }
    }

    fn service() -> Arc<CacheService> {
        Arc::new(CacheService::new(
            Arc::new(OneRepo),
            ThemeStore::bundled(),
            Settings::default(),
        ))
    }

    fn query(uri: &str) -> Result<Query<ChartQuery>, QueryRejection> {
        Query::try_from_uri(&uri.parse::<Uri>().unwrap())
    }

    fn request(uri: &str) -> Result<(String, ChartConfig), AppError> {
        query(uri).unwrap().0.into_request()
    }

    #[test]
    fn test_defaults() {
        let (username, config) = request("/api?username=alice").unwrap();
        assert_eq!(username, "alice");
        assert_eq!(config, ChartConfig::default());
    }

    #[test]
    fn test_camel_and_snake_names() {
        let (_, camel) = request("/api?username=a&bgColor=112233&excludeRepos=b,a").unwrap();
        let (_, snake) = request("/api?username=a&bg_color=112233&exclude_repos=a,b,a").unwrap();

        assert_eq!(camel, snake);
        assert_eq!(camel.exclude_repos, vec!["a".to_owned(), "b".to_owned()]);
        assert_eq!(camel.bg_color.unwrap().rgb(), "#112233");
    }

    #[test]
    fn test_empty_color_means_theme() {
        let (_, config) = request("/api?username=a&viewsColor=").unwrap();
        assert_eq!(config.views_color, None);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        for uri in [
            "/api?username=a&height=399",
            "/api?username=a&width=799",
            "/api?username=a&ticks=4",
            "/api?username=a&clonesColor=%23112233",
            "/api?username=a&clonesColor=12345",
            "/api?username=a&viewsPointColor=zzzzzz",
            "/api?username=%20",
        ] {
            let err = request(uri).unwrap_err();
            assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY, "{uri}");
        }
    }

    #[test]
    fn test_username_must_be_a_github_login() {
        for uri in [
            "/api?username=..%2Fuser",
            "/api?username=alice%2Frepos",
            "/api?username=al%20ice",
            "/api?username=al.ice",
            "/api?username=%3Fpage%3D2",
            "/api?username=aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
        ] {
            let err = request(uri).unwrap_err();
            assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY, "{uri}");
        }

        let (username, _) = request("/api?username=%20Octo-Cat42%20").unwrap();
        assert_eq!(username, "Octo-Cat42");
        assert!(request(&format!("/api?username={}", "a".repeat(39))).is_ok());
    }

    #[test]
    fn test_missing_or_malformed_query_is_rejected() {
        assert!(query("/api").is_err());
        assert!(query("/api?username=a&height=tall").is_err());
    }

    #[test]
    fn test_etag_matching() {
        let etag = "\"00ff\"";
        assert!(etag_matches("\"00ff\"", etag));
        assert!(etag_matches("W/\"00ff\"", etag));
        assert!(etag_matches("\"aaaa\", \"00ff\"", etag));
        assert!(etag_matches("*", etag));
        assert!(!etag_matches("\"aaaa\"", etag));
        assert!(!etag_matches("00ff", etag));
    }

    #[tokio::test]
    async fn test_serves_svg_with_cache_headers() {
        let response = traffic_chart(State(service()), HeaderMap::new(), query("/api?username=alice"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], SVG_CONTENT_TYPE);
        assert_eq!(headers[header::CACHE_CONTROL], CACHE_CONTROL);
        assert!(headers.contains_key(header::ETAG));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.starts_with("<svg"));
        assert!(body.contains("Alice's Repo Traffic Stats"));
    }

    #[tokio::test]
    async fn test_matching_etag_is_not_modified() {
        let service = service();
        let first = traffic_chart(
            State(Arc::clone(&service)),
            HeaderMap::new(),
            query("/api?username=alice"),
        )
        .await
        .unwrap();
        let etag = first.headers()[header::ETAG].clone();

        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, etag.clone());
        let second = traffic_chart(State(service), headers, query("/api?username=alice"))
            .await
            .unwrap();

        assert_eq!(second.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(second.headers()[header::ETAG], etag);
        assert!(!second.headers().contains_key(header::CONTENT_TYPE));
        let body = axum::body::to_bytes(second.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_stale_etag_gets_full_body() {
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("\"stale\""));

        let response = traffic_chart(State(service()), headers, query("/api?username=alice"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let unknown_theme = traffic_chart(
            State(service()),
            HeaderMap::new(),
            query("/api?username=alice&theme=solarized-neon"),
        )
        .await
        .unwrap_err();
        assert_eq!(unknown_theme.status(), StatusCode::NOT_FOUND);

        let missing_username = traffic_chart(State(service()), HeaderMap::new(), query("/api"))
            .await
            .unwrap_err();
        assert_eq!(missing_username.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_root_redirects_home() {
        let response = root().await.into_response();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[header::LOCATION], HOMEPAGE_URL);
    }
}
