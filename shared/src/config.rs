use std::{env, path::Path};

use anyhow::{Context, Result};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

pub struct GitHubConfig {
    /// Token used to read repository traffic, which GitHub only exposes to
    /// accounts with push access
    pub token: String,
    /// Address the HTTP server listens on
    pub bind_addr: String,
}

impl GitHubConfig {
    pub fn load(manifest_dir: &Path) -> Result<Self> {
        #[cfg(debug_assertions)]
        if let Err(e) = dotenvy::from_path(manifest_dir.join(".env")) {
            if !e.not_found() {
                return Err(e).context("Can't read .env file");
            }
        }
        #[cfg(not(debug_assertions))]
        let _ = manifest_dir;

        Ok(Self {
            token: env::var("GITHUB_TOKEN").context("Expected GITHUB_TOKEN in environment")?,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_owned()),
        })
    }
}

/// Load GitHub config using the calling crate's manifest directory.
#[macro_export]
macro_rules! load_config {
    () => {
        $crate::config::GitHubConfig::load(std::path::Path::new(env!("CARGO_MANIFEST_DIR")))
    };
}
