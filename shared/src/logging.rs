use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

/// Installs the global fmt subscriber. `RUST_LOG` overrides the `info` default.
pub fn init(crate_name: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))?;

    tracing::debug!("tracing initialised for {crate_name}");
    Ok(())
}

/// Initialise tracing for the calling crate.
#[macro_export]
macro_rules! init_tracing {
    () => {
        $crate::logging::init(env!("CARGO_PKG_NAME"))
    };
}
