//! Tracing subscriber setup.

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global fmt subscriber. `RUST_LOG` controls the filter;
/// repeated calls are no-ops (embedding hosts may install their own).
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("labtrack=info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
