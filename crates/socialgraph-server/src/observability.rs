//! Tracing setup for the server binary.
//!
//! `RUST_LOG` wins over `logging.level`. The level can be changed at runtime
//! through [`apply_logging_level`] once the merged configuration is known.

use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, Registry, filter::Directive, fmt, prelude::*, reload};

static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Per-connection chatter kept out of debug output.
const QUIET_TARGETS: &[&str] = &["h2=warn", "hyper=warn", "redis=warn", "deadpool=warn"];

fn filter_for(level: &str) -> EnvFilter {
    QUIET_TARGETS
        .iter()
        .filter_map(|d| d.parse::<Directive>().ok())
        .fold(EnvFilter::new(level), EnvFilter::add_directive)
}

fn rust_log_is_set() -> bool {
    std::env::var_os("RUST_LOG").is_some()
}

pub fn init_tracing() {
    init_tracing_with_level("info");
}

pub fn init_tracing_with_level(level: &str) {
    let filter = if rust_log_is_set() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_for(level))
    } else {
        filter_for(level)
    };

    let (filter, handle) = reload::Layer::new(filter);
    let _ = FILTER_HANDLE.set(handle);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}

/// Swap the active filter for `level`. A no-op while `RUST_LOG` is set.
pub fn apply_logging_level(level: &str) {
    if rust_log_is_set() {
        tracing::debug!(level, "RUST_LOG is set; ignoring logging.level");
        return;
    }
    let Some(handle) = FILTER_HANDLE.get() else {
        return;
    };
    if let Err(e) = handle.modify(|f| *f = filter_for(level)) {
        tracing::warn!(error = %e, level, "Failed to apply log level");
    }
}
