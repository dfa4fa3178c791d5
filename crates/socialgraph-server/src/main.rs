use std::{env, sync::Arc};

use socialgraph_server::config::loader::{DEFAULT_CONFIG_FILE, load_config};
use socialgraph_server::services::InMemoryRecords;
use socialgraph_server::{ServerBuilder, metrics, observability};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist - it's optional
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    // Initialize tracing early with the default level
    observability::init_tracing();

    let config_path = resolve_config_path();
    let cfg = load_config(Some(&config_path))
        .map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;
    tracing::info!(path = %config_path, "Configuration loaded");

    observability::apply_logging_level(&cfg.logging.level);
    metrics::init_metrics();

    let records = Arc::new(InMemoryRecords::new());
    let server = ServerBuilder::new().with_config(cfg).build(records).await;
    server.run().await
}

/// Resolve the configuration file path.
///
/// Priority order:
/// 1. CLI argument: --config <path>
/// 2. Environment variable: SOCIALGRAPH_CONFIG
/// 3. Default: socialgraph.toml
fn resolve_config_path() -> String {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return path;
            }
        }
    }

    match env::var("SOCIALGRAPH_CONFIG") {
        Ok(path) if !path.is_empty() => path,
        _ => DEFAULT_CONFIG_FILE.to_string(),
    }
}
