//! DOM Application - Main Entry Point

use domapp::{init_logging, run, DomappConfig};
use tracing::info;

const DEFAULT_CONFIG: &str = "domapp.toml";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = DomappConfig::load(&path)?;
    init_logging(config.log_level()?, config.logging.json)?;

    info!("=== DOM application v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", path);

    run(config).await
}
