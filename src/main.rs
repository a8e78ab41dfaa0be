use cladari_lineage::config::AppConfig;
use cladari_lineage::run_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging with explicit filter to suppress sqlx debug logs
    use env_logger::{Builder, Env};
    use log::LevelFilter;

    Builder::from_env(Env::default().default_filter_or("info"))
        .filter_module("sqlx", LevelFilter::Warn)
        .init();

    log::info!("Cladari lineage service starting");

    let config = AppConfig::load()?;
    log::info!(
        "Configuration loaded: server={}:{}, max_connections={}, max_allocation_attempts={}",
        config.server.host,
        config.server.port,
        config.max_connections(),
        config.lineage.max_allocation_attempts
    );

    run_server(&config).await
}
