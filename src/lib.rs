pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use error::{ErrorKind, LineageError, Result};

pub use logic::{FloweringLifecycle, LineageQueryService, LineageService, SequenceAllocator};

// Export all model types
pub use model::*;

// Export store types
pub use store::{MemoryStore, PostgresStore, Store};

/// Connect, migrate and serve until the listener closes
pub async fn run_server(config: &crate::config::AppConfig) -> anyhow::Result<()> {
    use axum::serve;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    let database_url = config.database_url()?;
    let postgres_store = crate::store::PostgresStore::new(&database_url, config.max_connections()).await?;

    postgres_store.migrate().await?;

    let service = Arc::new(LineageService::new(Arc::new(postgres_store), &config.lineage));
    let app = crate::api::routes::create_router().with_state(service);

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("Lineage server running on http://{}", bind_address);

    serve(listener, app).await?;

    Ok(())
}
