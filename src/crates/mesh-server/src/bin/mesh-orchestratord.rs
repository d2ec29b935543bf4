//! `mesh-orchestratord` — the HTTP process hosting `/api/run` and
//! `/api/history*`.

use std::sync::Arc;

use mesh_checkpoint::{Checkpointer, InMemoryCheckpointer};
use mesh_server::api::routes::create_router;
use mesh_server::config::ServerConfig;
use mesh_server::db::DatabaseConnection;
use mesh_server::history::sqlite::SqliteHistoryStore;
use mesh_server::history::HistoryStore;
use mesh_server::version::{PKG_NAME, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = ServerConfig::from_env();
    tracing::info!(name = PKG_NAME, version = VERSION, port = config.port, "starting");

    std::fs::create_dir_all(&config.history_dir)?;
    let db = DatabaseConnection::new(&config.database_url()).await?;
    db.run_migrations().await?;

    let history: Arc<dyn HistoryStore> = Arc::new(SqliteHistoryStore::new(db.pool().clone()));

    let recovered = history.recover_running_runs().await?;
    if !recovered.is_empty() {
        tracing::warn!(count = recovered.len(), "recovered runs left running at last shutdown as interrupted");
    }

    // Process-local: a resumable run's checkpoint does not survive a
    // restart of this process. Matches the sqlite history store's
    // single-instance deployment assumption.
    let checkpointer: Arc<dyn Checkpointer> = Arc::new(InMemoryCheckpointer::new());

    let app = create_router(history, Arc::new(config.clone()), checkpointer);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
