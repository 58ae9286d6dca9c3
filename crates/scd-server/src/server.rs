use std::sync::Arc;

use scd_engine::Engine;
use scd_models::tables;
use scd_store::{InMemoryStore, SqliteStore, VersionStore};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::{DatabaseConfig, ServerConfig};
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;

/// SCD HTTP server.
pub struct ScdServer {
    config: ServerConfig,
}

impl ScdServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router over `store` (useful for testing).
    pub fn router<S: VersionStore + 'static>(&self, store: Arc<S>) -> axum::Router {
        let engine = Engine::new(store).with_config(self.config.engine_config());
        let router = build_router(engine);
        if self.config.cors_permissive {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Open the configured database, apply the schema and serve requests.
    pub async fn serve(self) -> ServerResult<()> {
        match self.config.database.clone() {
            DatabaseConfig::Memory => {
                let store = InMemoryStore::with_schema(&tables());
                self.serve_store(Arc::new(store)).await
            }
            DatabaseConfig::Sqlite { path } => {
                let store = SqliteStore::open(&path)?;
                store.apply_schema(&tables())?;
                self.serve_store(Arc::new(store)).await
            }
        }
    }

    async fn serve_store<S: VersionStore + 'static>(self, store: Arc<S>) -> ServerResult<()> {
        let backend = store.backend();
        let app = self.router(store);
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!(addr = %self.config.bind_addr, backend, "SCD server listening");
        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_construction() {
        let server = ScdServer::new(ServerConfig::default());
        assert_eq!(server.config().bind_addr, "127.0.0.1:8081".parse().unwrap());
    }

    #[test]
    fn router_builds_for_both_backends() {
        let server = ScdServer::new(ServerConfig::default());
        let _memory = server.router(Arc::new(InMemoryStore::with_schema(&tables())));
        let sqlite = SqliteStore::open_in_memory().unwrap();
        sqlite.apply_schema(&tables()).unwrap();
        let _sqlite = server.router(Arc::new(sqlite));
    }
}
