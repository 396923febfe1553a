use std::sync::Arc;

use navmap_merge::MergeEngine;
use tokio::net::TcpListener;

use crate::auth::AuthProvider;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;
use crate::state::AppState;

/// navmap HTTP server.
pub struct NavmapServer {
    config: ServerConfig,
    state: AppState,
}

impl NavmapServer {
    pub fn new(config: ServerConfig, engine: Arc<MergeEngine>) -> Self {
        let state = AppState::new(engine).require_auth(config.require_auth);
        Self { config, state }
    }

    /// Replace the default allow-all auth provider.
    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.state = self.state.with_auth(auth);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Start serving requests.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "navmap server listening");
        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use navmap_merge::MergeConfig;
    use navmap_store::InMemoryStore;

    fn engine() -> Arc<MergeEngine> {
        Arc::new(MergeEngine::new(
            Arc::new(InMemoryStore::new()),
            MergeConfig::default(),
        ))
    }

    #[test]
    fn server_construction() {
        let server = NavmapServer::new(ServerConfig::default(), engine());
        assert_eq!(server.config().bind_addr, "127.0.0.1:7420".parse().unwrap());
    }

    #[test]
    fn router_builds() {
        let server = NavmapServer::new(ServerConfig::default(), engine());
        let _router = server.router();
    }
}
