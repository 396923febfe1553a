use std::sync::Arc;

use axum::http::HeaderMap;
use navmap_merge::MergeEngine;

use crate::auth::{Action, AllowAllAuth, AuthProvider, Credentials, Identity};
use crate::error::{ServerError, ServerResult};

/// Shared handler state: the engine and the auth provider.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<MergeEngine>,
    auth: Arc<dyn AuthProvider>,
    require_auth: bool,
}

impl AppState {
    pub fn new(engine: Arc<MergeEngine>) -> Self {
        Self {
            engine,
            auth: Arc::new(AllowAllAuth),
            require_auth: false,
        }
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = auth;
        self
    }

    pub fn require_auth(mut self, require: bool) -> Self {
        self.require_auth = require;
        self
    }

    pub fn engine(&self) -> &Arc<MergeEngine> {
        &self.engine
    }

    /// Authenticate the caller and check it may perform `action`.
    pub async fn authorize(&self, headers: &HeaderMap, action: Action) -> ServerResult<Identity> {
        let credentials = Credentials::from_headers(headers);
        if self.require_auth && credentials == Credentials::Anonymous {
            return Err(ServerError::AuthFailed("bearer token required".into()));
        }
        let identity = self.auth.authenticate(&credentials).await?;
        if !self.auth.authorize(&identity, &action).await? {
            return Err(ServerError::AuthorizationDenied(format!(
                "{} may not {action}",
                identity.name
            )));
        }
        Ok(identity)
    }

    /// Run a synchronous engine call on the blocking pool.
    pub async fn blocking<T, F>(&self, f: F) -> ServerResult<T>
    where
        F: FnOnce(&MergeEngine) -> navmap_merge::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || f(engine.as_ref()))
            .await
            .map_err(|e| ServerError::Internal(format!("engine task failed: {e}")))?
            .map_err(ServerError::from)
    }
}
