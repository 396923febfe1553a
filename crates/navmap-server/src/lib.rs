//! HTTP server for navmap.
//!
//! Exposes the merge engine as a JSON API: read a project's map, submit and
//! list diffs, merge or preview a diff with reviewer decisions, and read the
//! audit trail. Engine calls run on the blocking pool because the store
//! traits are synchronous.

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;
pub mod state;

pub use auth::{Action, AllowAllAuth, AuthProvider, Credentials, Identity, TokenAuth};
pub use config::{NavmapConfig, ServerConfig, StoreConfig, DEFAULT_PORT};
pub use error::{ErrorBody, ServerError, ServerResult};
pub use server::NavmapServer;
pub use state::AppState;
