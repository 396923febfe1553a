use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use navmap_merge::MergeError;
use navmap_types::TypeError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<TypeError> for ServerError {
    fn from(err: TypeError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
    pub retryable: bool,
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Merge(e) => match e {
                MergeError::NotFound(_) => StatusCode::NOT_FOUND,
                MergeError::InvalidState { .. } | MergeError::Conflict { .. } => {
                    StatusCode::CONFLICT
                }
                MergeError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                MergeError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                MergeError::Invariant(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::AuthFailed(_) => StatusCode::UNAUTHORIZED,
            Self::AuthorizationDenied(_) => StatusCode::FORBIDDEN,
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Merge(e) => e.kind(),
            Self::InvalidArgument(_) => "invalid_argument",
            Self::AuthFailed(_) => "unauthorized",
            Self::AuthorizationDenied(_) => "forbidden",
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => "internal",
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Merge(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, kind = self.kind(), "request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
            retryable: self.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use navmap_types::{DiffId, ProjectId};

    #[test]
    fn merge_errors_map_to_http_status() {
        let project = ProjectId::new("shop").unwrap();
        let cases = [
            (MergeError::NotFound("diff".into()), StatusCode::NOT_FOUND),
            (
                MergeError::InvalidState {
                    diff: DiffId::new(),
                    reason: "diff is applied".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                MergeError::Conflict {
                    project,
                    attempts: 5,
                },
                StatusCode::CONFLICT,
            ),
            (MergeError::InvalidArgument("x".into()), StatusCode::BAD_REQUEST),
            (
                MergeError::StoreUnavailable("disk".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                MergeError::Invariant("dangling".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ServerError::from(err).status(), status);
        }
    }

    #[test]
    fn conflict_is_retryable() {
        let err = ServerError::from(MergeError::Conflict {
            project: ProjectId::new("shop").unwrap(),
            attempts: 5,
        });
        assert!(err.is_retryable());
        assert_eq!(err.kind(), "conflict");
        assert!(!ServerError::InvalidArgument("x".into()).is_retryable());
    }

    #[test]
    fn type_errors_are_bad_requests() {
        let err: ServerError = ProjectId::new("../etc").unwrap_err().into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
