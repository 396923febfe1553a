use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};

use crate::error::{ServerError, ServerResult};

/// Who is making a request. The name becomes the audit actor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub is_anonymous: bool,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self {
            name: navmap_merge::ANONYMOUS_ACTOR.into(),
            is_anonymous: true,
        }
    }

    pub fn user(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_anonymous: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    Bearer(String),
    Anonymous,
}

impl Credentials {
    /// Extract credentials from an `Authorization: Bearer` header.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map_or(Self::Anonymous, |token| Self::Bearer(token.to_string()))
    }
}

#[derive(Clone, Debug)]
pub enum Action {
    Read { project: String },
    ReadDiff { diff: String },
    Submit { project: String },
    Merge { diff: String },
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { project } => write!(f, "read:{project}"),
            Self::ReadDiff { diff } => write!(f, "read-diff:{diff}"),
            Self::Submit { project } => write!(f, "submit:{project}"),
            Self::Merge { diff } => write!(f, "merge:{diff}"),
        }
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity>;
    async fn authorize(&self, identity: &Identity, action: &Action) -> ServerResult<bool>;
}

/// Accepts everyone. A bearer token becomes a `bearer:<prefix>` identity.
pub struct AllowAllAuth;

#[async_trait]
impl AuthProvider for AllowAllAuth {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        match credentials {
            Credentials::Bearer(token) => {
                let prefix: String = token.chars().take(8).collect();
                Ok(Identity::user(format!("bearer:{prefix}")))
            }
            Credentials::Anonymous => Ok(Identity::anonymous()),
        }
    }

    async fn authorize(&self, _identity: &Identity, _action: &Action) -> ServerResult<bool> {
        Ok(true)
    }
}

/// Fixed token → reviewer name table. Anonymous callers may only read.
#[derive(Clone, Debug, Default)]
pub struct TokenAuth {
    tokens: HashMap<String, String>,
}

impl TokenAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, name: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), name.into());
        self
    }
}

#[async_trait]
impl AuthProvider for TokenAuth {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        match credentials {
            Credentials::Bearer(token) => self
                .tokens
                .get(token)
                .map(Identity::user)
                .ok_or_else(|| ServerError::AuthFailed("unknown token".into())),
            Credentials::Anonymous => Ok(Identity::anonymous()),
        }
    }

    async fn authorize(&self, identity: &Identity, action: &Action) -> ServerResult<bool> {
        Ok(!identity.is_anonymous
            || matches!(action, Action::Read { .. } | Action::ReadDiff { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn identity_variants() {
        let a = Identity::anonymous();
        assert_eq!(a.name, "anonymous");
        assert!(a.is_anonymous);

        let u = Identity::user("alice");
        assert_eq!(u.name, "alice");
        assert!(!u.is_anonymous);
    }

    #[test]
    fn action_display() {
        assert_eq!(Action::Read { project: "shop".into() }.to_string(), "read:shop");
        assert_eq!(Action::Merge { diff: "d".into() }.to_string(), "merge:d");
    }

    #[test]
    fn bearer_header_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(Credentials::from_headers(&headers), Credentials::Anonymous);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(
            Credentials::from_headers(&headers),
            Credentials::Bearer("abc123".into())
        );

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(Credentials::from_headers(&headers), Credentials::Anonymous);
    }

    #[tokio::test]
    async fn allow_all_auth() {
        let auth = AllowAllAuth;
        let id = auth.authenticate(&Credentials::Anonymous).await.unwrap();
        assert_eq!(id.name, "anonymous");
        assert!(auth
            .authorize(&id, &Action::Merge { diff: "d".into() })
            .await
            .unwrap());

        let id = auth
            .authenticate(&Credentials::Bearer("mytoken123".into()))
            .await
            .unwrap();
        assert_eq!(id.name, "bearer:mytoken1");
    }

    #[tokio::test]
    async fn token_auth() {
        let auth = TokenAuth::new().with_token("s3cret", "ana");
        let ana = auth
            .authenticate(&Credentials::Bearer("s3cret".into()))
            .await
            .unwrap();
        assert_eq!(ana.name, "ana");
        assert!(auth
            .authenticate(&Credentials::Bearer("nope".into()))
            .await
            .is_err());

        let anon = Identity::anonymous();
        let read = Action::Read { project: "shop".into() };
        let merge = Action::Merge { diff: "d".into() };
        assert!(auth.authorize(&anon, &read).await.unwrap());
        assert!(!auth.authorize(&anon, &merge).await.unwrap());
        assert!(auth.authorize(&ana, &merge).await.unwrap());
    }
}
