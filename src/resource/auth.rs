//! Authentication strategies a resource can require by name.

use crate::error::AppError;
use async_trait::async_trait;
use axum::http::HeaderMap;

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Accept or reject the request from its headers.
    async fn authenticate(&self, headers: &HeaderMap) -> Result<(), AppError>;
}

/// Requires a header to carry a fixed secret, e.g. `X-Api-Key`.
pub struct HeaderToken {
    header: String,
    token: String,
}

impl HeaderToken {
    pub fn new(header: impl Into<String>, token: impl Into<String>) -> Self {
        HeaderToken {
            header: header.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl Authenticator for HeaderToken {
    async fn authenticate(&self, headers: &HeaderMap) -> Result<(), AppError> {
        let supplied = headers
            .get(self.header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim);
        match supplied {
            Some(t) if t == self.token => Ok(()),
            Some(_) => Err(AppError::Unauthorized("invalid credentials".into())),
            None => Err(AppError::Unauthorized(format!("missing {} header", self.header))),
        }
    }
}
