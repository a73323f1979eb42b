//! Typed errors and HTTP mapping.
//!
//! Every failure leaving a resource is an [`AppError`]. Variants that carry an
//! HTTP classification ([`ErrorKind`]) pass through the pipeline untouched;
//! the rest (store, database, serialization, config) are wrapped as
//! [`AppError::Internal`] by [`AppError::classify`] before they reach a client.

use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

const INTERNAL_MESSAGE: &str = "An internal server error occurred";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid model '{model}': {reason}")]
    InvalidModel { model: String, reason: String },
    #[error("duplicate route: {method} {path}")]
    DuplicateRoute { method: String, path: String },
    #[error("unknown auth strategy '{0}'")]
    UnknownAuthStrategy(String),
    #[error("config load: {0}")]
    Load(String),
}

/// HTTP classification of a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    BadRequest,
    Unauthorized,
    NotFound,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::Validation | ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal_error",
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal: {0}")]
    Internal(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("serialization: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AppError {
    /// `Some` when the error already carries an HTTP classification.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            AppError::Validation(_) => Some(ErrorKind::Validation),
            AppError::BadRequest(_) => Some(ErrorKind::BadRequest),
            AppError::Unauthorized(_) => Some(ErrorKind::Unauthorized),
            AppError::NotFound(_) => Some(ErrorKind::NotFound),
            AppError::Conflict(_) => Some(ErrorKind::Conflict),
            AppError::Internal(_) => Some(ErrorKind::Internal),
            AppError::Store(_) | AppError::Db(_) | AppError::Json(_) | AppError::Config(_) => None,
        }
    }

    pub fn is_classified(&self) -> bool {
        self.kind().is_some()
    }

    pub fn status(&self) -> StatusCode {
        self.kind().unwrap_or(ErrorKind::Internal).status()
    }

    /// Wrap an unclassified failure as `Internal`. The wrapped message keeps the
    /// cause for the log; it never reaches the response body.
    pub fn classify(self) -> AppError {
        if self.is_classified() {
            return self;
        }
        AppError::Internal(self.to_string())
    }

    /// Message safe to show to a client.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation(m)
            | AppError::BadRequest(m)
            | AppError::Unauthorized(m)
            | AppError::NotFound(m)
            | AppError::Conflict(m) => m.clone(),
            _ => INTERNAL_MESSAGE.into(),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind().unwrap_or(ErrorKind::Internal);
        let status = kind.status();
        let body = ErrorBody {
            error: ErrorDetail {
                code: kind.code().to_string(),
                message: self.public_message(),
                status_code: status.as_u16(),
            },
        };
        (status, Json(body)).into_response()
    }
}
