//! Error types for the model server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use inference_common::protocol::{ERROR, ERROR_TYPE};

use crate::plugin::{ResolveError, WorkerError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Resolution(#[from] ResolveError),

    #[error("Worker creation failed: {0}")]
    WorkerCreation(#[source] WorkerError),

    #[error("Worker {slot} failed: {source}")]
    Worker {
        slot: usize,
        #[source]
        source: WorkerError,
    },

    #[error("Worker {0} panicked while executing")]
    WorkerPanicked(usize),

    #[error("Bad input. '{0}' not found")]
    MissingField(&'static str),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            Error::Resolution(_) => (StatusCode::INTERNAL_SERVER_ERROR, "resolution_failed"),
            Error::WorkerCreation(_) => (StatusCode::INTERNAL_SERVER_ERROR, "worker_creation_failed"),
            Error::Worker {
                source: WorkerError::BadInput(_),
                ..
            } => (StatusCode::BAD_REQUEST, "bad_input"),
            Error::Worker { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "dispatch_failed"),
            Error::WorkerPanicked(_) => (StatusCode::INTERNAL_SERVER_ERROR, "dispatch_failed"),
            Error::MissingField(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();

        let body = Json(json!({
            ERROR: self.to_string(),
            ERROR_TYPE: error_type,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
