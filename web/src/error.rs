use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::*;
use serde_json::json;

use service::error::{Error as ServiceError, ErrorKind};

#[derive(Debug)]
pub enum Error {
    /// The request carried no body at all.
    EmptyBody,
    /// The body was not JSON of the expected shape.
    InvalidJson(String),
    Service(ServiceError),
}

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::EmptyBody => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "ok": false, "error": "EMPTY_BODY" })),
            )
                .into_response(),
            Error::InvalidJson(details) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "ok": false, "error": "INVALID_JSON", "details": details })),
            )
                .into_response(),
            Error::Service(err) => {
                error!("State write failed: {err}");
                let details = err
                    .source
                    .as_ref()
                    .map(|source| source.to_string())
                    .unwrap_or_else(|| err.to_string());
                match err.error_kind {
                    ErrorKind::Storage | ErrorKind::Serialization => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({ "ok": false, "error": "WRITE_FAILED", "details": details })),
                    )
                        .into_response(),
                }
            }
        }
    }
}

impl From<ServiceError> for Error {
    fn from(err: ServiceError) -> Self {
        Self::Service(err)
    }
}
