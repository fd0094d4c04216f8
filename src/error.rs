//! Error type shared by the nonce provider, the filters and the middleware.

use axum::{
    http::{StatusCode, header::InvalidHeaderValue},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum CspError {
    /// The random source could not produce a nonce. Fatal for the request.
    #[error("entropy source failed: {0}")]
    Entropy(String),

    #[error("policy is not a valid header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),

    /// A handler asked for the request CSP on a route without the middleware.
    #[error("strict CSP middleware is not installed on this route")]
    NotInstalled,
}

impl IntoResponse for CspError {
    fn into_response(self) -> Response {
        error!(error = %self, "Aborting response");
        // Never fall back to serving the page without a usable nonce.
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
    }
}
