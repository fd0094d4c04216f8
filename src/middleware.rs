//! Strict CSP middleware.
//!
//! Installs a fresh [`RequestCsp`] in each request's extensions and writes the
//! header on the way out. Response bodies are never touched: handlers apply
//! the nonce to the templates and embeds they trust through [`CspFilters`].

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::Response,
    middleware::Next,
    response::IntoResponse,
};
use tracing::{Instrument, debug, info_span};
use uuid::Uuid;

use crate::filters::{CspFilters, RequestCsp};
use crate::settings::CspSettings;

/// Middleware that applies the strict policy to every route it wraps.
///
/// Routes the settings exclude pass through untouched.
pub async fn strict_csp_middleware(
    State(settings): State<Arc<CspSettings>>,
    mut request: Request,
    next: Next,
) -> Response<Body> {
    let path = request.uri().path().to_owned();
    let Some(mode) = settings.mode_for(&path) else {
        debug!(path = %path, "Strict CSP not applied to route");
        return next.run(request).await;
    };

    let span = info_span!("strict_csp", request_id = %Uuid::new_v4(), path = %path);
    async move {
        let csp = RequestCsp::new(mode);
        request.extensions_mut().insert(csp.clone());

        let mut response = next.run(request).await;

        // Same provider as the handler's clone, so the header matches its scripts
        match csp.send_headers(response.headers_mut()) {
            Ok(()) => response,
            Err(e) => e.into_response(),
        }
    }
    .instrument(span)
    .await
}
