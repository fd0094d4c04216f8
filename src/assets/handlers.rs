use axum::{
    extract::{OriginalUri, Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use rust_embed::Embed;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::CspError;
use crate::filters::{CspFilters, RequestCsp};
use crate::policy::PolicyMode;

use super::config::AssetsState;
use super::embed::{AdminAssets, EmbedAssets, LoginAssets, PublicAssets};
use super::response::{
    NO_STORE, html_response, normalize_path, render_script_tag, serve_embedded,
};

/// Marker in the login template replaced by the rendered config script
const LOGIN_CONFIG_MARKER: &str = "<!-- login-config -->";

/// Page markers of the form `<!-- embed:NAME -->` are replaced by `site/embeds/NAME.html`
const EMBED_MARKER_START: &str = "<!-- embed:";
const EMBED_MARKER_END: &str = " -->";

/// Serve public pages and assets
pub async fn frontend_handler(
    csp: RequestCsp,
    path: Option<Path<String>>,
) -> Result<Response, CspError> {
    let path = normalize_path(path.as_ref());
    serve_page::<PublicAssets>(&path, Some(&csp))
}

/// Serve admin pages. Whether they carry the policy is decided by the middleware.
pub async fn admin_handler(
    csp: Option<RequestCsp>,
    path: Option<Path<String>>,
) -> Result<Response, CspError> {
    let path = normalize_path(path.as_ref());
    serve_page::<AdminAssets>(&path, csp.as_ref())
}

/// Serve an embedded file. HTML pages are trusted templates: when the request
/// carries CSP state, their scripts get its nonce and their embed markers are
/// expanded through the embedded-content filter.
fn serve_page<T: Embed>(path: &str, csp: Option<&RequestCsp>) -> Result<Response, CspError> {
    let Some(csp) = csp.filter(|_| path.ends_with(".html")) else {
        return Ok(serve_embedded::<T>(path));
    };
    let Some(content) = T::get(path) else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };
    let page = csp.rewrite_html(&String::from_utf8_lossy(&content.data))?;
    Ok(html_response(splice_embeds(&page, csp)?))
}

/// Replace each embed marker with its fragment, nonced for this request.
/// Unknown embeds are dropped.
fn splice_embeds(page: &str, csp: &RequestCsp) -> Result<String, CspError> {
    let mut out = String::with_capacity(page.len());
    let mut rest = page;
    while let Some(start) = rest.find(EMBED_MARKER_START) {
        let after = &rest[start + EMBED_MARKER_START.len()..];
        let Some(end) = after.find(EMBED_MARKER_END) else {
            break;
        };
        let name = after[..end].trim();
        out.push_str(&rest[..start]);
        match embed_markup(name) {
            Some(markup) => out.push_str(&csp.rewrite_embed(&Value::String(markup))?),
            None => warn!(embed = %name, "Unknown embed, dropping marker"),
        }
        rest = &after[end + EMBED_MARKER_END.len()..];
    }
    out.push_str(rest);
    Ok(out)
}

fn embed_markup(name: &str) -> Option<String> {
    if name.is_empty() || name.contains('/') || name.contains("..") {
        return None;
    }
    let content = EmbedAssets::get(&format!("{}.html", name))?;
    Some(String::from_utf8_lossy(&content.data).into_owned())
}

/// Serve the login page.
///
/// This route is not wrapped by the middleware, so the header is sent here
/// before the page is rendered, and the page's scripts are rewritten in place.
pub async fn login_handler(
    State(state): State<AssetsState>,
    OriginalUri(uri): OriginalUri,
) -> Response {
    let Some(content) = LoginAssets::get("index.html") else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let template = String::from_utf8_lossy(&content.data);

    let Some(mode) = state.settings.mode_for(uri.path()) else {
        return html_response(template.replace(LOGIN_CONFIG_MARKER, ""));
    };

    render_login(&template, state.login_path(), mode).unwrap_or_else(|e| e.into_response())
}

fn render_login(template: &str, login_path: &str, mode: PolicyMode) -> Result<Response, CspError> {
    let csp = RequestCsp::new(mode);

    let mut headers = HeaderMap::new();
    csp.send_headers(&mut headers)?;
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/html; charset=utf-8"),
    );
    headers.insert(header::CACHE_CONTROL, header::HeaderValue::from_static(NO_STORE));

    let attributes = csp.annotate_script(&json!({ "id": "login-config" }))?;
    let config = json!({ "action": login_path });
    let script = render_script_tag(&attributes, &format!("window.LOGIN_CONFIG = {};", config));

    let body = csp.rewrite_html(&template.replace(LOGIN_CONFIG_MARKER, &script))?;
    debug!(path = %login_path, "Rendered login page");
    Ok((headers, body).into_response())
}
