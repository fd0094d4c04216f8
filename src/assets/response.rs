use std::borrow::Cow;

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use rust_embed::Embed;
use serde_json::{Map, Value};

/// Cache duration for immutable hashed assets (1 year)
pub const IMMUTABLE_CACHE: &str = "public, max-age=31536000, immutable";
/// Cache duration for HTML files. Every response carries a fresh nonce.
pub const NO_STORE: &str = "no-store";

/// Serve an HTML body. The middleware adds the CSP header.
#[inline]
pub fn html_response(body: String) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::CACHE_CONTROL, NO_STORE),
        ],
        body,
    )
        .into_response()
}

/// Get MIME type from file extension. Only supports types we actually serve.
#[inline]
pub fn mime_from_path(path: &str) -> &'static str {
    match path.rsplit('.').next() {
        Some("js") => "text/javascript",
        Some("css") => "text/css",
        Some("html") => "text/html; charset=utf-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Serve an embedded file. HTML goes through [`html_response`].
#[inline]
pub fn serve_embedded<T: Embed>(path: &str) -> Response {
    let Some(content) = T::get(path) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if path.ends_with(".html") {
        return html_response(String::from_utf8_lossy(&content.data).into_owned());
    }
    // Hashed assets in /assets/ are immutable
    let cache_control = if path.starts_with("assets/") {
        IMMUTABLE_CACHE
    } else {
        NO_STORE
    };
    (
        [
            (header::CONTENT_TYPE, mime_from_path(path)),
            (header::CACHE_CONTROL, cache_control),
        ],
        content.data,
    )
        .into_response()
}

/// Normalize a path, defaulting to "index.html" if empty or missing.
/// Directory-style paths ("editor", "editor/") resolve to their index page.
pub fn normalize_path(path: Option<&axum::extract::Path<String>>) -> Cow<'_, str> {
    let path = match path.map(|p| p.as_str().trim_end_matches('/')) {
        Some(p) if !p.is_empty() => p,
        _ => return Cow::Borrowed("index.html"),
    };
    let last_segment = path.rsplit('/').next().unwrap_or(path);
    if last_segment.contains('.') {
        Cow::Borrowed(path)
    } else {
        Cow::Owned(format!("{}/index.html", path))
    }
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Render a `<script>` element from a filtered attribute mapping.
///
/// String values become quoted attributes, `true` becomes a bare attribute, and
/// anything else is skipped. `</` in the body is escaped so it cannot close the tag.
pub fn render_script_tag(attributes: &Map<String, Value>, body: &str) -> String {
    let mut tag = String::from("<script");
    for (name, value) in attributes {
        match value {
            Value::String(v) => {
                tag.push_str(&format!(" {}=\"{}\"", name, escape_html(v)));
            }
            Value::Bool(true) => {
                tag.push(' ');
                tag.push_str(name);
            }
            _ => {}
        }
    }
    tag.push('>');
    tag.push_str(&body.replace("</", "<\\/"));
    tag.push_str("</script>");
    tag
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_script_tag() {
        let attrs = json!({ "nonce": "abc", "async": true, "defer": false, "id": "a\"b" });
        let Value::Object(attrs) = attrs else {
            unreachable!()
        };
        assert_eq!(
            render_script_tag(&attrs, "x = '</script>';"),
            r#"<script async id="a&quot;b" nonce="abc">x = '<\/script>';</script>"#
        );
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(None), "index.html");
        let p = |s: &str| axum::extract::Path(s.to_string());
        assert_eq!(normalize_path(Some(&p(""))), "index.html");
        assert_eq!(normalize_path(Some(&p("about.html"))), "about.html");
        assert_eq!(normalize_path(Some(&p("editor"))), "editor/index.html");
        assert_eq!(normalize_path(Some(&p("editor/"))), "editor/index.html");
        assert_eq!(normalize_path(Some(&p("assets/app.js"))), "assets/app.js");
    }

    #[test]
    fn test_mime_from_path() {
        assert_eq!(mime_from_path("assets/app.js"), "text/javascript");
        assert_eq!(mime_from_path("index.html"), "text/html; charset=utf-8");
        assert_eq!(mime_from_path("blob"), "application/octet-stream");
    }
}
