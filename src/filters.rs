//! Request-scoped CSP state and the filter interface hosts call into.

use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{HeaderMap, HeaderValue, header, request::Parts},
};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::CspError;
use crate::nonce::{Nonce, NonceProvider};
use crate::policy::{PolicyMode, build_policy};
use crate::rewrite::rewrite_with_count;

/// Header name used in filtered header mappings
pub const CSP_HEADER_NAME: &str = "Content-Security-Policy";

/// Attribute name set on script tags
pub const NONCE_ATTRIBUTE: &str = "nonce";

/// Extension points a host invokes while building a response.
///
/// Inputs arrive loosely typed from other extensions. A value of the wrong shape
/// is treated as empty instead of failing the response.
pub trait CspFilters {
    /// Supply or overwrite the CSP entry in an outgoing header mapping.
    fn build_header(&self, existing_headers: &Value) -> Result<Map<String, Value>, CspError>;

    /// Set `nonce` in the attribute mapping of a script tag about to be rendered.
    fn annotate_script(&self, existing_attributes: &Value)
    -> Result<Map<String, Value>, CspError>;

    /// Add the nonce to every script in embed markup.
    fn rewrite_embed(&self, html: &Value) -> Result<String, CspError>;

    /// Send the CSP header directly, for routes that bypass header filtering.
    fn send_headers(&self, headers: &mut HeaderMap) -> Result<(), CspError>;
}

/// CSP state for one request: a nonce provider plus the policy variant in force.
#[derive(Clone, Debug)]
pub struct RequestCsp {
    provider: NonceProvider,
    mode: PolicyMode,
}

impl RequestCsp {
    pub fn new(mode: PolicyMode) -> Self {
        Self::with_provider(NonceProvider::new(), mode)
    }

    pub fn with_provider(provider: NonceProvider, mode: PolicyMode) -> Self {
        Self { provider, mode }
    }

    pub fn mode(&self) -> PolicyMode {
        self.mode
    }

    /// The request's nonce. Generated on first use, identical afterwards.
    pub fn nonce(&self) -> Result<Nonce, CspError> {
        self.provider.get_nonce()
    }

    /// The header value for this request.
    pub fn policy(&self) -> Result<String, CspError> {
        Ok(build_policy(&self.nonce()?, self.mode.allow_unsafe_eval))
    }

    /// Rewrite an HTML string with this request's nonce.
    ///
    /// Every script found is trusted, so pass only markup the server owns,
    /// never a body that includes request input.
    pub fn rewrite_html(&self, html: &str) -> Result<String, CspError> {
        let (rewritten, count) = rewrite_with_count(html, &self.nonce()?);
        debug!(scripts = count, "Applied nonce to script tags");
        Ok(rewritten)
    }
}

fn object_or_empty(value: &Value, what: &'static str) -> Map<String, Value> {
    match value {
        Value::Object(map) => map.clone(),
        other => {
            warn!(input = what, kind = kind_of(other), "Expected a mapping, treating as empty");
            Map::new()
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl CspFilters for RequestCsp {
    fn build_header(&self, existing_headers: &Value) -> Result<Map<String, Value>, CspError> {
        let policy = self.policy()?;
        let mut headers = object_or_empty(existing_headers, "headers");
        // Header names are case-insensitive, so drop any spelling of the old entry
        headers.retain(|name, _| !name.eq_ignore_ascii_case(CSP_HEADER_NAME));
        headers.insert(CSP_HEADER_NAME.to_string(), Value::String(policy));
        Ok(headers)
    }

    fn annotate_script(
        &self,
        existing_attributes: &Value,
    ) -> Result<Map<String, Value>, CspError> {
        let nonce = self.nonce()?;
        let mut attributes = object_or_empty(existing_attributes, "script attributes");
        attributes.retain(|name, _| !name.eq_ignore_ascii_case(NONCE_ATTRIBUTE));
        attributes.insert(
            NONCE_ATTRIBUTE.to_string(),
            Value::String(nonce.as_str().to_string()),
        );
        Ok(attributes)
    }

    fn rewrite_embed(&self, html: &Value) -> Result<String, CspError> {
        match html {
            Value::String(html) => self.rewrite_html(html),
            other => {
                warn!(kind = kind_of(other), "Embed markup is not a string, returning empty");
                Ok(String::new())
            }
        }
    }

    fn send_headers(&self, headers: &mut HeaderMap) -> Result<(), CspError> {
        let value = HeaderValue::from_str(&self.policy()?)?;
        headers.insert(header::CONTENT_SECURITY_POLICY, value);
        Ok(())
    }
}

/// Extractor to get the request CSP state installed by the middleware.
///
/// # Example
///
/// ```ignore
/// async fn handler(csp: RequestCsp) -> Result<Html<String>, CspError> {
///     let nonce = csp.nonce()?;
///     Ok(Html(format!("<script nonce=\"{nonce}\">boot()</script>")))
/// }
/// ```
impl<S> FromRequestParts<S> for RequestCsp
where
    S: Send + Sync,
{
    type Rejection = CspError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Self>().cloned().ok_or_else(|| {
            warn!("Request CSP not found in extensions - middleware may be misconfigured");
            CspError::NotInstalled
        })
    }
}

/// `Option<RequestCsp>` is `None` on routes the middleware left without a policy.
impl<S> OptionalFromRequestParts<S> for RequestCsp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::extract_nonce;
    use serde_json::json;

    fn fixed_source(buf: &mut [u8]) -> Result<(), CspError> {
        buf.fill(7);
        Ok(())
    }

    fn failing_source(_: &mut [u8]) -> Result<(), CspError> {
        Err(CspError::Entropy("unavailable".into()))
    }

    fn csp() -> RequestCsp {
        RequestCsp::new(PolicyMode::STRICT)
    }

    #[test]
    fn test_build_header_adds_policy() {
        let csp = csp();
        let headers = csp
            .build_header(&json!({ "X-Frame-Options": "DENY" }))
            .unwrap();
        assert_eq!(headers["X-Frame-Options"], "DENY");
        let policy = headers[CSP_HEADER_NAME].as_str().unwrap();
        assert_eq!(extract_nonce(policy), Some(csp.nonce().unwrap().as_str()));
    }

    #[test]
    fn test_build_header_overwrites_any_case() {
        let headers = csp()
            .build_header(&json!({ "content-security-policy": "default-src *" }))
            .unwrap();
        assert_eq!(headers.len(), 1);
        assert!(headers[CSP_HEADER_NAME].as_str().unwrap().starts_with("object-src 'none'"));
    }

    #[test]
    fn test_build_header_non_mapping_is_empty() {
        for input in [json!(null), json!("nope"), json!([1, 2]), json!(3)] {
            let headers = csp().build_header(&input).unwrap();
            assert_eq!(headers.len(), 1);
            assert!(headers.contains_key(CSP_HEADER_NAME));
        }
    }

    #[test]
    fn test_annotate_script_sets_nonce() {
        let csp = csp();
        let attrs = csp
            .annotate_script(&json!({ "src": "a.js", "nonce": "OLD", "NONCE": "old" }))
            .unwrap();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs["src"], "a.js");
        assert_eq!(attrs["nonce"], csp.nonce().unwrap().as_str());
    }

    #[test]
    fn test_annotate_script_non_mapping_gives_only_nonce() {
        let csp = csp();
        let attrs = csp.annotate_script(&json!("src=a.js")).unwrap();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs["nonce"], csp.nonce().unwrap().as_str());
    }

    #[test]
    fn test_rewrite_embed() {
        let csp = RequestCsp::with_provider(NonceProvider::with_source(fixed_source), PolicyMode::STRICT);
        let out = csp
            .rewrite_embed(&json!("<p>hi</p><script src=\"w.js\"></script>"))
            .unwrap();
        assert_eq!(
            out,
            "<p>hi</p><script nonce=\"BwcHBwcHBwcHBwcHBwcHBw==\" src=\"w.js\"></script>"
        );
    }

    #[test]
    fn test_rewrite_embed_non_string_is_empty() {
        for input in [json!(null), json!(42), json!({ "html": "<script></script>" })] {
            assert_eq!(csp().rewrite_embed(&input).unwrap(), "");
        }
    }

    #[test]
    fn test_all_filters_share_one_nonce() {
        let csp = csp();
        let embed = csp.rewrite_embed(&json!("<script></script>")).unwrap();
        let attrs = csp.annotate_script(&json!({})).unwrap();
        let headers = csp.build_header(&json!({})).unwrap();
        let mut sent = HeaderMap::new();
        csp.send_headers(&mut sent).unwrap();

        let nonce = attrs["nonce"].as_str().unwrap();
        assert_eq!(embed, format!("<script nonce=\"{nonce}\"></script>"));
        assert_eq!(extract_nonce(headers[CSP_HEADER_NAME].as_str().unwrap()), Some(nonce));
        let sent = sent[header::CONTENT_SECURITY_POLICY].to_str().unwrap();
        assert_eq!(extract_nonce(sent), Some(nonce));
    }

    #[test]
    fn test_send_headers_overwrites() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src *"),
        );
        RequestCsp::new(PolicyMode::PERMISSIVE)
            .send_headers(&mut headers)
            .unwrap();
        let values: Vec<_> = headers
            .get_all(header::CONTENT_SECURITY_POLICY)
            .iter()
            .collect();
        assert_eq!(values.len(), 1);
        assert!(values[0].to_str().unwrap().contains("'unsafe-eval'"));
    }

    #[test]
    fn test_entropy_failure_propagates() {
        let csp =
            RequestCsp::with_provider(NonceProvider::with_source(failing_source), PolicyMode::STRICT);
        assert!(matches!(csp.build_header(&json!({})), Err(CspError::Entropy(_))));
        assert!(csp.annotate_script(&json!({})).is_err());
        assert!(csp.rewrite_embed(&json!("<script></script>")).is_err());
        assert!(csp.send_headers(&mut HeaderMap::new()).is_err());
    }
}
