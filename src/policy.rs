//! Strict CSP header construction.

use crate::nonce::Nonce;

/// Directive name used for script sources
pub const SCRIPT_SRC: &str = "script-src";

/// Fallback sources kept for browsers without `'strict-dynamic'` or nonce support.
/// CSP3 browsers ignore them once a nonce and `'strict-dynamic'` are present.
const FALLBACK_SOURCES: [&str; 4] = ["'unsafe-inline'", "'strict-dynamic'", "https:", "http:"];

const UNSAFE_EVAL: &str = "'unsafe-eval'";

/// Policy variant for one rendering context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PolicyMode {
    /// Adds `'unsafe-eval'` for trusted contexts that still run client-side templating.
    pub allow_unsafe_eval: bool,
}

impl PolicyMode {
    pub const STRICT: Self = Self {
        allow_unsafe_eval: false,
    };
    pub const PERMISSIVE: Self = Self {
        allow_unsafe_eval: true,
    };
}

/// Build a CSP header from directive key-value pairs
fn build_csp(directives: &[(&str, &str)]) -> String {
    directives
        .iter()
        .map(|(key, value)| format!("{} {}", key, value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Source list for `script-src`, in header order.
pub fn script_sources(nonce: &Nonce, allow_unsafe_eval: bool) -> Vec<String> {
    let mut sources = Vec::with_capacity(FALLBACK_SOURCES.len() + 2);
    sources.push(format!("'nonce-{}'", nonce));
    sources.extend(FALLBACK_SOURCES.iter().map(|s| s.to_string()));
    if allow_unsafe_eval {
        sources.push(UNSAFE_EVAL.to_string());
    }
    sources
}

/// Render the Content-Security-Policy header value for a nonce.
///
/// `base-uri 'none'` blocks `<base>` injection. A few libraries' HTML parsing
/// helpers are known to trip it; that is accepted rather than relaxed here.
pub fn build_policy(nonce: &Nonce, allow_unsafe_eval: bool) -> String {
    let script_src = script_sources(nonce, allow_unsafe_eval).join(" ");
    build_csp(&[
        ("object-src", "'none'"),
        (SCRIPT_SRC, &script_src),
        ("base-uri", "'none'"),
    ])
}

/// Extract the nonce value from a CSP header, if present.
pub fn extract_nonce(policy: &str) -> Option<&str> {
    let nonce_prefix = "'nonce-";
    let start = policy.find(nonce_prefix)? + nonce_prefix.len();
    let after_prefix = &policy[start..];
    let end = after_prefix.find('\'')?;
    Some(&after_prefix[..end])
}
