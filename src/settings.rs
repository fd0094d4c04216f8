//! Which routes get the strict policy, and in which variant.

use serde::{Deserialize, Serialize};

use crate::policy::PolicyMode;

/// Rendering context of a request, derived from its path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteContext {
    Frontend,
    Login,
    Admin,
}

/// How the policy treats administrative routes.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AdminPolicy {
    /// Admin routes are served without the strict policy.
    #[default]
    Exclude,
    /// Admin routes get the policy like any other route.
    Include,
    /// Admin routes get the policy, except the editor routes.
    IncludeExceptEditor,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct CspSettings {
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_admin_path")]
    pub admin_path: String,
    #[serde(default)]
    pub admin_policy: AdminPolicy,
    #[serde(default = "default_editor_paths")]
    pub editor_paths: Vec<String>,
    /// Allow `'unsafe-eval'` on admin routes that receive the policy
    #[serde(default)]
    pub permissive_admin: bool,
}

impl Default for CspSettings {
    fn default() -> Self {
        Self {
            login_path: default_login_path(),
            admin_path: default_admin_path(),
            admin_policy: AdminPolicy::default(),
            editor_paths: default_editor_paths(),
            permissive_admin: false,
        }
    }
}

fn default_login_path() -> String {
    "/login".to_string()
}

fn default_admin_path() -> String {
    "/admin".to_string()
}

fn default_editor_paths() -> Vec<String> {
    vec!["/admin/editor".to_string()]
}

/// True when `path` is `prefix` or lies below it on a segment boundary.
fn under_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('.'),
        None => false,
    }
}

impl CspSettings {
    pub fn classify(&self, path: &str) -> RouteContext {
        if under_prefix(path, &self.admin_path) {
            RouteContext::Admin
        } else if under_prefix(path, &self.login_path) {
            RouteContext::Login
        } else {
            RouteContext::Frontend
        }
    }

    fn is_editor_path(&self, path: &str) -> bool {
        self.editor_paths.iter().any(|p| under_prefix(path, p))
    }

    /// Policy variant for `path`, or `None` when the policy does not apply there.
    pub fn mode_for(&self, path: &str) -> Option<PolicyMode> {
        match self.classify(path) {
            RouteContext::Frontend | RouteContext::Login => Some(PolicyMode::STRICT),
            RouteContext::Admin => {
                let applies = match self.admin_policy {
                    AdminPolicy::Exclude => false,
                    AdminPolicy::Include => true,
                    AdminPolicy::IncludeExceptEditor => !self.is_editor_path(path),
                };
                applies.then_some(PolicyMode {
                    allow_unsafe_eval: self.permissive_admin,
                })
            }
        }
    }
}
