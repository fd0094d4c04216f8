//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::settings::{AdminPolicy, CspSettings};
use clap::Parser;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "strict-csp",
    about = "Serve pages under a nonce-based strict Content-Security-Policy"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7292", env = "STRICT_CSP_PORT")]
    pub port: u16,

    /// Login route, served with the policy sent before rendering
    #[arg(long, default_value = "/login", value_parser = validate_route_prefix, env = "STRICT_CSP_LOGIN_PATH")]
    pub login_path: String,

    /// Admin route prefix
    #[arg(long, default_value = "/admin", value_parser = validate_route_prefix, env = "STRICT_CSP_ADMIN_PATH")]
    pub admin_path: String,

    /// Whether admin routes receive the policy
    #[arg(long, value_enum, default_value = "exclude", env = "STRICT_CSP_ADMIN_POLICY")]
    pub admin_policy: AdminPolicy,

    /// Editor routes that stay excluded under include-except-editor (repeatable)
    #[arg(long = "editor-path", default_value = "/admin/editor", value_parser = validate_route_prefix,
        value_delimiter = ',', env = "STRICT_CSP_EDITOR_PATHS")]
    pub editor_paths: Vec<String>,

    /// Add 'unsafe-eval' to script-src on admin routes that receive the policy
    #[arg(long, env = "STRICT_CSP_PERMISSIVE_ADMIN")]
    pub permissive_admin: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

fn validate_route_prefix(s: &str) -> Result<String, String> {
    if !s.starts_with('/') {
        return Err(format!("Route must start with '/': {}", s));
    }

    if s.len() > 1 && s.ends_with('/') {
        return Err(format!("Route must not end with '/': {}", s));
    }

    if s.len() == 1 {
        return Err("Route must not be the site root".to_string());
    }

    if s.chars().any(|c| !c.is_ascii() || c.is_whitespace() || c == '{' || c == '}') {
        return Err(format!("Route contains invalid characters: {}", s));
    }

    Ok(s.to_string())
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args) -> ServerConfig {
    ServerConfig {
        settings: CspSettings {
            login_path: args.login_path.clone(),
            admin_path: args.admin_path.clone(),
            admin_policy: args.admin_policy,
            editor_paths: args.editor_paths.clone(),
            permissive_admin: args.permissive_admin,
        },
    }
}
