pub mod assets;
pub mod cli;
pub mod error;
pub mod filters;
pub mod middleware;
pub mod nonce;
pub mod policy;
pub mod rewrite;
pub mod settings;

pub use error::CspError;
pub use filters::{CspFilters, RequestCsp};
pub use middleware::strict_csp_middleware;
pub use nonce::{Nonce, NonceProvider};
pub use policy::{PolicyMode, build_policy};
pub use rewrite::rewrite;
pub use settings::{AdminPolicy, CspSettings, RouteContext};

use assets::{AssetsState, admin_handler, frontend_handler, login_handler};
use axum::{Router, middleware::from_fn_with_state, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Which routes get the policy, and in which variant
    pub settings: CspSettings,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let settings = Arc::new(config.settings.clone());
    let state = AssetsState::new(settings.clone());
    let csp_layer = from_fn_with_state(settings.clone(), strict_csp_middleware);

    let login_path = state.login_path().to_string();
    let admin_path = state.admin_path().to_string();

    // Login sends its own header before rendering, so it bypasses the middleware
    let login_routes = Router::new()
        .route(&login_path, get(login_handler))
        .route(&format!("{}/", login_path), get(login_handler))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route(&admin_path, get(admin_handler))
        .route(&format!("{}/", admin_path), get(admin_handler))
        .route(&format!("{}/{{*path}}", admin_path), get(admin_handler))
        .layer(csp_layer.clone());

    let site_routes = Router::new()
        .route("/", get(frontend_handler))
        .route("/{*path}", get(frontend_handler))
        .layer(csp_layer);

    Router::new()
        .merge(login_routes)
        .merge(admin_routes)
        .merge(site_routes)
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    axum::serve(listener, app.into_make_service()).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> (tokio::task::JoinHandle<()>, SocketAddr) {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await.expect("Failed to bind");
    let local_addr = listener.local_addr().expect("Failed to get local address");

    let handle = tokio::spawn(async move {
        run_server(config, listener).await.ok();
    });

    (handle, local_addr)
}
