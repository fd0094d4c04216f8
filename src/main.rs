use clap::Parser;
use strict_csp::cli::{Args, build_config, init_logging};
use strict_csp::create_app;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let local_addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, "Failed to read local address");
            std::process::exit(1);
        }
    };

    let config = build_config(&args);
    info!(
        login = %config.settings.login_path,
        admin = %config.settings.admin_path,
        admin_policy = ?config.settings.admin_policy,
        permissive_admin = config.settings.permissive_admin,
        "Strict CSP settings"
    );
    let app = create_app(&config);

    info!(address = %local_addr, "Listening");

    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
