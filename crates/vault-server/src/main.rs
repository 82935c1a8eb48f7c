//! Vault server binary.
//!
//! Loads configuration, opens and migrates the database, and serves the HTTP
//! API until SIGINT or SIGTERM.

use std::net::SocketAddr;
use tokio::net::TcpListener;
use vault_server::{app, config, telemetry, AppState};
use vault_sync::SubscriberRegistry;

#[tokio::main]
async fn main() {
    let (config_path, config_source) = config::resolve_config_path(
        std::env::args().nth(1),
        std::env::var("VAULT_CONFIG_PATH").ok(),
    );
    let config = config::load_config(Some(&config_path))
        .expect("failed to load configuration; the server cannot start without valid config");

    telemetry::init_logging(&config.logging).expect("failed to install the tracing subscriber");
    tracing::info!(
        source = config_source,
        path = %config_path,
        "resolved startup configuration path"
    );

    let pool = vault_db::create_pool(&config.database.path, config.database.runtime_settings())
        .expect("failed to create database pool; check database.path in config");
    {
        let conn = pool
            .get()
            .expect("failed to get database connection for migrations");
        let applied = vault_db::run_migrations(&conn).expect("failed to run database migrations");
        tracing::info!(applied, path = %config.database.path, "database ready");
    }

    let subscribers = SubscriberRegistry::new(config.subscriptions.buffer_size);
    let router = app(AppState::new(pool, subscribers));
    let addr = SocketAddr::new(config.server.host, config.server.port);

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address; is another process using this port?");
    tracing::info!(%addr, "vault server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("vault server stopped");
}

/// Resolves on the first SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal = tokio::select! {
        () = interrupt => "SIGINT",
        () = terminate => "SIGTERM",
    };
    tracing::info!(signal, "shutting down");
}
