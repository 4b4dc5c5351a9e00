// ABOUTME: Router assembly and server lifecycle for the HTTP front-end
// ABOUTME: Binds the configured address and serves until the shutdown future resolves

use crate::routes;
use crate::ServeState;
use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{middleware, Router};
use memewall_core::config::HttpConfig;
use std::future::Future;
use tokio::net::TcpListener;
use tracing::info;

/// Build the application router.
pub fn app(state: ServeState, config: &HttpConfig) -> Router {
    let body_limit = usize::try_from(config.max_upload_bytes).unwrap_or(usize::MAX);

    let meme = Router::new()
        .route("/show", post(routes::show))
        .route(
            "/upload",
            post(routes::upload).layer(DefaultBodyLimit::max(body_limit)),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            routes::require_token,
        ));

    Router::new()
        .route("/", get(routes::health))
        .nest(&format!("/{}/meme", config.version), meme)
        .layer(middleware::from_fn(routes::log_requests))
        .with_state(state)
}

/// Serve until `shutdown` completes.
pub async fn run<F>(state: ServeState, config: &HttpConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = app(state, config);
    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("binding HTTP listener on {}", config.bind))?;

    info!(
        addr = %listener.local_addr().context("reading local address")?,
        version = %config.version,
        "HTTP front-end listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("running HTTP server")?;

    info!("HTTP front-end stopped");
    Ok(())
}
