// HTTP server assembly: middleware stack, startup, graceful shutdown.

use std::time::Instant;

use anyhow::Context;
use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::Request,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::{
    api,
    backup::apply_pending_restore,
    config::ServerConfig,
    cors::cors_layer,
    db::{
        migrations::run_migrations,
        pool::{create_sqlite_pool, PoolConfig},
    },
    error::{
        attach_request_id_header, request_id_from_headers_or_generate, with_request_id_scope,
        ApiError, ErrorCode,
    },
    state::AppState,
};

/// The full application: every route plus the shared middleware.
pub fn build_app(state: AppState, config: &ServerConfig) -> Router {
    apply_middleware(api::router(state).fallback(unknown_route), config)
}

fn apply_middleware(router: Router, config: &ServerConfig) -> Router {
    router
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(cors_layer(config.cors_origins.as_deref()))
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(panic_handler))
}

/// Open the store, apply migrations and serve until a shutdown signal.
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    if config.is_dev_jwt_secret() {
        warn!("ZSK_JWT_SECRET is unset; using the development signing secret");
    }

    apply_pending_restore(&config.database_url).await?;

    let pool = create_sqlite_pool(&config.database_url, PoolConfig::from_env())
        .await
        .with_context(|| format!("failed to open store at {}", config.database_url))?;
    run_migrations(&pool).await?;

    let state = AppState::from_config(pool.clone(), &config).context("invalid JWT secret")?;
    let app = build_app(state, &config);

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", config.listen_addr))?;

    info!(
        listen_addr = %config.listen_addr,
        uploads_dir = %config.uploads_dir.display(),
        public_origin = %config.public_origin,
        "starting zsk server"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited unexpectedly")?;

    pool.close().await;
    info!("store closed");
    Ok(())
}

async fn unknown_route() -> ApiError {
    ApiError::from_code(ErrorCode::NotFound)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            error!(?error, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                error!(?error, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}

async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    match tokio::spawn(async move { next.run(request).await }).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(?join_error, "request handling panicked");
            ApiError::from_code(ErrorCode::InternalError).into_response()
        }
    }
}

async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request_id_from_headers_or_generate(request.headers());
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let mut response = with_request_id_scope(request_id.clone(), next.run(request)).await;
    attach_request_id_header(&mut response, &request_id);

    let status = response.status();
    let latency_ms = started_at.elapsed().as_millis() as u64;
    if status.is_server_error() {
        warn!(request_id = %request_id, method = %method, path = %path, status = status.as_u16(), latency_ms, "request failed");
    } else {
        info!(request_id = %request_id, method = %method, path = %path, status = status.as_u16(), latency_ms, "request completed");
    }

    response
}
