//! Tracing setup plus the per-request logging middleware.

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

/// Install the global subscriber: console plus a daily-rolling file.
///
/// The returned guards flush the background writers and must live as long as
/// the process does.
pub fn init(config: &LogConfig) -> Vec<WorkerGuard> {
    std::fs::create_dir_all(&config.dir).ok();

    let (file_writer, file_guard) = non_blocking(rolling::daily(&config.dir, "stayvista.log"));
    let (console_writer, console_guard) = non_blocking(std::io::stdout());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("stayvista={},tower_http=info,axum=info", config.level))
    });
    let registry = tracing_subscriber::registry().with(env_filter);

    if config.production {
        registry
            .with(fmt::layer().json().with_writer(file_writer).with_target(true))
            .with(fmt::layer().json().with_writer(console_writer).with_target(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(file_writer)
                    .with_ansi(false)
                    .with_file(true)
                    .with_line_number(true),
            )
            .with(fmt::layer().with_writer(console_writer).with_target(true))
            .init();
    }

    tracing::info!(production = config.production, "logging initialized");
    vec![file_guard, console_guard]
}

pub async fn log_request(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let req_id = request
        .extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let response = next.run(request).await;

    let status = response.status();
    let duration_ms = start.elapsed().as_millis() as u64;
    if status.is_server_error() {
        tracing::error!(request_id = %req_id, %method, %uri, %status, duration_ms, "request failed");
    } else if status.is_client_error() {
        tracing::warn!(request_id = %req_id, %method, %uri, %status, duration_ms, "request rejected");
    } else {
        tracing::info!(request_id = %req_id, %method, %uri, %status, duration_ms, "request completed");
    }
    response
}

pub fn request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}
