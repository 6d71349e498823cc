use std::time::Instant;

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use tracing::{error, warn};

/// 记录失败请求，响应体只包含通用提示，这里补上方法、路径与耗时
pub async fn log_errors(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;
    let status = response.status();

    if status.is_server_error() {
        error!(%method, %path, status = status.as_u16(), elapsed_ms = started.elapsed().as_millis() as u64, "server error");
    } else if status.is_client_error() {
        warn!(%method, %path, status = status.as_u16(), "client error");
    }

    response
}
