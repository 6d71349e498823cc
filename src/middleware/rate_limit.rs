use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    cache::VolatileStore,
    config::Config,
    result::{ApiResponse, error_codes},
};

/// 按客户端 IP 的固定窗口限流，计数放在易失存储中
#[derive(Clone)]
pub struct RateLimiter {
    counters: Arc<dyn VolatileStore>,
    window: Duration,
    limit: u32,
}

impl RateLimiter {
    pub fn new(counters: Arc<dyn VolatileStore>, config: &Config) -> Self {
        Self {
            counters,
            window: config.rate_limit_window(),
            limit: config.rate_limit_requests,
        }
    }

    pub async fn check_rate_limit(&self, req: Request<Body>, next: Next) -> Response {
        let ip = client_ip(&req);
        let key = format!("rate_limit:{}", ip);

        let count = match self.counters.increment(&key, self.window).await {
            Ok(count) => count,
            Err(e) => {
                // 计数器不可用时放行
                tracing::warn!(ip = %ip, error = %e, "rate limit counter unavailable");
                return next.run(req).await;
            }
        };

        if count > u64::from(self.limit) {
            tracing::warn!(ip = %ip, count, "rate limit exceeded");
            return (
                StatusCode::TOO_MANY_REQUESTS,
                ApiResponse::<()>::error(
                    error_codes::RATE_LIMIT,
                    &format!("请求过于频繁，请在{}秒后重试", self.window.as_secs()),
                ),
            )
                .into_response();
        }

        next.run(req).await
    }
}

fn client_ip(req: &Request<Body>) -> String {
    let remote_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());

    req.headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .or_else(|| {
            req.headers()
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
        })
        .or(remote_ip.as_deref())
        .unwrap_or("unknown")
        .trim()
        .to_string()
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    limiter.check_rate_limit(req, next).await
}
