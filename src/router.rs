use std::sync::Arc;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
};

use crate::{
    AppState,
    middleware::{RateLimiter, auth_middleware, log_errors, rate_limit},
    routes,
};

/// 组装全部路由；公开路由只有认证相关接口，其余都需要会话令牌
pub fn build_router(state: AppState) -> Router {
    let rate_limiter = Arc::new(RateLimiter::new(
        Arc::clone(state.cache.backend()),
        &state.config,
    ));

    let public_routes = Router::new()
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/rotp", post(routes::auth::register_otp))
        .route("/auth/lotp", post(routes::auth::login_otp))
        // 只限制匿名可达的认证接口
        .layer(from_fn_with_state(rate_limiter, rate_limit));

    let protected_routes = Router::new()
        // 拍卖
        .route(
            "/auctions",
            get(routes::auction::list_auctions).post(routes::auction::create_auction),
        )
        .route(
            "/auctions/{id}",
            get(routes::auction::get_auction).put(routes::auction::update_auction),
        )
        .route("/auctions/{id}/join", post(routes::auction::join_auction))
        // 球员
        .route(
            "/auctions/{id}/players",
            get(routes::player::list_players).post(routes::player::save_players),
        )
        .route(
            "/players/{id}",
            put(routes::player::update_player).delete(routes::player::delete_player),
        )
        // 个人资料
        .route(
            "/profile",
            get(routes::profile::get_profile).post(routes::profile::upsert_profile),
        )
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let api = Router::new().merge(public_routes).merge(protected_routes);
    let base = state.config.api_base_uri.trim_end_matches('/');
    let router = if base.is_empty() {
        api
    } else {
        Router::new().nest(base, api)
    };

    let router = router.layer(from_fn(log_errors));

    #[cfg(debug_assertions)]
    let router = router.layer(tower_http::cors::CorsLayer::permissive());

    router.with_state(state)
}
