//! 路由层端到端测试：内存存储 + 内存缓存，经由完整的中间件栈发请求。

#![allow(clippy::expect_used, clippy::panic, clippy::unwrap_used)]

use std::sync::Arc;

use auction_backend::{
    AppState,
    auth::{CodeGenerator, LogNotifier, TokenSigner},
    cache::MemoryCache,
    config::Config,
    router::build_router,
    store::MemoryStore,
};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

const SECRET: &str = "http-api-test-secret";
const CODE: u32 = 482913;

struct FixedCode;

impl CodeGenerator for FixedCode {
    fn next_code(&self) -> u32 {
        CODE
    }
}

fn app_with(config: Config) -> Router {
    let mut state = AppState::new(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryCache::new()),
        Arc::new(LogNotifier),
    );
    state.otp = state.otp.with_code_generator(Arc::new(FixedCode));
    build_router(state)
}

fn app() -> Router {
    app_with(Config::for_tests(SECRET))
}

async fn call(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(format!("/api/v1{uri}"));
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn sign_in(app: &Router, email: &str) -> String {
    let (status, _) = call(app, "POST", "/auth/register", None, Some(json!({"email": email, "mobile": "9876543210"}))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(app, "POST", "/auth/rotp", None, Some(json!({"email": email, "otp": CODE}))).await;
    assert_eq!(status, StatusCode::CREATED);
    body["resp_data"]["token"].as_str().unwrap().to_string()
}

fn auction_body(name: &str) -> Value {
    json!({
        "auction_name": name,
        "auction_image": "https://img/1.png",
        "auction_date": "2026-03-01T10:00:00Z",
        "is_ipl_auction": true
    })
}

async fn create_auction(app: &Router, token: &str, name: &str) -> String {
    let (status, body) = call(app, "POST", "/auctions", Some(token), Some(auction_body(name))).await;
    assert_eq!(status, StatusCode::CREATED);
    body["resp_data"]["id"].as_str().unwrap().to_string()
}

fn names(body: &Value) -> Vec<String> {
    body["resp_data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["auction_name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn login_after_registration_returns_a_session() {
    let app = app();
    sign_in(&app, "owner@x.com").await;

    let (status, _) = call(&app, "POST", "/auth/login", None, Some(json!({"email": "owner@x.com"}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, "POST", "/auth/lotp", None, Some(json!({"email": "owner@x.com", "otp": CODE.to_string()}))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["resp_data"]["expires_at"].as_i64().unwrap() > 0);

    let (status, body) = call(&app, "POST", "/auth/lotp", None, Some(json!({"email": "owner@x.com", "otp": CODE}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], json!(1004));
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = app();
    sign_in(&app, "owner@x.com").await;

    let (status, body) = call(&app, "POST", "/auth/register", None, Some(json!({"email": "owner@x.com", "mobile": "1"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], json!(1001));
}

#[tokio::test]
async fn protected_routes_require_a_valid_session() {
    let app = app();

    let (status, body) = call(&app, "GET", "/auctions", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], json!(1002));

    let forged = TokenSigner::new(b"someone-else", std::time::Duration::from_secs(60))
        .issue("1", "owner@x.com")
        .unwrap();
    let (status, _) = call(&app, "GET", "/auctions", Some(&forged.token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn auction_lists_follow_writes() {
    let app = app();
    let owner = sign_in(&app, "owner@x.com").await;
    let guest = sign_in(&app, "guest@x.com").await;

    let (status, body) = call(&app, "GET", "/auctions?type=all", Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["resp_data"].as_array().unwrap().is_empty());

    let first = create_auction(&app, &owner, "Mega Auction").await;
    let (_, body) = call(&app, "GET", "/auctions?type=create", Some(&owner), None).await;
    assert_eq!(names(&body), vec!["Mega Auction"]);

    create_auction(&app, &owner, "Mini Auction").await;
    let (_, body) = call(&app, "GET", "/auctions?type=create", Some(&owner), None).await;
    assert_eq!(names(&body), vec!["Mini Auction", "Mega Auction"]);

    // 非创建者修改按不存在处理
    let (status, _) = call(&app, "PUT", &format!("/auctions/{first}"), Some(&guest), Some(auction_body("Hijacked"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&app, "PUT", &format!("/auctions/{first}"), Some(&owner), Some(auction_body("Mega Auction 2026"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resp_data"]["auction_name"], json!("Mega Auction 2026"));
    let (_, body) = call(&app, "GET", "/auctions", Some(&owner), None).await;
    assert_eq!(names(&body), vec!["Mini Auction", "Mega Auction 2026"]);

    let (status, body) = call(&app, "GET", "/auctions?type=mine", Some(&owner), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!(1000));
}

#[tokio::test]
async fn joining_refreshes_both_sides() {
    let app = app();
    let owner = sign_in(&app, "owner@x.com").await;
    let guest = sign_in(&app, "guest@x.com").await;
    let id = create_auction(&app, &owner, "Mega Auction").await;

    // 先把双方的列表读进缓存
    let (_, body) = call(&app, "GET", "/auctions?type=all", Some(&owner), None).await;
    assert_eq!(body["resp_data"][0]["joined_by"], json!([]));
    let (_, body) = call(&app, "GET", "/auctions?type=join", Some(&guest), None).await;
    assert!(body["resp_data"].as_array().unwrap().is_empty());

    let (status, _) = call(&app, "POST", &format!("/auctions/{id}/join"), Some(&guest), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = call(&app, "GET", "/auctions?type=join", Some(&guest), None).await;
    assert_eq!(names(&body), vec!["Mega Auction"]);
    let (_, body) = call(&app, "GET", "/auctions?type=all", Some(&owner), None).await;
    assert_eq!(body["resp_data"][0]["joined_by"][0]["email"], json!("guest@x.com"));

    let (status, body) = call(&app, "POST", &format!("/auctions/{id}/join"), Some(&guest), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], json!(1001));

    let (status, _) = call(&app, "POST", "/auctions/missing/join", Some(&guest), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn auction_detail_names_members_with_profiles() {
    let app = app();
    let owner = sign_in(&app, "owner@x.com").await;
    let guest = sign_in(&app, "guest@x.com").await;
    let fan = sign_in(&app, "fan@x.com").await;
    let id = create_auction(&app, &owner, "Mega Auction").await;

    let (status, body) = call(&app, "GET", &format!("/auctions/{id}"), Some(&guest), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resp_data"]["user_names"], json!([]));

    call(&app, "POST", "/profile", Some(&guest), Some(json!({"first_name": "Virat", "last_name": "Kohli"}))).await;
    for token in [&guest, &fan] {
        let (status, _) = call(&app, "POST", &format!("/auctions/{id}/join"), Some(token), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = call(&app, "GET", &format!("/auctions/{id}"), Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resp_data"]["auction_name"], json!("Mega Auction"));
    assert_eq!(body["resp_data"]["joined_by"].as_array().unwrap().len(), 2);
    assert_eq!(body["resp_data"]["user_names"], json!([{"email": "guest@x.com", "name": "Virat Kohli"}]));

    let (status, body) = call(&app, "GET", "/auctions/missing", Some(&owner), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], json!(1004));
}

#[tokio::test]
async fn player_roster_follows_writes() {
    let app = app();
    let owner = sign_in(&app, "owner@x.com").await;
    let guest = sign_in(&app, "guest@x.com").await;
    let id = create_auction(&app, &owner, "Mega Auction").await;
    let roster = format!("/auctions/{id}/players");

    let players = json!([
        {"player_number": 7, "player_name": "Dhoni", "country": "India", "role": "WK", "base_price": 200.0},
        {"player_number": 18, "player_name": "Kohli", "country": "India", "role": "BAT", "base_price": 200.0},
        {"player_number": 1, "player_name": "Rahul", "country": "India", "role": "BAT", "base_price": 100.0}
    ]);
    let (status, body) = call(&app, "POST", &roster, Some(&owner), Some(players.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["resp_data"]["players"], json!(3));

    let (status, _) = call(&app, "POST", &roster, Some(&guest), Some(players)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = call(&app, "GET", &roster, Some(&guest), None).await;
    let listed = body["resp_data"].as_array().unwrap().clone();
    let numbers: Vec<i64> = listed.iter().map(|p| p["player_number"].as_i64().unwrap()).collect();
    assert_eq!(numbers, vec![1, 7, 18]);
    assert!(listed.iter().all(|p| p["hammer"] == json!("upcoming") && p["selling_price"] == json!(0.0)));

    let kohli = listed[2]["id"].as_str().unwrap().to_string();
    let (status, body) = call(&app, "PUT", &format!("/players/{kohli}"), Some(&owner), Some(json!({"hammer": "sold", "selling_price": 1500.0}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resp_data"]["hammer"], json!("sold"));

    let (_, body) = call(&app, "GET", &roster, Some(&guest), None).await;
    assert_eq!(body["resp_data"][2]["hammer"], json!("sold"));

    let rahul = listed[0]["id"].as_str().unwrap().to_string();
    let (status, _) = call(&app, "DELETE", &format!("/players/{rahul}"), Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = call(&app, "GET", &roster, Some(&guest), None).await;
    assert_eq!(body["resp_data"].as_array().unwrap().len(), 2);

    let (status, _) = call(&app, "DELETE", &format!("/players/{rahul}"), Some(&owner), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn profile_reads_follow_upserts() {
    let app = app();
    let token = sign_in(&app, "owner@x.com").await;

    let (status, _) = call(&app, "GET", "/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, "POST", "/profile", Some(&token), Some(json!({"first_name": "Mahendra", "role": "WK"}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, "GET", "/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resp_data"]["first_name"], json!("Mahendra"));
    assert_eq!(body["resp_data"]["email"], json!("owner@x.com"));

    call(&app, "POST", "/profile", Some(&token), Some(json!({"first_name": "MS", "role": "WK"}))).await;
    let (_, body) = call(&app, "GET", "/profile", Some(&token), None).await;
    assert_eq!(body["resp_data"]["first_name"], json!("MS"));
}

#[tokio::test]
async fn requests_over_the_limit_are_throttled() {
    let mut config = Config::for_tests(SECRET);
    config.rate_limit_requests = 2;
    let app = app_with(config);

    for _ in 0..2 {
        let (status, _) = call(&app, "POST", "/auth/login", None, Some(json!({"email": "ghost@x.com"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
    let (status, body) = call(&app, "POST", "/auth/login", None, Some(json!({"email": "ghost@x.com"}))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], json!(1005));
}

#[tokio::test]
async fn session_routes_are_not_throttled() {
    let mut config = Config::for_tests(SECRET);
    config.rate_limit_requests = 2;
    let app = app_with(config);

    // 注册加校验正好用完认证接口的额度
    let token = sign_in(&app, "owner@x.com").await;
    for _ in 0..3 {
        let (status, _) = call(&app, "GET", "/auctions", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, _) = call(&app, "POST", "/auth/login", None, Some(json!({"email": "owner@x.com"}))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}
