use axum::{
    extract::{Extension, Json, Path, Query, State},
    http::StatusCode,
};

use crate::{AppState, auth::SessionClaims, error::AppError, result::ApiResponse};

use super::model::{Auction, AuctionDetail, AuctionRequest, ListQuery};

// 按范围获取当前用户的拍卖列表，最新创建的在前
#[axum::debug_handler]
pub async fn list_auctions(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Query(query): Query<ListQuery>,
) -> Result<(StatusCode, ApiResponse<Vec<Auction>>), AppError> {
    let scope = query.scope()?;
    let read = Auction::list(&state, scope, &claims.email).await?;
    tracing::debug!(scope = scope.as_str(), cached = read.from_cache(), "auctions listed");

    Ok((StatusCode::OK, ApiResponse::success(read.value)))
}

#[axum::debug_handler]
pub async fn create_auction(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Json(req): Json<AuctionRequest>,
) -> Result<(StatusCode, ApiResponse<Auction>), AppError> {
    let auction = Auction::create(&state, &claims.email, req).await?;
    Ok((StatusCode::CREATED, ApiResponse::success(auction)))
}

// 拍卖详情，任何已登录用户都可以查看
#[axum::debug_handler]
pub async fn get_auction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, ApiResponse<AuctionDetail>), AppError> {
    let detail = Auction::detail(&state, &id).await?;
    Ok((StatusCode::OK, ApiResponse::success(detail)))
}

#[axum::debug_handler]
pub async fn update_auction(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Path(id): Path<String>,
    Json(req): Json<AuctionRequest>,
) -> Result<(StatusCode, ApiResponse<Auction>), AppError> {
    let auction = Auction::update(&state, &id, &claims.email, req).await?;
    Ok((StatusCode::OK, ApiResponse::success(auction)))
}

#[axum::debug_handler]
pub async fn join_auction(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Path(id): Path<String>,
) -> Result<(StatusCode, ApiResponse<Auction>), AppError> {
    let auction = Auction::join(&state, &id, &claims.email).await?;
    Ok((StatusCode::OK, ApiResponse::success(auction)))
}
