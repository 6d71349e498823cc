use axum::{
    extract::{Extension, Json, Path, State},
    http::StatusCode,
};

use crate::{AppState, auth::SessionClaims, error::AppError, result::ApiResponse};

use super::model::{NewPlayer, Player, PlayerUpdate, SavedPlayers};

// 拍卖下的球员名单，按编号升序
#[axum::debug_handler]
pub async fn list_players(
    State(state): State<AppState>,
    Extension(_claims): Extension<SessionClaims>,
    Path(auction_id): Path<String>,
) -> Result<(StatusCode, ApiResponse<Vec<Player>>), AppError> {
    let read = Player::list(&state, &auction_id).await?;
    Ok((StatusCode::OK, ApiResponse::success(read.value)))
}

#[axum::debug_handler]
pub async fn save_players(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Path(auction_id): Path<String>,
    Json(players): Json<Vec<NewPlayer>>,
) -> Result<(StatusCode, ApiResponse<SavedPlayers>), AppError> {
    let players = Player::save_batch(&state, &auction_id, &claims.email, players).await?;
    Ok((StatusCode::CREATED, ApiResponse::success(SavedPlayers { players })))
}

#[axum::debug_handler]
pub async fn update_player(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Path(id): Path<String>,
    Json(patch): Json<PlayerUpdate>,
) -> Result<(StatusCode, ApiResponse<Player>), AppError> {
    let player = Player::update(&state, &id, &claims.email, patch).await?;
    Ok((StatusCode::OK, ApiResponse::success(player)))
}

#[axum::debug_handler]
pub async fn delete_player(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Path(id): Path<String>,
) -> Result<(StatusCode, ApiResponse<()>), AppError> {
    Player::delete(&state, &id, &claims.email).await?;
    Ok((StatusCode::OK, ApiResponse::success(())))
}
