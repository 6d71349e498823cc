use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
};

use crate::{AppState, auth::SessionClaims, error::AppError, result::ApiResponse};

use super::model::{Profile, ProfileRequest, UserProfile};

#[axum::debug_handler]
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
) -> Result<(StatusCode, ApiResponse<UserProfile>), AppError> {
    let read = UserProfile::fetch(&state, &claims).await?;
    Ok((StatusCode::OK, ApiResponse::success(read.value)))
}

// 保存当前用户的资料，没有则创建
#[axum::debug_handler]
pub async fn upsert_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<SessionClaims>,
    Json(req): Json<ProfileRequest>,
) -> Result<(StatusCode, ApiResponse<Profile>), AppError> {
    let profile = Profile::upsert(&state, &claims, req).await?;
    Ok((StatusCode::OK, ApiResponse::success(profile)))
}
