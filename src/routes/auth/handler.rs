use axum::{
    extract::{Json, State},
    http::StatusCode,
};

use crate::{
    AppState,
    auth::{OtpFlow, SessionToken},
    error::AppError,
    result::ApiResponse,
};

use super::model::{LoginRequest, OtpSentResponse, RegisterRequest, VerifyOtpRequest};

const OTP_SENT: &str = "OTP sent to email";

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, ApiResponse<OtpSentResponse>), AppError> {
    state
        .otp
        .request_code(OtpFlow::Register, &req.email, Some(&req.mobile))
        .await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::success(OtpSentResponse { message: OTP_SENT }),
    ))
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<(StatusCode, ApiResponse<OtpSentResponse>), AppError> {
    state.otp.request_code(OtpFlow::Login, &req.email, None).await?;

    Ok((
        StatusCode::OK,
        ApiResponse::success(OtpSentResponse { message: OTP_SENT }),
    ))
}

// 注册验证码校验，成功后创建用户并签发令牌
#[axum::debug_handler]
pub async fn register_otp(
    State(state): State<AppState>,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<(StatusCode, ApiResponse<SessionToken>), AppError> {
    let code = req.code()?;
    let token = state
        .otp
        .verify_code(OtpFlow::Register, &req.email, code)
        .await?;

    Ok((StatusCode::CREATED, ApiResponse::success(token)))
}

#[axum::debug_handler]
pub async fn login_otp(
    State(state): State<AppState>,
    Json(req): Json<VerifyOtpRequest>,
) -> Result<(StatusCode, ApiResponse<SessionToken>), AppError> {
    let code = req.code()?;
    let token = state.otp.verify_code(OtpFlow::Login, &req.email, code).await?;

    Ok((StatusCode::OK, ApiResponse::success(token)))
}
