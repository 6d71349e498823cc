use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::result::{ApiResponse, error_codes};
use crate::store::StoreError;

/// 对外暴露的错误分类，每一类对应固定的状态码与提示语
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("conflict: {0}")]
    Conflict(&'static str),
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),
    #[error("upstream failure: {0}")]
    Upstream(String),
    #[error("deadline exceeded: {0}")]
    Timeout(&'static str),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            AppError::Validation(_) => error_codes::VALIDATION_ERROR,
            AppError::NotFound(_) => error_codes::NOT_FOUND,
            AppError::Conflict(_) => error_codes::CONFLICT,
            AppError::Unauthorized(_) => error_codes::AUTH_FAILED,
            AppError::Upstream(_) => error_codes::UPSTREAM_ERROR,
            AppError::Timeout(_) => error_codes::TIMEOUT,
            AppError::Internal(_) => error_codes::INTERNAL_ERROR,
        }
    }

    /// 返回给客户端的提示语，不包含任何内部原因
    pub fn public_message(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "请求参数无效",
            AppError::NotFound(_) => "资源不存在或已过期",
            AppError::Conflict(_) => "资源已存在",
            AppError::Unauthorized(_) => "未授权访问",
            AppError::Upstream(_) => "内部服务器错误",
            AppError::Timeout(_) => "请求超时，请稍后重试",
            AppError::Internal(_) => "服务器处理失败",
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::NotFound("record"),
            StoreError::Conflict => AppError::Conflict("record"),
            other => AppError::Upstream(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Upstream(_) | AppError::Internal(_) | AppError::Timeout(_) => {
                tracing::error!(error = %self, "request failed");
            }
            _ => tracing::debug!(error = %self, "request rejected"),
        }

        let status = self.status();
        let body = ApiResponse::<()>::error(self.code(), self.public_message());
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_not_found_maps_to_not_found() {
        let err: AppError = StoreError::NotFound.into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err: AppError = StoreError::Backend("connection reset".into()).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.public_message().contains("connection reset"));
    }

    #[test]
    fn every_category_has_its_own_message() {
        let errors = [
            AppError::Validation("x".into()),
            AppError::NotFound("x"),
            AppError::Conflict("x"),
            AppError::Unauthorized("x"),
            AppError::Upstream("x".into()),
            AppError::Timeout("x"),
            AppError::Internal("x".into()),
        ];
        let mut messages: Vec<_> = errors.iter().map(|e| e.public_message()).collect();
        messages.sort();
        messages.dedup();
        assert_eq!(messages.len(), errors.len());
    }
}
