//! Error Handling Module
//!
//! Provides type-safe error handling with proper HTTP status code mapping.
//! Uses thiserror for domain errors and integrates with tracing for structured logging.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::types::MoneyError;

/// API 에러 타입
///
/// # Design Decision
///
/// 각 에러 variant는 적절한 HTTP 상태 코드에 매핑됨
/// - 도메인 에러: 4xx (호출자가 복구)
/// - provider 에러: 502/504 (reconciliation 경로가 복구)
/// - 내부 에러: 5xx (요청 중단, 롤백)
///
/// 민감한 내부 정보는 클라이언트에 노출하지 않음
#[derive(Debug, Error)]
pub enum ApiError {
    // ============ 400 Bad Request ============
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    // ============ 401 / 403 ============
    #[error("Authentication required")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // ============ 404 Not Found ============
    #[error("Resource not found: {0}")]
    NotFound(String),

    // ============ 409 Conflict ============
    /// 상태 머신 guard가 전이를 거부함
    #[error("Invalid transition: cannot apply '{event}' in state '{current}'")]
    InvalidTransition { current: String, event: String },

    /// unique 제약 충돌 (주문번호, provider reference 등)
    #[error("Duplicate resource: {0}")]
    DuplicateResource(String),

    // ============ 422 Unprocessable Entity ============
    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Insufficient stock for product {0}")]
    InsufficientStock(String),

    #[error("Currency mismatch")]
    CurrencyMismatch,

    // ============ 502 / 504 Provider ============
    /// provider가 명시적으로 거절했거나 잘못된 데이터를 반환함
    #[error("Provider '{provider}' error: {code}")]
    ProviderError { provider: String, code: String },

    /// 타임아웃 - 결과 불명, reconciliation이 해소
    #[error("Provider '{0}' timed out")]
    ProviderTimeout(String),

    /// 응답은 받았으나 terminal 여부를 판단할 수 없음
    #[error("Provider '{0}' returned an ambiguous response")]
    ProviderUnknown(String),

    // ============ 500 Internal Server Error ============
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal server error")]
    InternalError,
}

impl ApiError {
    /// 상태 머신 guard 거부용 헬퍼
    pub fn invalid_transition(current: impl Into<String>, event: impl Into<String>) -> Self {
        ApiError::InvalidTransition {
            current: current.into(),
            event: event.into(),
        }
    }
}

/// API 에러 응답 구조
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            // 4xx 클라이언트 에러
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                msg.clone(),
                None,
            ),
            ApiError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                "Validation failed".to_string(),
                Some(msg.clone()),
            ),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication required".to_string(),
                None,
            ),
            ApiError::Forbidden(msg) => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                msg.clone(),
                None,
            ),
            ApiError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{} not found", resource),
                None,
            ),
            ApiError::InvalidTransition { current, event } => (
                StatusCode::CONFLICT,
                "INVALID_TRANSITION",
                format!("cannot apply '{}' in state '{}'", event, current),
                None,
            ),
            ApiError::DuplicateResource(msg) => (
                StatusCode::CONFLICT,
                "DUPLICATE_RESOURCE",
                msg.clone(),
                None,
            ),
            ApiError::InsufficientFunds => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INSUFFICIENT_FUNDS",
                "Wallet balance is insufficient".to_string(),
                None,
            ),
            ApiError::InsufficientStock(product) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INSUFFICIENT_STOCK",
                "Product stock is insufficient".to_string(),
                Some(product.clone()),
            ),
            ApiError::CurrencyMismatch => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "CURRENCY_MISMATCH",
                "Amounts have different currencies".to_string(),
                None,
            ),

            // provider 에러 - 동기 재시도 금지, reconciliation이 해소
            ApiError::ProviderError { provider, code } => {
                tracing::error!(provider = %provider, code = %code, "provider rejected request");
                (
                    StatusCode::BAD_GATEWAY,
                    "PROVIDER_ERROR",
                    format!("{} rejected the request", provider),
                    Some(code.clone()),
                )
            }
            ApiError::ProviderTimeout(provider) => {
                tracing::error!(provider = %provider, "provider call timed out");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "PROVIDER_TIMEOUT",
                    format!("{} did not respond in time", provider),
                    None,
                )
            }
            ApiError::ProviderUnknown(provider) => {
                tracing::error!(provider = %provider, "provider returned ambiguous response");
                (
                    StatusCode::BAD_GATEWAY,
                    "PROVIDER_UNKNOWN",
                    format!("{} returned an ambiguous response", provider),
                    None,
                )
            }

            // 5xx 서버 에러
            ApiError::DatabaseError(_) => {
                // 내부 에러는 클라이언트에 상세 정보 노출 안 함
                tracing::error!("Database error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Database error occurred".to_string(),
                    None,
                )
            }
            ApiError::InternalError => {
                tracing::error!("Internal error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// SQLx 에러를 ApiError로 변환
///
/// unique 제약 위반은 DuplicateResource로 구분함 (주문번호 충돌 등)
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return ApiError::DuplicateResource(
                    db_err.constraint().unwrap_or("unique constraint").to_string(),
                );
            }
        }
        tracing::error!("SQLx error: {:?}", err);
        ApiError::DatabaseError(err.to_string())
    }
}

/// 금액 연산 에러를 ApiError로 변환
impl From<MoneyError> for ApiError {
    fn from(err: MoneyError) -> Self {
        match err {
            MoneyError::CurrencyMismatch => ApiError::CurrencyMismatch,
            MoneyError::NegativeResult => ApiError::InsufficientFunds,
            MoneyError::Overflow => ApiError::ValidationError("amount overflow".to_string()),
        }
    }
}

/// anyhow 에러를 ApiError로 변환
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Anyhow error: {:?}", err);
        ApiError::InternalError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_error_mapping() {
        assert!(matches!(
            ApiError::from(MoneyError::CurrencyMismatch),
            ApiError::CurrencyMismatch
        ));
        assert!(matches!(
            ApiError::from(MoneyError::NegativeResult),
            ApiError::InsufficientFunds
        ));
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = ApiError::invalid_transition("released", "raise_dispute");
        assert_eq!(
            err.to_string(),
            "Invalid transition: cannot apply 'raise_dispute' in state 'released'"
        );
    }
}
