//! Common Types Module
//!
//! 애플리케이션 전반에서 사용되는 공통 타입 정의
//!
//! - `money`: 금액/통화 타입과 수수료 정책
//! - `Principal`: 업스트림 게이트웨이가 인증한 호출자
//! - `ApiResponse`: 응답 래퍼

pub mod money;

pub use money::{Currency, Money, MoneyError, MIN_WITHDRAWAL_MINOR, SERVICE_FEE_BPS};

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

/// API 응답 래퍼
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// 호출자 권한
///
/// 핸들러에 흩어져 있던 role 체크를 단일 capability enum으로 통일.
/// 각 상태 전이가 요구하는 권한은 서비스 레이어에서 검사함.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// 인증된 호출자
///
/// 인증(JWT 검증)은 업스트림 게이트웨이 담당.
/// 게이트웨이가 검증 후 `X-User-Id` / `X-User-Role` 헤더로 전달함.
#[derive(Debug, Clone, Copy)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or(ApiError::Unauthorized)?;

        let role = parts
            .headers
            .get("x-user-role")
            .and_then(|v| v.to_str().ok())
            .and_then(Role::parse)
            .unwrap_or(Role::User);

        Ok(Principal { user_id, role })
    }
}

/// 페이지네이션 쿼리 파라미터
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    /// 페이지 (0부터 시작)
    pub page: Option<u32>,
    /// 페이지 크기 (기본 20, 최대 100)
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(0)
    }

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(20).min(100)
    }
}

/// 페이지네이션 응답 메타데이터
#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub has_next: bool,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: i64) -> Self {
        Self {
            page,
            limit,
            total: total as u64,
            has_next: ((page + 1) * limit) < total as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("USER"), Some(Role::User));
        assert_eq!(Role::parse("superuser"), None);
    }

    #[test]
    fn test_page_query_caps_limit() {
        let q = PageQuery {
            page: None,
            limit: Some(500),
        };
        assert_eq!(q.limit(), 100);
        assert_eq!(q.page(), 0);
    }

    #[test]
    fn test_pagination_has_next() {
        let p = Pagination::new(0, 20, 45);
        assert!(p.has_next);
        let p = Pagination::new(2, 20, 45);
        assert!(!p.has_next);
    }
}
