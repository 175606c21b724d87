//! Avalanche Escrow Core Library
//!
//! # Overview
//!
//! 이 라이브러리는 Avalanche 마켓플레이스/프리랜싱 플랫폼의 에스크로 및
//! 자금 이동 코어를 제공합니다.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                          API                              │
//! │                                                           │
//! │  ┌─────────┐  ┌──────────┐  ┌─────────┐  ┌─────────┐     │
//! │  │ Routes  │  │ Services │  │   DB    │  │  Types  │     │
//! │  └────┬────┘  └────┬─────┘  └────┬────┘  └────┬────┘     │
//! │       │            │             │            │           │
//! │       └────────────┴─────────────┴────────────┘           │
//! │                        │                                  │
//! └────────────────────────┼──────────────────────────────────┘
//!                          │
//!              ┌───────────┴───────────┐
//!              ▼                       ▼
//!      ┌──────────────┐       ┌──────────────┐
//!      │  PostgreSQL  │       │  Providers   │
//!      │  (escrow,    │       │  Stripe /    │
//!      │   ledger)    │       │  Paystack    │
//!      └──────────────┘       └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: 환경 설정 관리
//! - `error`: 에러 taxonomy 및 HTTP 매핑
//! - `routes`: HTTP 엔드포인트 핸들러
//! - `services`: 에스크로 코어 (지갑 원장, 상태 머신, fan-out, 디스패처)
//! - `db`: 데이터베이스 연동 (row-level lock, 트랜잭션 경계)
//! - `types`: 금액/통화, principal, 공통 타입
//!
//! ## Usage
//!
//! ```rust,ignore
//! use avalanche_api::{Config, Database, StripeGateway};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let db = Database::connect(&config.database_url).await?;
//!     db.run_migrations().await?;
//!
//!     // ... 서버 시작
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod services;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use db::Database;
pub use error::ApiError;
pub use services::{PaystackGateway, ProviderRegistry, StripeGateway};

/// 애플리케이션 전역 상태
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub stripe: Arc<StripeGateway>,
    pub paystack: Arc<PaystackGateway>,
    pub config: Arc<Config>,
}

impl AppState {
    /// payout lane 셀렉터 (Arc clone만 - 비용 없음)
    pub fn providers(&self) -> ProviderRegistry {
        ProviderRegistry {
            stripe: Arc::clone(&self.stripe),
            paystack: Arc::clone(&self.paystack),
        }
    }
}
