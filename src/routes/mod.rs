//! API Routes Module
//!
//! 모든 HTTP 엔드포인트 정의
//!
//! # Routes
//! - `/health` - 헬스 체크
//! - `/orders/*` - 주문/에스크로 전이
//! - `/cart/*` - 멀티 셀러 체크아웃
//! - `/projects/*` - 프리랜스 워크플로우
//! - `/wallet/*` - 잔액/원장 조회
//! - `/payouts/*` - payout 계좌, 출금
//! - `/webhooks/*` - 인바운드 결제 provider hook
//! - `/internal/*` - 스케줄러 엔트리 (auto-release)

pub mod cart;
pub mod health;
pub mod orders;
pub mod payouts;
pub mod projects;
pub mod wallet;
pub mod webhooks;
