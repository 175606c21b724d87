//! Services Module
//!
//! 에스크로 코어의 비즈니스 로직 레이어
//!
//! # Services
//! - `wallet`: 지갑 원장 (C2) - credit/debit, 트랜잭션 경계 강제
//! - `escrow`: 주문-에스크로 상태 머신 (C3)
//! - `project`: 프리랜스 워크플로우 상태 머신 (C4)
//! - `checkout`: 멀티 셀러 cart fan-out (C5)
//! - `payout`: 출금 디스패처 (C6)
//! - `provider`: payout lane 공통 trait + country 라우팅
//! - `stripe` / `paystack`: provider gateway 구현

pub mod checkout;
pub mod escrow;
pub mod payout;
pub mod paystack;
pub mod project;
pub mod provider;
pub mod stripe;
pub mod wallet;

pub use paystack::PaystackGateway;
pub use provider::ProviderRegistry;
pub use stripe::StripeGateway;
