//! Database Models
//!
//! Row types for the escrow core entities and the status enums that drive
//! the state machines. Monetary columns are BIGINT minor units plus an
//! ISO-4217 currency column.
//!
//! # Interview Q&A
//!
//! Q: status 컬럼은 왜 TEXT로 저장하는가?
//! A: Postgres ENUM 타입 대신 TEXT + CHECK 제약 사용
//!    - 마이그레이션에서 variant 추가가 단순함 (ALTER TYPE 불필요)
//!    - Rust 쪽에서는 명시적 enum으로 파싱 후 전이 함수가 pattern-match
//!    - 문자열 비교가 코드에 흩어지는 것을 방지

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

use crate::types::{Currency, Money};

/// minor unit + 통화 컬럼 → Money
///
/// 통화 컬럼이 알 수 없는 값이면 None (DB 제약 위반 상황)
pub fn money_from_row(minor: i64, currency: &str) -> Option<Money> {
    Currency::parse(currency).map(|c| Money::new(minor, c))
}

// ============ Status Enums ============

/// 주문 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Paid,
    Processing,
    Completed,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "paid" => Some(OrderStatus::Paid),
            "processing" => Some(OrderStatus::Processing),
            "completed" => Some(OrderStatus::Completed),
            "cancelled" => Some(OrderStatus::Cancelled),
            "refunded" => Some(OrderStatus::Refunded),
            _ => None,
        }
    }
}

/// 에스크로 상태
///
/// held → released | refunded | disputed → (released | refunded)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowStatus {
    Held,
    Released,
    Refunded,
    Disputed,
}

impl EscrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowStatus::Held => "held",
            EscrowStatus::Released => "released",
            EscrowStatus::Refunded => "refunded",
            EscrowStatus::Disputed => "disputed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "held" => Some(EscrowStatus::Held),
            "released" => Some(EscrowStatus::Released),
            "refunded" => Some(EscrowStatus::Refunded),
            "disputed" => Some(EscrowStatus::Disputed),
            _ => None,
        }
    }

    /// terminal 상태 여부 (released/refunded는 더 이상 전이 불가)
    pub fn is_terminal(&self) -> bool {
        matches!(self, EscrowStatus::Released | EscrowStatus::Refunded)
    }
}

/// 프리랜스 프로젝트 워크플로우 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStatus {
    Posted,
    Accepted,
    Negotiating,
    PriceAgreed,
    EscrowFunded,
    WorkSubmitted,
    Completed,
    Paid,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Posted => "posted",
            WorkflowStatus::Accepted => "accepted",
            WorkflowStatus::Negotiating => "negotiating",
            WorkflowStatus::PriceAgreed => "price_agreed",
            WorkflowStatus::EscrowFunded => "escrow_funded",
            WorkflowStatus::WorkSubmitted => "work_submitted",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "posted" => Some(WorkflowStatus::Posted),
            "accepted" => Some(WorkflowStatus::Accepted),
            "negotiating" => Some(WorkflowStatus::Negotiating),
            "price_agreed" => Some(WorkflowStatus::PriceAgreed),
            "escrow_funded" => Some(WorkflowStatus::EscrowFunded),
            "work_submitted" => Some(WorkflowStatus::WorkSubmitted),
            "completed" => Some(WorkflowStatus::Completed),
            "paid" => Some(WorkflowStatus::Paid),
            _ => None,
        }
    }
}

/// 작업 제출물 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SubmissionStatus::Pending),
            "approved" => Some(SubmissionStatus::Approved),
            "rejected" => Some(SubmissionStatus::Rejected),
            _ => None,
        }
    }
}

/// 출금 요청 상태
///
/// pending_manual: NG legacy lane - 지갑 차감은 끝났고 오퍼레이터가 수동 송금
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawalStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    PendingManual,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Processing => "processing",
            WithdrawalStatus::Completed => "completed",
            WithdrawalStatus::Failed => "failed",
            WithdrawalStatus::PendingManual => "pending_manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(WithdrawalStatus::Pending),
            "processing" => Some(WithdrawalStatus::Processing),
            "completed" => Some(WithdrawalStatus::Completed),
            "failed" => Some(WithdrawalStatus::Failed),
            "pending_manual" => Some(WithdrawalStatus::PendingManual),
            _ => None,
        }
    }
}

/// 인바운드 결제 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Processing,
    Success,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "processing" => Some(PaymentStatus::Processing),
            "success" => Some(PaymentStatus::Success),
            "failed" => Some(PaymentStatus::Failed),
            "cancelled" => Some(PaymentStatus::Cancelled),
            _ => None,
        }
    }
}

/// 원장 엔트리 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    Credit,
    Debit,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Credit => "credit",
            TxKind::Debit => "debit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "credit" => Some(TxKind::Credit),
            "debit" => Some(TxKind::Debit),
            _ => None,
        }
    }
}

// ============ Row Types ============

/// 사용자
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// user | admin
    pub role: String,
    /// ISO-3166 (payout lane 라우팅에 사용)
    pub country_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 상품
#[derive(Debug, Clone, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price_minor: i64,
    pub currency: String,
    /// 재고 - 결제 완료 시 guarded decrement로 차감
    pub stock: i32,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn price(&self) -> Option<Money> {
        money_from_row(self.price_minor, &self.currency)
    }
}

/// 지갑 (유저당 1개, 첫 credit/debit에서 lazy 생성)
#[derive(Debug, Clone, FromRow)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    /// 불변식: balance_minor >= 0, balance == Σcredit − Σdebit
    pub balance_minor: i64,
    pub currency: String,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn balance(&self) -> Option<Money> {
        money_from_row(self.balance_minor, &self.currency)
    }
}

/// 지갑 원장 엔트리 (append-only, 수정/삭제 없음)
#[derive(Debug, Clone, FromRow)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    /// credit | debit
    pub kind: String,
    /// 항상 양수
    pub amount_minor: i64,
    pub currency: String,
    pub description: String,
    pub related_order_id: Option<Uuid>,
    pub related_project_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// 마켓플레이스 주문
#[derive(Debug, Clone, FromRow)]
pub struct Order {
    pub id: Uuid,
    /// ORD-YYYYMMDDHHMMSS-XXXXXXXX
    pub order_number: String,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    /// 한 판매자의 여러 상품을 묶은 주문이면 NULL
    pub product_id: Option<Uuid>,
    pub item_name: String,
    pub item_description: Option<String>,
    pub item_cost_minor: i64,
    /// item cost의 5% (banker's rounding)
    pub service_fee_minor: i64,
    /// item_cost + service_fee
    pub total_minor: i64,
    pub currency: String,
    pub status: String,
    pub payment_method: Option<String>,
    pub payment_provider: Option<String>,
    /// cart fan-out 시 aggregate payment와 연결하는 명시적 참조
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn item_cost(&self) -> Option<Money> {
        money_from_row(self.item_cost_minor, &self.currency)
    }

    pub fn total(&self) -> Option<Money> {
        money_from_row(self.total_minor, &self.currency)
    }
}

/// 주문 라인 (fan-out 시 재고 차감에 필요한 수량 기록)
#[derive(Debug, Clone, FromRow)]
pub struct OrderItem {
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price_minor: i64,
}

/// 에스크로 - 주문당 정확히 1개 (status >= paid 이후)
#[derive(Debug, Clone, FromRow)]
pub struct Escrow {
    pub id: Uuid,
    pub order_id: Uuid,
    /// item_cost와 동일 (서비스 수수료는 에스크로 제외)
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
    pub auto_release_days: i32,
    pub requires_buyer_approval: bool,
    pub requires_delivery_confirmation: bool,
    pub buyer_approved: bool,
    pub delivery_confirmed: bool,
    pub dispute_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub buyer_approved_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl Escrow {
    pub fn amount(&self) -> Option<Money> {
        money_from_row(self.amount_minor, &self.currency)
    }
}

/// 프리랜스 프로젝트
#[derive(Debug, Clone, FromRow)]
pub struct Project {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub budget_minor: i64,
    pub currency: String,
    pub deadline: Option<DateTime<Utc>>,
    pub owner_id: Uuid,
    pub freelancer_id: Option<Uuid>,
    pub workflow_status: String,
    pub agreed_price_minor: Option<i64>,
    /// 게시 전제조건 - 구독 결제는 외부 provider가 처리
    pub subscription_paid: bool,
    pub subscription_payment_ref: Option<String>,
    /// paid 전이 시 false로 돌아감 (hold가 소비됨)
    pub escrow_funded: bool,
    pub escrow_amount_minor: Option<i64>,
    pub escrow_funded_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub payment_released_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 프리랜서 작업 제출물 (escrow_funded 상태에서만 생성)
#[derive(Debug, Clone, FromRow)]
pub struct WorkSubmission {
    pub id: Uuid,
    pub project_id: Uuid,
    pub freelancer_id: Uuid,
    pub description: String,
    pub files_url: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 판매자 payout 계좌 (유저당 최대 1개 활성)
#[derive(Debug, Clone, FromRow)]
pub struct SellerPayoutAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    /// card | bank_account
    pub method: String,
    pub bank_name: Option<String>,
    pub bank_code: Option<String>,
    /// 마스킹된 식별자 끝 4자리
    pub last4: String,
    pub account_holder: Option<String>,
    pub country_code: String,
    /// stripe | paystack | manual - lane discriminator
    pub provider: String,
    /// provider 쪽 opaque 핸들 (Stripe customer, Paystack recipient_code)
    pub provider_recipient_id: Option<String>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 출금 요청
#[derive(Debug, Clone, FromRow)]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
    pub payout_method: String,
    /// opaque 직렬화 - PayoutDetails enum으로 역직렬화
    pub payout_details: JsonValue,
    pub provider_transfer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WithdrawalRequest {
    pub fn amount(&self) -> Option<Money> {
        money_from_row(self.amount_minor, &self.currency)
    }
}

/// 인바운드 결제 기록
#[derive(Debug, Clone, FromRow)]
pub struct Payment {
    pub id: Uuid,
    /// cart aggregate payment는 NULL (orders.payment_reference로 연결)
    pub order_id: Option<Uuid>,
    pub amount_minor: i64,
    pub currency: String,
    pub payment_method: String,
    pub payment_provider: String,
    /// unique - idempotent 완료 처리의 키
    pub provider_reference: String,
    pub provider_transaction_id: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips() {
        for s in ["pending", "paid", "processing", "completed", "cancelled", "refunded"] {
            assert_eq!(OrderStatus::parse(s).unwrap().as_str(), s);
        }
        for s in ["held", "released", "refunded", "disputed"] {
            assert_eq!(EscrowStatus::parse(s).unwrap().as_str(), s);
        }
        for s in [
            "posted",
            "accepted",
            "negotiating",
            "price_agreed",
            "escrow_funded",
            "work_submitted",
            "completed",
            "paid",
        ] {
            assert_eq!(WorkflowStatus::parse(s).unwrap().as_str(), s);
        }
        for s in ["pending", "processing", "completed", "failed", "pending_manual"] {
            assert_eq!(WithdrawalStatus::parse(s).unwrap().as_str(), s);
        }
    }

    #[test]
    fn test_unknown_status_rejected() {
        assert_eq!(EscrowStatus::parse("frozen"), None);
        assert_eq!(TxKind::parse("transfer"), None);
    }

    #[test]
    fn test_escrow_terminal() {
        assert!(EscrowStatus::Released.is_terminal());
        assert!(EscrowStatus::Refunded.is_terminal());
        assert!(!EscrowStatus::Held.is_terminal());
        assert!(!EscrowStatus::Disputed.is_terminal());
    }

    #[test]
    fn test_money_from_row() {
        let m = money_from_row(10_500, "USD").unwrap();
        assert_eq!(m.minor(), 10_500);
        assert!(money_from_row(100, "XYZ").is_none());
    }
}
