//! Order-Escrow State Machine (C3)
//!
//! # Interview Q&A
//!
//! Q: 상태 전이를 어떻게 직렬화하는가?
//! A: 전이 시작 시 주문/에스크로 행에 row-level lock
//!    - 동시 전이는 post-commit 상태를 보거나 InvalidTransition
//!    - buyer_confirm vs auto_release 경합: 먼저 커밋한 쪽이 이기고
//!      나머지는 no-op (에러 아님)
//!
//! Q: 에스크로 금액에 서비스 수수료가 포함되는가?
//! A: 포함되지 않음 - escrow.amount == item_cost
//!    - 수수료는 구매자가 부담하고 해제 시 플랫폼이 보유
//!    - 환불 시에는 total_amount(수수료 포함)가 구매자에게 복원됨
//!
//! ```text
//! Order:  pending ──mark_paid──▶ paid ──────────▶ completed
//!            │                    │  ╲                ▲
//!          cancel            dispute  ╲ auto_release  │
//!            ▼                    ▼    ╲──────────────┤
//!        cancelled            disputed ──admin────▶ refunded
//! ```

use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

use crate::db::{
    self, Database, Escrow, EscrowStatus, Order, OrderStatus, PgTx,
};
use crate::error::ApiError;
use crate::services::wallet::{self, LedgerRef};
use crate::types::{Currency, Money, Principal};

/// 에스크로 기본 보관 기간 (일)
pub const DEFAULT_AUTO_RELEASE_DAYS: i32 = 7;

// ============ Identifiers ============

/// 주문번호 생성: ORD-YYYYMMDDHHMMSS-XXXXXXXX (X ∈ [A-Z0-9])
pub fn generate_order_number() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..8)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();
    format!("ORD-{}-{}", Utc::now().format("%Y%m%d%H%M%S"), suffix)
}

// ============ Transition Function ============

/// 에스크로 이벤트
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowEvent {
    ConfirmDelivery,
    AutoRelease,
    RaiseDispute,
    AdminRelease,
    AdminRefund,
}

impl EscrowEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowEvent::ConfirmDelivery => "confirm_delivery",
            EscrowEvent::AutoRelease => "auto_release",
            EscrowEvent::RaiseDispute => "raise_dispute",
            EscrowEvent::AdminRelease => "admin_release",
            EscrowEvent::AdminRefund => "admin_refund",
        }
    }
}

/// (현재 상태, 이벤트) → 다음 상태
///
/// 상태 머신의 단일 진실 - 핸들러에 흩어진 문자열 비교 대신
/// 모든 전이가 이 함수를 통과함.
pub fn escrow_transition(
    current: EscrowStatus,
    event: EscrowEvent,
) -> Result<EscrowStatus, ApiError> {
    use EscrowEvent::*;
    use EscrowStatus::*;

    match (current, event) {
        (Held, ConfirmDelivery) => Ok(Released),
        (Held, AutoRelease) => Ok(Released),
        (Held, RaiseDispute) => Ok(Disputed),
        // disputed 상태는 admin만 풀 수 있음; auto-release는 절대 불가
        (Disputed, AdminRelease) => Ok(Released),
        (Disputed, AdminRefund) => Ok(Refunded),
        (state, event) => Err(ApiError::invalid_transition(
            state.as_str(),
            event.as_str(),
        )),
    }
}

fn parse_escrow_status(escrow: &Escrow) -> Result<EscrowStatus, ApiError> {
    EscrowStatus::parse(&escrow.status)
        .ok_or_else(|| ApiError::DatabaseError(format!("escrow {} has unknown status", escrow.id)))
}

fn parse_order_status(order: &Order) -> Result<OrderStatus, ApiError> {
    OrderStatus::parse(&order.status)
        .ok_or_else(|| ApiError::DatabaseError(format!("order {} has unknown status", order.id)))
}

fn order_currency(order: &Order) -> Result<Currency, ApiError> {
    Currency::parse(&order.currency)
        .ok_or_else(|| ApiError::DatabaseError(format!("order {} has unknown currency", order.id)))
}

// ============ Operations ============

/// 단일 주문 생성 파라미터
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub seller_id: Uuid,
    pub product_id: Option<Uuid>,
    pub quantity: i32,
    pub item_name: String,
    pub item_description: Option<String>,
    pub item_cost: Money,
    pub payment_method: String,
    pub payment_provider: String,
}

/// 단일 상품 주문 생성 (status = pending)
///
/// 수수료 정책: service_fee = item_cost의 5%, total = item_cost + fee.
/// 결제 레코드(pending)를 함께 만들고 주문번호를 reference로 사용함 -
/// 이후 webhook 완료 처리가 cart와 같은 경로를 탄다.
pub async fn create_order(
    db: &Database,
    principal: Principal,
    req: CreateOrder,
) -> Result<Order, ApiError> {
    if req.seller_id == principal.user_id {
        return Err(ApiError::ValidationError(
            "buyer and seller cannot be the same user".to_string(),
        ));
    }
    if req.quantity <= 0 {
        return Err(ApiError::ValidationError("quantity must be positive".to_string()));
    }
    if req.item_cost.minor() <= 0 {
        return Err(ApiError::ValidationError("item cost must be positive".to_string()));
    }

    // 상품이 지정된 경우 판매자/재고 사전 검증 (실제 차감은 결제 완료 시)
    if let Some(product_id) = req.product_id {
        let product = db
            .get_product(product_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("product".to_string()))?;
        if product.seller_id != req.seller_id {
            return Err(ApiError::ValidationError(
                "product does not belong to the seller".to_string(),
            ));
        }
        if product.stock < req.quantity {
            return Err(ApiError::InsufficientStock(product_id.to_string()));
        }
    }

    let service_fee = req.item_cost.service_fee();
    let total = req.item_cost.checked_add(service_fee)?;

    let order_id = Uuid::new_v4();
    let order_number = generate_order_number();

    let mut tx = db.begin().await?;

    db::orders::insert_order(
        &mut tx,
        &db::orders::NewOrder {
            id: order_id,
            order_number: order_number.clone(),
            buyer_id: principal.user_id,
            seller_id: req.seller_id,
            product_id: req.product_id,
            item_name: req.item_name.clone(),
            item_description: req.item_description.clone(),
            item_cost_minor: req.item_cost.minor(),
            service_fee_minor: service_fee.minor(),
            total_minor: total.minor(),
            currency: req.item_cost.currency().as_str().to_string(),
            payment_method: Some(req.payment_method.clone()),
            payment_provider: Some(req.payment_provider.clone()),
            payment_reference: Some(order_number.clone()),
        },
    )
    .await?;

    if let Some(product_id) = req.product_id {
        db::orders::insert_order_item(
            &mut tx,
            order_id,
            product_id,
            req.quantity,
            req.item_cost.minor() / req.quantity as i64,
        )
        .await?;
    }

    db::orders::insert_payment(
        &mut tx,
        Some(order_id),
        total.minor(),
        req.item_cost.currency().as_str(),
        &req.payment_method,
        &req.payment_provider,
        &order_number,
        None,
    )
    .await?;

    tx.commit().await?;

    tracing::info!(order_number = %order_number, buyer = %principal.user_id, "order created");

    db.get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("order".to_string()))
}

/// 결제 성공 이벤트를 주문에 적용 (pending → paid)
///
/// 호출자의 트랜잭션 안에서 실행됨 (cart 완료 처리가 주문별로 호출).
/// 효과: 주문 라인별 guarded 재고 차감 + 에스크로 생성(held, amount=item_cost).
pub(crate) async fn apply_payment_success(tx: &mut PgTx<'_>, order: &Order) -> Result<(), ApiError> {
    let status = parse_order_status(order)?;
    if status != OrderStatus::Pending {
        return Err(ApiError::invalid_transition(order.status.clone(), "mark_paid"));
    }

    // 재고 차감 - 0행 영향이면 전이 전체가 롤백됨
    let items = db::orders::get_order_items(tx, order.id).await?;
    for item in &items {
        let ok = db::orders::decrement_stock(tx, item.product_id, item.quantity).await?;
        if !ok {
            return Err(ApiError::InsufficientStock(item.product_id.to_string()));
        }
    }

    db::orders::insert_escrow(
        tx,
        order.id,
        order.item_cost_minor,
        &order.currency,
        DEFAULT_AUTO_RELEASE_DAYS,
    )
    .await?;
    db::orders::set_order_status(tx, order.id, OrderStatus::Paid.as_str()).await?;

    tracing::info!(order_number = %order.order_number, "order paid, escrow held");
    Ok(())
}

/// 에스크로 해제의 공통 효과
///
/// 에스크로 released + 주문 completed + 판매자 지갑 credit이
/// 하나의 트랜잭션 단위로 묶임.
async fn release_escrow(
    tx: &mut PgTx<'_>,
    order: &Order,
    escrow: &Escrow,
    buyer_approved: bool,
) -> Result<(), ApiError> {
    let currency = order_currency(order)?;
    let amount = Money::new(escrow.amount_minor, currency);

    db::orders::mark_escrow_released(tx, escrow.id, buyer_approved).await?;
    db::orders::set_order_status(tx, order.id, OrderStatus::Completed.as_str()).await?;
    wallet::credit_user(
        tx,
        order.seller_id,
        amount,
        &format!("escrow release for order {}", order.order_number),
        LedgerRef::order(order.id),
    )
    .await?;
    Ok(())
}

/// 구매자 수령 확인 → 에스크로 해제 (paid → completed)
///
/// 이미 해제된 에스크로면 no-op - auto-release와의 경합에서
/// 둘 중 하나만 커밋되고 나머지는 조용히 성공함.
pub async fn confirm_delivery(
    db: &Database,
    principal: Principal,
    order_id: Uuid,
) -> Result<Order, ApiError> {
    let mut tx = db.begin().await?;

    let order = db::orders::lock_order(&mut tx, order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("order".to_string()))?;
    if order.buyer_id != principal.user_id {
        return Err(ApiError::Forbidden(
            "only the buyer can confirm delivery".to_string(),
        ));
    }

    let escrow = db::orders::lock_escrow_by_order(&mut tx, order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("escrow".to_string()))?;

    match parse_escrow_status(&escrow)? {
        EscrowStatus::Released => {
            // 경합에서 진 쪽: no-op
            tx.commit().await?;
        }
        current => {
            escrow_transition(current, EscrowEvent::ConfirmDelivery)?;
            release_escrow(&mut tx, &order, &escrow, true).await?;
            tx.commit().await?;
            tracing::info!(order_number = %order.order_number, "delivery confirmed, escrow released");
        }
    }

    db.get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("order".to_string()))
}

/// 분쟁 제기 - release 경로 동결
///
/// 구매자/판매자만 가능. 해제 이후에는 InvalidTransition.
pub async fn raise_dispute(
    db: &Database,
    principal: Principal,
    order_id: Uuid,
    reason: &str,
) -> Result<Escrow, ApiError> {
    if reason.trim().is_empty() {
        return Err(ApiError::ValidationError("dispute reason is required".to_string()));
    }

    let mut tx = db.begin().await?;

    let order = db::orders::lock_order(&mut tx, order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("order".to_string()))?;
    if principal.user_id != order.buyer_id && principal.user_id != order.seller_id {
        return Err(ApiError::Forbidden(
            "only the buyer or seller can raise a dispute".to_string(),
        ));
    }

    let escrow = db::orders::lock_escrow_by_order(&mut tx, order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("escrow".to_string()))?;

    let current = parse_escrow_status(&escrow)?;
    escrow_transition(current, EscrowEvent::RaiseDispute)?;

    db::orders::mark_escrow_disputed(&mut tx, escrow.id, reason).await?;
    tx.commit().await?;

    tracing::info!(order_number = %order.order_number, "dispute raised");

    db.get_escrow_by_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("escrow".to_string()))
}

/// 분쟁 해결 방향
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisputeOutcome {
    Refund,
    Release,
}

impl DisputeOutcome {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "refund" => Some(DisputeOutcome::Refund),
            "release" => Some(DisputeOutcome::Release),
            _ => None,
        }
    }
}

/// 관리자 분쟁 해결 (disputed → released | refunded)
///
/// refund: 구매자에게 total_amount(수수료 포함) credit, 주문 refunded.
/// release: buyer_confirm과 동일한 해제 경로, 주문 completed.
pub async fn admin_resolve_dispute(
    db: &Database,
    principal: Principal,
    order_id: Uuid,
    outcome: DisputeOutcome,
) -> Result<Order, ApiError> {
    if !principal.is_admin() {
        return Err(ApiError::Forbidden("admin role required".to_string()));
    }

    let mut tx = db.begin().await?;

    let order = db::orders::lock_order(&mut tx, order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("order".to_string()))?;
    let escrow = db::orders::lock_escrow_by_order(&mut tx, order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("escrow".to_string()))?;

    let current = parse_escrow_status(&escrow)?;
    match outcome {
        DisputeOutcome::Release => {
            escrow_transition(current, EscrowEvent::AdminRelease)?;
            release_escrow(&mut tx, &order, &escrow, false).await?;
        }
        DisputeOutcome::Refund => {
            escrow_transition(current, EscrowEvent::AdminRefund)?;
            let currency = order_currency(&order)?;
            db::orders::mark_escrow_refunded(&mut tx, escrow.id).await?;
            db::orders::set_order_status(&mut tx, order.id, OrderStatus::Refunded.as_str()).await?;
            // 환불은 수수료까지 전액 복원
            wallet::credit_user(
                &mut tx,
                order.buyer_id,
                Money::new(order.total_minor, currency),
                &format!("refund for order {}", order.order_number),
                LedgerRef::order(order.id),
            )
            .await?;
        }
    }

    tx.commit().await?;
    tracing::info!(order_number = %order.order_number, outcome = ?outcome, "dispute resolved");

    db.get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("order".to_string()))
}

/// auto-release tick 결과
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct AutoReleaseReport {
    pub scanned: usize,
    pub released: usize,
}

/// 보관 기간이 지난 held 에스크로를 일괄 해제
///
/// idempotent: 이미 해제됐거나 disputed로 바뀐 행은 잠금 후 재검사에서
/// 걸러져 no-op. 행 단위 트랜잭션이라 한 건의 실패가 나머지를 막지 않음.
pub async fn auto_release_tick(db: &Database) -> Result<AutoReleaseReport, ApiError> {
    let candidates = db.list_auto_release_candidates().await?;
    let scanned = candidates.len();
    let mut released = 0usize;

    for order_id in candidates {
        match auto_release_one(db, order_id).await {
            Ok(true) => released += 1,
            Ok(false) => {}
            Err(err) => {
                tracing::error!(order_id = %order_id, error = %err, "auto-release failed for order");
            }
        }
    }

    if released > 0 {
        tracing::info!(scanned, released, "auto-release tick completed");
    }
    Ok(AutoReleaseReport { scanned, released })
}

/// 단일 에스크로 auto-release - 잠금 아래에서 guard 재검사
async fn auto_release_one(db: &Database, order_id: Uuid) -> Result<bool, ApiError> {
    let mut tx = db.begin().await?;

    let order = match db::orders::lock_order(&mut tx, order_id).await? {
        Some(o) => o,
        None => return Ok(false),
    };
    let escrow = match db::orders::lock_escrow_by_order(&mut tx, order_id).await? {
        Some(e) => e,
        None => return Ok(false),
    };

    // 스캔 이후 상태가 바뀌었을 수 있음 (buyer 확인, 분쟁 등)
    if parse_escrow_status(&escrow)? != EscrowStatus::Held {
        return Ok(false);
    }
    let elapsed = Utc::now() - escrow.created_at;
    if elapsed < chrono::Duration::days(escrow.auto_release_days as i64) {
        return Ok(false);
    }

    escrow_transition(EscrowStatus::Held, EscrowEvent::AutoRelease)?;
    release_escrow(&mut tx, &order, &escrow, false).await?;
    tx.commit().await?;

    tracing::info!(order_number = %order.order_number, "escrow auto-released");
    Ok(true)
}

/// 주문 취소 (pending → cancelled)
///
/// guard: 성공한 결제가 존재하면 취소 불가.
pub async fn cancel_order(
    db: &Database,
    principal: Principal,
    order_id: Uuid,
) -> Result<Order, ApiError> {
    let mut tx = db.begin().await?;

    let order = db::orders::lock_order(&mut tx, order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("order".to_string()))?;
    if order.buyer_id != principal.user_id {
        return Err(ApiError::Forbidden("only the buyer can cancel".to_string()));
    }

    let status = parse_order_status(&order)?;
    if status != OrderStatus::Pending {
        return Err(ApiError::invalid_transition(order.status.clone(), "cancel"));
    }
    if db::orders::has_successful_payment(&mut tx, order_id).await? {
        return Err(ApiError::invalid_transition(order.status.clone(), "cancel"));
    }

    db::orders::set_order_status(&mut tx, order_id, OrderStatus::Cancelled.as_str()).await?;
    tx.commit().await?;

    db.get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("order".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_number_format() {
        let n = generate_order_number();
        // ORD-YYYYMMDDHHMMSS-XXXXXXXX
        assert_eq!(n.len(), 4 + 14 + 1 + 8);
        assert!(n.starts_with("ORD-"));
        let parts: Vec<&str> = n.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].len(), 14);
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_transition_held_paths() {
        use EscrowEvent::*;
        use EscrowStatus::*;
        assert_eq!(escrow_transition(Held, ConfirmDelivery).unwrap(), Released);
        assert_eq!(escrow_transition(Held, AutoRelease).unwrap(), Released);
        assert_eq!(escrow_transition(Held, RaiseDispute).unwrap(), Disputed);
    }

    #[test]
    fn test_transition_disputed_blocks_auto_release() {
        // 불변식 E2: disputed 에스크로는 절대 auto-release 되지 않음
        assert!(matches!(
            escrow_transition(EscrowStatus::Disputed, EscrowEvent::AutoRelease),
            Err(ApiError::InvalidTransition { .. })
        ));
        assert!(matches!(
            escrow_transition(EscrowStatus::Disputed, EscrowEvent::ConfirmDelivery),
            Err(ApiError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_transition_admin_resolves_dispute() {
        use EscrowEvent::*;
        use EscrowStatus::*;
        assert_eq!(escrow_transition(Disputed, AdminRelease).unwrap(), Released);
        assert_eq!(escrow_transition(Disputed, AdminRefund).unwrap(), Refunded);
        // admin 해제는 held 상태에서는 정의되지 않음 (분쟁 전용)
        assert!(escrow_transition(Held, AdminRefund).is_err());
    }

    #[test]
    fn test_transition_terminal_states_frozen() {
        use EscrowEvent::*;
        use EscrowStatus::*;
        for event in [ConfirmDelivery, AutoRelease, RaiseDispute, AdminRelease, AdminRefund] {
            assert!(escrow_transition(Released, event).is_err());
            assert!(escrow_transition(Refunded, event).is_err());
        }
    }

    #[test]
    fn test_dispute_outcome_parse() {
        assert_eq!(DisputeOutcome::parse("refund"), Some(DisputeOutcome::Refund));
        assert_eq!(DisputeOutcome::parse("release"), Some(DisputeOutcome::Release));
        assert_eq!(DisputeOutcome::parse("split"), None);
    }
}
