//! Order / Escrow Endpoints
//!
//! 주문-에스크로 상태 머신(C3)의 전이를 HTTP로 노출.
//! 인증된 principal은 게이트웨이가 넣어준 헤더에서 추출됨.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{Escrow, Order};
use crate::error::ApiError;
use crate::services::escrow::{self, CreateOrder, DisputeOutcome};
use crate::types::{Currency, Money, Principal};
use crate::AppState;

// ============ Request/Response Types ============

/// 단일 주문 생성 요청
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub seller_id: Uuid,
    pub product_id: Option<Uuid>,
    /// 기본 1
    pub quantity: Option<i32>,
    pub item_name: String,
    pub item_description: Option<String>,
    /// minor units (cents, kobo)
    pub item_cost_minor: i64,
    pub currency: String,
    pub payment_method: String,
    pub payment_provider: String,
}

/// 주문 응답
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub product_id: Option<Uuid>,
    pub item_name: String,
    pub item_cost_minor: i64,
    pub service_fee_minor: i64,
    pub total_minor: i64,
    pub currency: String,
    pub status: String,
    pub payment_reference: Option<String>,
    pub created_at: String,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number,
            buyer_id: order.buyer_id,
            seller_id: order.seller_id,
            product_id: order.product_id,
            item_name: order.item_name,
            item_cost_minor: order.item_cost_minor,
            service_fee_minor: order.service_fee_minor,
            total_minor: order.total_minor,
            currency: order.currency,
            status: order.status,
            payment_reference: order.payment_reference,
            created_at: order.created_at.to_rfc3339(),
        }
    }
}

/// 에스크로 응답
#[derive(Debug, Serialize)]
pub struct EscrowResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
    pub auto_release_days: i32,
    pub dispute_reason: Option<String>,
    pub created_at: String,
    pub released_at: Option<String>,
    pub refunded_at: Option<String>,
}

impl From<Escrow> for EscrowResponse {
    fn from(escrow: Escrow) -> Self {
        Self {
            id: escrow.id,
            order_id: escrow.order_id,
            amount_minor: escrow.amount_minor,
            currency: escrow.currency,
            status: escrow.status,
            auto_release_days: escrow.auto_release_days,
            dispute_reason: escrow.dispute_reason,
            created_at: escrow.created_at.to_rfc3339(),
            released_at: escrow.released_at.map(|t| t.to_rfc3339()),
            refunded_at: escrow.refunded_at.map(|t| t.to_rfc3339()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DisputeRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveDisputeRequest {
    /// refund | release
    pub outcome: String,
}

// ============ Handlers ============

/// POST /orders
///
/// 단일 상품 주문 생성 (status = pending)
pub async fn create_order(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let currency = Currency::parse(&req.currency)
        .ok_or_else(|| ApiError::ValidationError(format!("unsupported currency: {}", req.currency)))?;

    let order = escrow::create_order(
        &state.db,
        principal,
        CreateOrder {
            seller_id: req.seller_id,
            product_id: req.product_id,
            quantity: req.quantity.unwrap_or(1),
            item_name: req.item_name,
            item_description: req.item_description,
            item_cost: Money::new(req.item_cost_minor, currency),
            payment_method: req.payment_method,
            payment_provider: req.payment_provider,
        },
    )
    .await?;

    Ok(Json(order.into()))
}

/// GET /orders/:id
///
/// 구매자/판매자/관리자만 조회 가능
pub async fn get_order(
    State(state): State<AppState>,
    principal: Principal,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .db
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("order".to_string()))?;

    let is_party = principal.user_id == order.buyer_id || principal.user_id == order.seller_id;
    if !is_party && !principal.is_admin() {
        return Err(ApiError::Forbidden("not a party to this order".to_string()));
    }

    Ok(Json(order.into()))
}

/// GET /orders/:id/escrow
pub async fn get_order_escrow(
    State(state): State<AppState>,
    principal: Principal,
    Path(order_id): Path<Uuid>,
) -> Result<Json<EscrowResponse>, ApiError> {
    let order = state
        .db
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("order".to_string()))?;

    let is_party = principal.user_id == order.buyer_id || principal.user_id == order.seller_id;
    if !is_party && !principal.is_admin() {
        return Err(ApiError::Forbidden("not a party to this order".to_string()));
    }

    let escrow = state
        .db
        .get_escrow_by_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("escrow".to_string()))?;

    Ok(Json(escrow.into()))
}

/// POST /orders/:id/confirm-delivery
///
/// 구매자 수령 확인 → 에스크로 해제, 판매자 지갑 credit
pub async fn confirm_delivery(
    State(state): State<AppState>,
    principal: Principal,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = escrow::confirm_delivery(&state.db, principal, order_id).await?;
    Ok(Json(order.into()))
}

/// POST /orders/:id/dispute
pub async fn raise_dispute(
    State(state): State<AppState>,
    principal: Principal,
    Path(order_id): Path<Uuid>,
    Json(req): Json<DisputeRequest>,
) -> Result<Json<EscrowResponse>, ApiError> {
    let escrow = escrow::raise_dispute(&state.db, principal, order_id, &req.reason).await?;
    Ok(Json(escrow.into()))
}

/// POST /orders/:id/resolve-dispute (admin)
pub async fn resolve_dispute(
    State(state): State<AppState>,
    principal: Principal,
    Path(order_id): Path<Uuid>,
    Json(req): Json<ResolveDisputeRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let outcome = DisputeOutcome::parse(&req.outcome)
        .ok_or_else(|| ApiError::ValidationError("outcome must be 'refund' or 'release'".to_string()))?;
    let order = escrow::admin_resolve_dispute(&state.db, principal, order_id, outcome).await?;
    Ok(Json(order.into()))
}

/// POST /orders/:id/cancel
pub async fn cancel_order(
    State(state): State<AppState>,
    principal: Principal,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = escrow::cancel_order(&state.db, principal, order_id).await?;
    Ok(Json(order.into()))
}

/// POST /internal/escrow/auto-release
///
/// 스케줄러 엔트리 - 보관 기간이 지난 held 에스크로 일괄 해제.
/// 백그라운드 루프와 같은 idempotent 연산을 공유함.
pub async fn auto_release_tick(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<escrow::AutoReleaseReport>, ApiError> {
    if !principal.is_admin() {
        return Err(ApiError::Forbidden("admin role required".to_string()));
    }
    let report = escrow::auto_release_tick(&state.db).await?;
    Ok(Json(report))
}
