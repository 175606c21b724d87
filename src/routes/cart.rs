//! Cart Checkout Endpoints
//!
//! 멀티 셀러 장바구니 → 판매자별 주문 fan-out + aggregate 결제 1건.

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::error::ApiError;
use crate::services::checkout::{self, CheckoutItem, CheckoutRequest, CheckoutSummary, PaymentCompletion};
use crate::types::Principal;
use crate::AppState;

// ============ Request Types ============

#[derive(Debug, Deserialize)]
pub struct CartCheckoutRequest {
    pub items: Vec<CheckoutItem>,
    pub payment_method: String,
    pub payment_provider: String,
}

#[derive(Debug, Deserialize)]
pub struct CompletePaymentRequest {
    /// STRIPE-CART-... 또는 단일 주문의 주문번호
    pub reference: String,
}

// ============ Handlers ============

/// POST /cart/checkout
///
/// 판매자별 주문 N개 + 결제 1건을 원자적으로 생성하고
/// hosted checkout URL을 반환함
pub async fn checkout_cart(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<CartCheckoutRequest>,
) -> Result<Json<CheckoutSummary>, ApiError> {
    let summary = checkout::checkout_cart(
        &state.db,
        &state.stripe,
        principal,
        CheckoutRequest {
            items: req.items,
            payment_method: req.payment_method,
            payment_provider: req.payment_provider,
        },
    )
    .await?;
    Ok(Json(summary))
}

/// POST /cart/complete
///
/// 결제 완료 hook의 수동 경로 (webhook 유실 시 재시도용) - idempotent
pub async fn complete_payment(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<CompletePaymentRequest>,
) -> Result<Json<PaymentCompletion>, ApiError> {
    // 유저 재시도를 허용하되 남의 결제는 건드릴 수 없게 함
    if !principal.is_admin() {
        let payment = state
            .db
            .get_payment_by_reference(&req.reference)
            .await?
            .ok_or_else(|| ApiError::NotFound("payment".to_string()))?;
        if let Some(order_id) = payment.order_id {
            let order = state
                .db
                .get_order(order_id)
                .await?
                .ok_or_else(|| ApiError::NotFound("order".to_string()))?;
            if order.buyer_id != principal.user_id {
                return Err(ApiError::Forbidden("not your payment".to_string()));
            }
        }
    }

    let completion = checkout::complete_cart_payment(&state.db, &req.reference).await?;
    Ok(Json(completion))
}
