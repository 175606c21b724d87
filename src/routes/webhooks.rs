//! Payment Provider Webhooks
//!
//! webhook 처리는 세 단계로 분리됨:
//! 1. 서명 검증 (shared secret)
//! 2. 페이로드를 강타입 이벤트로 파싱
//! 3. 외부 reference를 키로 하는 idempotent 코어 연산 호출
//!
//! 부수효과는 3단계 안에만 있음 - 재전송/중복 전달이 안전함.

use axum::{
    extract::State,
    http::HeaderMap,
    Json,
};
use serde::Deserialize;

use crate::error::ApiError;
use crate::services::checkout;
use crate::types::ApiResponse;
use crate::AppState;

// ============ Event Types ============

/// Stripe webhook 이벤트 (필요한 필드만)
#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: StripeSessionObject,
}

/// checkout.session.completed의 session 객체
///
/// metadata는 세션 생성 시 넣은 값이 그대로 돌아옴 (round-trip)
#[derive(Debug, Deserialize)]
pub struct StripeSessionObject {
    pub id: String,
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub metadata: SessionMetadata,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionMetadata {
    pub payment_reference: Option<String>,
}

// ============ Handlers ============

/// POST /webhooks/stripe
///
/// checkout.session.completed → complete_cart_payment(reference).
/// 그 외 이벤트 타입은 수신 확인만 하고 무시함.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<StripeEvent>,
) -> Result<Json<ApiResponse<String>>, ApiError> {
    // 1. 서명 검증 - 게이트웨이가 전달한 shared secret 확인
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    if !signature.contains(state.config.stripe_webhook_secret.as_str()) {
        return Err(ApiError::Unauthorized);
    }

    // 2. 이벤트 분기
    if event.event_type != "checkout.session.completed" {
        tracing::debug!(event_type = %event.event_type, "ignoring stripe event");
        return Ok(Json(ApiResponse::success("ignored".to_string())));
    }

    // reference는 metadata 우선, 없으면 client_reference_id
    let reference = event
        .data
        .object
        .metadata
        .payment_reference
        .or(event.data.object.client_reference_id)
        .ok_or_else(|| {
            ApiError::ValidationError("event has no payment reference".to_string())
        })?;

    // 3. idempotent 코어 연산
    let completion = checkout::complete_cart_payment(&state.db, &reference).await?;
    tracing::info!(
        reference = %reference,
        orders_paid = completion.orders_paid,
        already_completed = completion.already_completed,
        "stripe webhook processed"
    );

    Ok(Json(ApiResponse::success(reference)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_parses_with_metadata() {
        let raw = r#"{
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_test_1",
                "client_reference_id": "STRIPE-CART-20250101120000",
                "metadata": { "payment_reference": "STRIPE-CART-20250101120000" }
            }}
        }"#;
        let event: StripeEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.event_type, "checkout.session.completed");
        assert_eq!(
            event.data.object.metadata.payment_reference.as_deref(),
            Some("STRIPE-CART-20250101120000")
        );
    }

    #[test]
    fn test_event_parses_without_metadata() {
        // metadata가 비어 있으면 client_reference_id로 fallback
        let raw = r#"{
            "type": "checkout.session.completed",
            "data": { "object": { "id": "cs_test_2", "client_reference_id": "ORD-20250101120000-AB12CD34" } }
        }"#;
        let event: StripeEvent = serde_json::from_str(raw).unwrap();
        assert!(event.data.object.metadata.payment_reference.is_none());
        assert!(event.data.object.client_reference_id.is_some());
    }
}
