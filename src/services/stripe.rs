//! Stripe Gateway
//!
//! 인바운드 결제(hosted checkout session)와 카드/ACH payout lane.
//!
//! # Interview Q&A
//!
//! Q: 왜 공식 SDK 대신 REST를 직접 호출하는가?
//! A: 필요한 endpoint가 4개뿐이고 form-encoded 호출이 단순함
//!    - reqwest + 15초 타임아웃 + Idempotency-Key 헤더면 충분
//!    - 타임아웃/거절/모호 응답의 분류를 우리 에러 타입으로 직접 제어
//!
//! Q: 재시도 정책은?
//! A: idempotent endpoint(GET, Idempotency-Key 있는 POST)만
//!    타임아웃 시 최대 2회 재시도. 그 외에는 즉시 반환하고
//!    reconciliation 경로가 해소함.

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::services::provider::{
    classify_transport_error, PayoutDetails, PayoutProvider, TransferReceipt, TransferStatus,
};
use crate::types::Money;

const API_BASE: &str = "https://api.stripe.com/v1";
const PROVIDER_ID: &str = "stripe";
const REQUEST_TIMEOUT_SECS: u64 = 15;
const MAX_RETRIES: u32 = 2;

/// hosted checkout 세션
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: String,
}

// ============ Response DTOs ============

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct CustomerResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PayoutResponse {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// Stripe payout status → lane 공통 상태
fn map_payout_status(status: &str) -> Result<TransferStatus, ApiError> {
    match status {
        "paid" => Ok(TransferStatus::Paid),
        "pending" | "in_transit" => Ok(TransferStatus::Pending),
        "failed" | "canceled" => Ok(TransferStatus::Failed),
        _ => Err(ApiError::ProviderUnknown(PROVIDER_ID.to_string())),
    }
}

/// checkout session 생성 파라미터 (form-encoded)
fn session_params(
    reference: &str,
    amount: Money,
    buyer_id: Uuid,
    frontend_url: &str,
) -> Vec<(String, String)> {
    vec![
        ("mode".to_string(), "payment".to_string()),
        (
            "success_url".to_string(),
            format!("{}/checkout/success?reference={}", frontend_url, reference),
        ),
        (
            "cancel_url".to_string(),
            format!("{}/checkout/cancel?reference={}", frontend_url, reference),
        ),
        ("client_reference_id".to_string(), reference.to_string()),
        (
            "line_items[0][price_data][currency]".to_string(),
            amount.currency().as_str().to_lowercase(),
        ),
        (
            "line_items[0][price_data][unit_amount]".to_string(),
            amount.minor().to_string(),
        ),
        (
            "line_items[0][price_data][product_data][name]".to_string(),
            "Avalanche cart".to_string(),
        ),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
        (
            "metadata[payment_reference]".to_string(),
            reference.to_string(),
        ),
        ("metadata[buyer_id]".to_string(), buyer_id.to_string()),
    ]
}

pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: String,
    frontend_url: String,
}

impl StripeGateway {
    pub fn new(secret_key: &str, frontend_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            client,
            secret_key: secret_key.to_string(),
            frontend_url: frontend_url.to_string(),
        }
    }

    /// form POST - idempotency key가 있으면 타임아웃 시 재시도
    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        params: &[(String, String)],
        idempotency_key: Option<&str>,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", API_BASE, path);
        let max_attempts = if idempotency_key.is_some() { 1 + MAX_RETRIES } else { 1 };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut request = self
                .client
                .post(&url)
                .bearer_auth(&self.secret_key)
                .form(params);
            if let Some(key) = idempotency_key {
                request = request.header("Idempotency-Key", key);
            }

            match request.send().await {
                Ok(response) => return Self::decode(response).await,
                Err(err) if err.is_timeout() && attempt < max_attempts => {
                    tracing::warn!(path, attempt, "stripe call timed out, retrying");
                    continue;
                }
                Err(err) => return Err(classify_transport_error(PROVIDER_ID, err)),
            }
        }
    }

    /// GET - idempotent이므로 타임아웃 시 재시도
    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, ApiError> {
        let url = format!("{}{}", API_BASE, path);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .client
                .get(&url)
                .bearer_auth(&self.secret_key)
                .send()
                .await
            {
                Ok(response) => return Self::decode(response).await,
                Err(err) if err.is_timeout() && attempt <= MAX_RETRIES => {
                    tracing::warn!(path, attempt, "stripe call timed out, retrying");
                    continue;
                }
                Err(err) => return Err(classify_transport_error(PROVIDER_ID, err)),
            }
        }
    }

    /// 응답 분류: 2xx → 파싱, 4xx/5xx → ProviderError, 파싱 불가 → ProviderUnknown
    async fn decode<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T, ApiError> {
        if response.status().is_success() {
            response
                .json::<T>()
                .await
                .map_err(|_| ApiError::ProviderUnknown(PROVIDER_ID.to_string()))
        } else {
            let code = match response.json::<ErrorEnvelope>().await {
                Ok(envelope) => envelope
                    .error
                    .code
                    .or(envelope.error.message)
                    .unwrap_or_else(|| "unknown".to_string()),
                Err(_) => "unknown".to_string(),
            };
            Err(ApiError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                code,
            })
        }
    }

    /// hosted checkout 세션 생성 (cart fan-out의 인바운드 결제)
    pub async fn create_checkout_session(
        &self,
        reference: &str,
        amount: Money,
        buyer_id: Uuid,
    ) -> Result<CheckoutSession, ApiError> {
        let params = session_params(reference, amount, buyer_id, &self.frontend_url);
        let session: SessionResponse = self
            .post_form("/checkout/sessions", &params, None)
            .await?;

        tracing::info!(reference, session_id = %session.id, "stripe checkout session created");
        Ok(CheckoutSession {
            session_id: session.id,
            url: session.url,
        })
    }
}

#[async_trait]
impl PayoutProvider for StripeGateway {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    /// customer 생성 + 은행/카드 source 연결 → customer id가 recipient 핸들
    async fn create_recipient(
        &self,
        details: &PayoutDetails,
        country_code: &str,
        currency: &str,
    ) -> Result<String, ApiError> {
        let customer: CustomerResponse = self
            .post_form(
                "/customers",
                &[(
                    "description".to_string(),
                    format!("avalanche payout {}", country_code),
                )],
                None,
            )
            .await?;

        let source_params = match details {
            PayoutDetails::Card { token, .. } => {
                vec![("source".to_string(), token.clone())]
            }
            PayoutDetails::Bank {
                country,
                account_number,
                account_holder,
                routing_number,
                ..
            } => {
                let mut params = vec![
                    ("source[object]".to_string(), "bank_account".to_string()),
                    ("source[country]".to_string(), country.clone()),
                    ("source[currency]".to_string(), currency.to_lowercase()),
                    ("source[account_number]".to_string(), account_number.clone()),
                    (
                        "source[account_holder_name]".to_string(),
                        account_holder.clone(),
                    ),
                ];
                if let Some(routing) = routing_number {
                    params.push(("source[routing_number]".to_string(), routing.clone()));
                }
                params
            }
        };

        let _: serde_json::Value = self
            .post_form(&format!("/customers/{}/sources", customer.id), &source_params, None)
            .await?;

        Ok(customer.id)
    }

    async fn initiate_transfer(
        &self,
        recipient: &str,
        amount: Money,
        idempotency_key: &str,
    ) -> Result<TransferReceipt, ApiError> {
        let params = vec![
            ("amount".to_string(), amount.minor().to_string()),
            (
                "currency".to_string(),
                amount.currency().as_str().to_lowercase(),
            ),
            ("destination".to_string(), recipient.to_string()),
            ("method".to_string(), "standard".to_string()),
        ];

        let payout: PayoutResponse = self
            .post_form("/payouts", &params, Some(idempotency_key))
            .await?;

        Ok(TransferReceipt {
            transfer_id: payout.id.clone(),
            status: map_payout_status(&payout.status)?,
        })
    }

    async fn verify_transfer(&self, transfer_id: &str) -> Result<TransferStatus, ApiError> {
        let payout: PayoutResponse = self.get(&format!("/payouts/{}", transfer_id)).await?;
        map_payout_status(&payout.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Currency;

    #[test]
    fn test_map_payout_status() {
        assert_eq!(map_payout_status("paid").unwrap(), TransferStatus::Paid);
        assert_eq!(map_payout_status("pending").unwrap(), TransferStatus::Pending);
        assert_eq!(map_payout_status("in_transit").unwrap(), TransferStatus::Pending);
        assert_eq!(map_payout_status("failed").unwrap(), TransferStatus::Failed);
        assert_eq!(map_payout_status("canceled").unwrap(), TransferStatus::Failed);
        assert!(map_payout_status("mystery").is_err());
    }

    #[test]
    fn test_session_params_carry_reference_and_amount() {
        let buyer = Uuid::new_v4();
        let params = session_params(
            "STRIPE-CART-20250101120000",
            Money::new(10_500, Currency::Usd),
            buyer,
            "https://app.example.com",
        );

        let get = |key: &str| {
            params
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
                .unwrap()
        };
        assert_eq!(get("client_reference_id"), "STRIPE-CART-20250101120000");
        assert_eq!(get("line_items[0][price_data][unit_amount]"), "10500");
        assert_eq!(get("line_items[0][price_data][currency]"), "usd");
        assert_eq!(get("metadata[buyer_id]"), buyer.to_string());
        assert!(get("success_url").contains("reference=STRIPE-CART-20250101120000"));
    }
}
