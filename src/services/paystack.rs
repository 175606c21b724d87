//! Paystack Gateway
//!
//! 아프리카 은행 레일 payout lane (NG/GH/ZA/KE).
//!
//! Paystack 응답은 `{ status, message, data }` 봉투로 오며, 송금은
//! `reference`(우리의 idempotency key)로 dedup된다 - 같은 reference의
//! 재시도는 새 송금을 만들지 않음.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::services::provider::{
    classify_transport_error, PayoutDetails, PayoutProvider, TransferReceipt, TransferStatus,
};
use crate::types::Money;

const API_BASE: &str = "https://api.paystack.co";
const PROVIDER_ID: &str = "paystack";
const REQUEST_TIMEOUT_SECS: u64 = 15;
const MAX_RETRIES: u32 = 2;

// ============ Response DTOs ============

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct RecipientData {
    recipient_code: String,
}

#[derive(Debug, Deserialize)]
struct TransferData {
    transfer_code: String,
    status: String,
}

/// Paystack transfer status → lane 공통 상태
fn map_transfer_status(status: &str) -> Result<TransferStatus, ApiError> {
    match status {
        "success" => Ok(TransferStatus::Paid),
        "pending" | "queued" | "processing" | "otp" => Ok(TransferStatus::Pending),
        "failed" | "reversed" | "abandoned" => Ok(TransferStatus::Failed),
        _ => Err(ApiError::ProviderUnknown(PROVIDER_ID.to_string())),
    }
}

pub struct PaystackGateway {
    client: reqwest::Client,
    secret_key: String,
}

impl PaystackGateway {
    pub fn new(secret_key: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            client,
            secret_key: secret_key.to_string(),
        }
    }

    /// JSON POST - reference 기반 idempotent 호출은 타임아웃 시 재시도
    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &serde_json::Value,
        idempotent: bool,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", API_BASE, path);
        let max_attempts = if idempotent { 1 + MAX_RETRIES } else { 1 };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .client
                .post(&url)
                .bearer_auth(&self.secret_key)
                .json(body)
                .send()
                .await
            {
                Ok(response) => return Self::decode(response).await,
                Err(err) if err.is_timeout() && attempt < max_attempts => {
                    tracing::warn!(path, attempt, "paystack call timed out, retrying");
                    continue;
                }
                Err(err) => return Err(classify_transport_error(PROVIDER_ID, err)),
            }
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, ApiError> {
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
                    tracing::warn!(path, attempt, "paystack call timed out, retrying");
                    continue;
                }
                Err(err) => return Err(classify_transport_error(PROVIDER_ID, err)),
            }
        }
    }

    /// 봉투 해석: status=false 또는 data 없음 → ProviderError
    async fn decode<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T, ApiError> {
        let http_failed = !response.status().is_success();
        let envelope = response
            .json::<Envelope<T>>()
            .await
            .map_err(|_| ApiError::ProviderUnknown(PROVIDER_ID.to_string()))?;

        if http_failed || !envelope.status {
            return Err(ApiError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                code: envelope.message.unwrap_or_else(|| "unknown".to_string()),
            });
        }
        envelope
            .data
            .ok_or_else(|| ApiError::ProviderUnknown(PROVIDER_ID.to_string()))
    }
}

#[async_trait]
impl PayoutProvider for PaystackGateway {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    /// (country, currency, bank_code, account_number, account_name)
    /// → transfer recipient 핸들
    async fn create_recipient(
        &self,
        details: &PayoutDetails,
        _country_code: &str,
        currency: &str,
    ) -> Result<String, ApiError> {
        let (bank_code, account_number, account_holder) = match details {
            PayoutDetails::Bank {
                bank_code: Some(code),
                account_number,
                account_holder,
                ..
            } => (code, account_number, account_holder),
            _ => {
                return Err(ApiError::ValidationError(
                    "paystack recipients require a bank account with a bank code".to_string(),
                ))
            }
        };

        let body = json!({
            "type": "nuban",
            "name": account_holder,
            "account_number": account_number,
            "bank_code": bank_code,
            "currency": currency,
        });

        let data: RecipientData = self.post_json("/transferrecipient", &body, false).await?;
        Ok(data.recipient_code)
    }

    async fn initiate_transfer(
        &self,
        recipient: &str,
        amount: Money,
        idempotency_key: &str,
    ) -> Result<TransferReceipt, ApiError> {
        let body = json!({
            "source": "balance",
            "amount": amount.minor(),
            "currency": amount.currency().as_str(),
            "recipient": recipient,
            "reference": idempotency_key,
            "reason": "Avalanche wallet withdrawal",
        });

        let data: TransferData = self.post_json("/transfer", &body, true).await?;
        Ok(TransferReceipt {
            transfer_id: data.transfer_code.clone(),
            status: map_transfer_status(&data.status)?,
        })
    }

    async fn verify_transfer(&self, transfer_id: &str) -> Result<TransferStatus, ApiError> {
        let data: TransferData = self.get_json(&format!("/transfer/{}", transfer_id)).await?;
        map_transfer_status(&data.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_transfer_status() {
        assert_eq!(map_transfer_status("success").unwrap(), TransferStatus::Paid);
        assert_eq!(map_transfer_status("pending").unwrap(), TransferStatus::Pending);
        assert_eq!(map_transfer_status("otp").unwrap(), TransferStatus::Pending);
        assert_eq!(map_transfer_status("failed").unwrap(), TransferStatus::Failed);
        assert_eq!(map_transfer_status("reversed").unwrap(), TransferStatus::Failed);
        assert!(map_transfer_status("???").is_err());
    }

    #[test]
    fn test_envelope_decodes_data() {
        let raw = r#"{"status":true,"message":"Transfer queued","data":{"transfer_code":"TRF_1","status":"pending"}}"#;
        let envelope: Envelope<TransferData> = serde_json::from_str(raw).unwrap();
        assert!(envelope.status);
        assert_eq!(envelope.data.unwrap().transfer_code, "TRF_1");
    }
}
