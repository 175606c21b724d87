//! Payout Provider Lanes (C6 routing)
//!
//! # Interview Q&A
//!
//! Q: provider 연동이 여러 개인데 왜 trait 하나로 묶는가?
//! A: 복붙된 provider별 코드 대신 공통 capability 집합을 정의
//!    - create_recipient / initiate_transfer / verify_transfer
//!    - 디스패처는 country_code로 lane을 고르고 trait만 호출
//!    - lane 추가 = trait 구현 하나 + 라우팅 테이블 한 줄
//!
//! Q: idempotency key는 왜 결정적인가?
//! A: `WD_<withdrawal_id>_<user_id>` - 재시도가 같은 key를 만들어
//!    provider 쪽에서 중복 송금이 제거됨. 타임아웃 후 재호출해도
//!    transfer는 한 건만 생긴다.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::types::Money;

/// 출금 목적지 - 태그된 variant (ad-hoc dict 페이로드 대체)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PayoutDetails {
    Card {
        /// provider가 발급한 카드 토큰
        token: String,
        last4: String,
    },
    Bank {
        country: String,
        bank_name: Option<String>,
        /// 은행 식별 코드 (Paystack bank code, legacy 계좌는 없음)
        bank_code: Option<String>,
        account_number: String,
        account_holder: String,
        /// 미국 ACH routing number
        routing_number: Option<String>,
    },
}

impl PayoutDetails {
    /// 마스킹된 끝 4자리 (원장 description용)
    pub fn last4(&self) -> String {
        match self {
            PayoutDetails::Card { last4, .. } => last4.clone(),
            PayoutDetails::Bank { account_number, .. } => {
                let digits = account_number.trim();
                if digits.len() >= 4 {
                    digits[digits.len() - 4..].to_string()
                } else {
                    digits.to_string()
                }
            }
        }
    }

    pub fn bank_name(&self) -> Option<&str> {
        match self {
            PayoutDetails::Card { .. } => None,
            PayoutDetails::Bank { bank_name, .. } => bank_name.as_deref(),
        }
    }
}

/// payout lane - country_code 기반 라우팅 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    /// 카드/ACH 레일 (US, EU, GB, CA)
    Stripe,
    /// 아프리카 은행 레일 (NG, GH, ZA, KE)
    Paystack,
    /// NG legacy - 전자 전송 불가, 오퍼레이터가 수동 처리
    Manual,
}

impl Lane {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lane::Stripe => "stripe",
            Lane::Paystack => "paystack",
            Lane::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stripe" => Some(Lane::Stripe),
            "paystack" => Some(Lane::Paystack),
            "manual" => Some(Lane::Manual),
            _ => None,
        }
    }
}

/// country_code → lane 선택
///
/// NG는 Paystack bank code가 해석되는 계좌만 lane A(Paystack)로,
/// legacy 계좌(bank code 없음)는 lane B(manual)로 보냄.
/// 테이블 밖의 국가는 지원하지 않음.
pub fn select_lane(country_code: &str, details: &PayoutDetails) -> Result<Lane, ApiError> {
    match country_code.to_uppercase().as_str() {
        "US" | "EU" | "GB" | "CA" => Ok(Lane::Stripe),
        "NG" => match details {
            PayoutDetails::Bank { bank_code: Some(_), .. } => Ok(Lane::Paystack),
            _ => Ok(Lane::Manual),
        },
        "GH" | "ZA" | "KE" => match details {
            PayoutDetails::Bank { bank_code: Some(_), .. } => Ok(Lane::Paystack),
            _ => Err(ApiError::ValidationError(
                "a bank code is required for this country".to_string(),
            )),
        },
        other => Err(ApiError::ValidationError(format!(
            "unsupported payout country: {}",
            other
        ))),
    }
}

/// 출금 idempotency key: WD_<withdrawal_id>_<user_id>
pub fn withdrawal_idempotency_key(withdrawal_id: Uuid, user_id: Uuid) -> String {
    format!("WD_{}_{}", withdrawal_id, user_id)
}

/// provider transfer의 terminal/비terminal 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Pending,
    Paid,
    Failed,
}

/// initiate_transfer 결과
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub transfer_id: String,
    pub status: TransferStatus,
}

/// payout lane의 공통 capability 집합
///
/// 타임아웃으로 transfer id를 받지 못한 경우 reconciliation은
/// 같은 idempotency key로 initiate_transfer를 재호출한다 -
/// provider가 dedup하므로 송금은 한 건만 생기고 id를 회수할 수 있음.
#[async_trait]
pub trait PayoutProvider: Send + Sync {
    /// lane 식별자 (에러 보고용)
    fn id(&self) -> &'static str;

    /// 계좌 상세 → provider 쪽 recipient 핸들
    async fn create_recipient(
        &self,
        details: &PayoutDetails,
        country_code: &str,
        currency: &str,
    ) -> Result<String, ApiError>;

    /// 송금 개시 - 같은 idempotency key의 재시도는 같은 transfer를 반환
    async fn initiate_transfer(
        &self,
        recipient: &str,
        amount: Money,
        idempotency_key: &str,
    ) -> Result<TransferReceipt, ApiError>;

    /// 송금 상태 조회 (reconciliation 경로)
    async fn verify_transfer(&self, transfer_id: &str) -> Result<TransferStatus, ApiError>;
}

/// lane → 구현체 셀렉터
///
/// Manual lane은 provider 호출이 없으므로 None.
pub struct ProviderRegistry {
    pub stripe: std::sync::Arc<crate::services::stripe::StripeGateway>,
    pub paystack: std::sync::Arc<crate::services::paystack::PaystackGateway>,
}

impl ProviderRegistry {
    pub fn select(&self, lane: Lane) -> Option<&dyn PayoutProvider> {
        match lane {
            Lane::Stripe => Some(self.stripe.as_ref()),
            Lane::Paystack => Some(self.paystack.as_ref()),
            Lane::Manual => None,
        }
    }
}

/// reqwest 에러 분류
///
/// - 타임아웃 → ProviderTimeout (결과 불명, reconciliation 대상)
/// - 그 외 전송 실패 → ProviderUnknown
pub(crate) fn classify_transport_error(provider: &'static str, err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::ProviderTimeout(provider.to_string())
    } else {
        tracing::error!(provider, error = %err, "provider transport failure");
        ApiError::ProviderUnknown(provider.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank(country: &str, bank_code: Option<&str>) -> PayoutDetails {
        PayoutDetails::Bank {
            country: country.to_string(),
            bank_name: Some("Test Bank".to_string()),
            bank_code: bank_code.map(|s| s.to_string()),
            account_number: "0123456789".to_string(),
            account_holder: "Ada".to_string(),
            routing_number: None,
        }
    }

    #[test]
    fn test_card_ach_countries_route_to_stripe() {
        for country in ["US", "EU", "GB", "CA"] {
            assert_eq!(select_lane(country, &bank(country, None)).unwrap(), Lane::Stripe);
        }
    }

    #[test]
    fn test_african_countries_route_to_paystack() {
        for country in ["NG", "GH", "ZA", "KE"] {
            assert_eq!(
                select_lane(country, &bank(country, Some("058"))).unwrap(),
                Lane::Paystack
            );
        }
    }

    #[test]
    fn test_ng_legacy_routes_to_manual() {
        // bank code가 해석되지 않는 NG 계좌는 수동 lane
        assert_eq!(select_lane("NG", &bank("NG", None)).unwrap(), Lane::Manual);
    }

    #[test]
    fn test_unsupported_country_rejected() {
        assert!(select_lane("JP", &bank("JP", Some("001"))).is_err());
    }

    #[test]
    fn test_lane_is_case_insensitive_on_country() {
        assert_eq!(select_lane("us", &bank("US", None)).unwrap(), Lane::Stripe);
        assert_eq!(select_lane("ng", &bank("NG", Some("058"))).unwrap(), Lane::Paystack);
    }

    #[test]
    fn test_idempotency_key_format() {
        let wid = Uuid::new_v4();
        let uid = Uuid::new_v4();
        let key = withdrawal_idempotency_key(wid, uid);
        assert_eq!(key, format!("WD_{}_{}", wid, uid));
        // 같은 입력은 항상 같은 key - 재시도 dedup의 전제
        assert_eq!(key, withdrawal_idempotency_key(wid, uid));
    }

    #[test]
    fn test_payout_details_last4() {
        assert_eq!(bank("NG", None).last4(), "6789");
        let card = PayoutDetails::Card {
            token: "tok_visa".to_string(),
            last4: "4242".to_string(),
        };
        assert_eq!(card.last4(), "4242");
    }

    #[test]
    fn test_payout_details_serde_round_trip() {
        let details = bank("NG", Some("058"));
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["type"], "bank");
        let back: PayoutDetails = serde_json::from_value(json).unwrap();
        assert_eq!(back.last4(), "6789");
    }
}
