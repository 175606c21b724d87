//! Money Types & Fee Policy
//!
//! # Interview Q&A
//!
//! Q: 왜 금액을 정수 minor unit으로 표현하는가?
//! A: 부동소수점 오차 방지
//!
//!    ```text
//!    0.1 + 0.2 == 0.30000000000000004  // f64
//!    10 + 20   == 30                   // minor units (cents)
//!    ```
//!
//!    - 에스크로/정산 금액은 1 cent도 틀리면 안 됨
//!    - DB에는 BIGINT로 저장 (USD cents, NGN kobo)
//!    - Stripe/Paystack API도 minor unit 정수를 받음
//!
//! Q: 수수료 반올림은 왜 banker's rounding인가?
//! A: half-to-even은 대량 거래에서 누적 편향이 없음
//!    - 항상 올림/내림하면 플랫폼 또는 구매자 쪽으로 치우침
//!    - IEEE 754 기본 반올림과 동일한 규칙

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 서비스 수수료: item cost의 5.00% (basis points)
pub const SERVICE_FEE_BPS: u32 = 500;

/// 통화별 최소 출금액 (minor units)
///
/// Stripe/Paystack 공통으로 100 minor unit ($1.00, ₦1.00) 미만은 거절
pub const MIN_WITHDRAWAL_MINOR: i64 = 100;

/// 지원 통화 (ISO-4217)
///
/// 전부 minor unit factor 100 (cent, kobo, pesewa...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Cad,
    Ngn,
    Ghs,
    Zar,
    Kes,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Cad => "CAD",
            Currency::Ngn => "NGN",
            Currency::Ghs => "GHS",
            Currency::Zar => "ZAR",
            Currency::Kes => "KES",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "USD" => Some(Currency::Usd),
            "EUR" => Some(Currency::Eur),
            "GBP" => Some(Currency::Gbp),
            "CAD" => Some(Currency::Cad),
            "NGN" => Some(Currency::Ngn),
            "GHS" => Some(Currency::Ghs),
            "ZAR" => Some(Currency::Zar),
            "KES" => Some(Currency::Kes),
            _ => None,
        }
    }

    /// 국가 코드 → 현지 통화
    pub fn for_country(country_code: &str) -> Option<Self> {
        match country_code.to_uppercase().as_str() {
            "US" => Some(Currency::Usd),
            "EU" => Some(Currency::Eur),
            "GB" => Some(Currency::Gbp),
            "CA" => Some(Currency::Cad),
            "NG" => Some(Currency::Ngn),
            "GH" => Some(Currency::Ghs),
            "ZA" => Some(Currency::Zar),
            "KE" => Some(Currency::Kes),
            _ => None,
        }
    }
}

/// 금액 연산 에러
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("currency mismatch")]
    CurrencyMismatch,
    #[error("operation would produce a negative amount")]
    NegativeResult,
    #[error("amount overflow")]
    Overflow,
}

/// 금액 = (minor unit 정수, 통화)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    minor: i64,
    currency: Currency,
}

impl Money {
    pub fn new(minor: i64, currency: Currency) -> Self {
        Self { minor, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self { minor: 0, currency }
    }

    /// Provider API가 기대하는 정수 금액 (전 lane 공통 factor 100)
    pub fn minor(&self) -> i64 {
        self.minor
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.minor == 0
    }

    pub fn checked_add(self, other: Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch);
        }
        let minor = self
            .minor
            .checked_add(other.minor)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money { minor, currency: self.currency })
    }

    /// 지갑 연산용 차감: 음수 결과는 거부
    pub fn checked_sub(self, other: Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch);
        }
        let minor = self.minor - other.minor;
        if minor < 0 {
            return Err(MoneyError::NegativeResult);
        }
        Ok(Money { minor, currency: self.currency })
    }

    /// basis point 비율 곱 (banker's rounding, half-to-even)
    ///
    /// 10_000 bps = 100%. 금액이 음수가 아닌 경우만 사용.
    pub fn multiply_bps(self, bps: u32) -> Money {
        let product = self.minor as i128 * bps as i128;
        let quotient = product / 10_000;
        let remainder = product % 10_000;

        let rounded = match remainder.cmp(&5_000) {
            std::cmp::Ordering::Less => quotient,
            std::cmp::Ordering::Greater => quotient + 1,
            // 정확히 절반이면 짝수 쪽으로
            std::cmp::Ordering::Equal => {
                if quotient % 2 == 0 {
                    quotient
                } else {
                    quotient + 1
                }
            }
        };

        Money {
            minor: rounded as i64,
            currency: self.currency,
        }
    }

    /// 서비스 수수료 (5%)
    ///
    /// 구매자가 부담하며 에스크로에는 포함되지 않음
    pub fn service_fee(self) -> Money {
        self.multiply_bps(SERVICE_FEE_BPS)
    }

    /// 사람이 읽는 형태 ("105.00 USD")
    pub fn to_display(&self) -> String {
        format!(
            "{}.{:02} {}",
            self.minor / 100,
            (self.minor % 100).abs(),
            self.currency.as_str()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_same_currency() {
        let a = Money::new(10_000, Currency::Usd);
        let b = Money::new(500, Currency::Usd);
        assert_eq!(a.checked_add(b).unwrap().minor(), 10_500);
    }

    #[test]
    fn test_add_currency_mismatch() {
        let a = Money::new(100, Currency::Usd);
        let b = Money::new(100, Currency::Ngn);
        assert_eq!(a.checked_add(b), Err(MoneyError::CurrencyMismatch));
    }

    #[test]
    fn test_sub_negative_result() {
        let a = Money::new(50, Currency::Usd);
        let b = Money::new(100, Currency::Usd);
        assert_eq!(a.checked_sub(b), Err(MoneyError::NegativeResult));
    }

    #[test]
    fn test_sub_to_exactly_zero() {
        let a = Money::new(100, Currency::Usd);
        let b = Money::new(100, Currency::Usd);
        assert_eq!(a.checked_sub(b).unwrap().minor(), 0);
    }

    #[test]
    fn test_service_fee_exact() {
        // $100.00 → $5.00
        let fee = Money::new(10_000, Currency::Usd).service_fee();
        assert_eq!(fee.minor(), 500);
    }

    #[test]
    fn test_service_fee_rounds_half_to_even() {
        // 5% of 10 = 0.5 → 짝수 0으로 내림
        assert_eq!(Money::new(10, Currency::Usd).service_fee().minor(), 0);
        // 5% of 30 = 1.5 → 짝수 2로 올림
        assert_eq!(Money::new(30, Currency::Usd).service_fee().minor(), 2);
        // 5% of 50 = 2.5 → 짝수 2로 내림
        assert_eq!(Money::new(50, Currency::Usd).service_fee().minor(), 2);
        // 5% of 70 = 3.5 → 짝수 4로 올림
        assert_eq!(Money::new(70, Currency::Usd).service_fee().minor(), 4);
    }

    #[test]
    fn test_service_fee_non_tie() {
        // 5% of 1234 = 61.7 → 62
        assert_eq!(Money::new(1_234, Currency::Usd).service_fee().minor(), 62);
        // 5% of 1221 = 61.05 → 61
        assert_eq!(Money::new(1_221, Currency::Usd).service_fee().minor(), 61);
    }

    #[test]
    fn test_currency_for_country() {
        assert_eq!(Currency::for_country("NG"), Some(Currency::Ngn));
        assert_eq!(Currency::for_country("us"), Some(Currency::Usd));
        assert_eq!(Currency::for_country("JP"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::new(10_500, Currency::Usd).to_display(), "105.00 USD");
        assert_eq!(Money::new(7, Currency::Ngn).to_display(), "0.07 NGN");
    }
}
