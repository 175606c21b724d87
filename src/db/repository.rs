//! Repository Pattern Implementation
//!
//! # Interview Q&A
//!
//! Q: Repository 패턴이란?
//! A: 데이터 접근 로직을 추상화하는 패턴
//!
//!    장점:
//!    - 비즈니스 로직과 데이터 접근 분리
//!    - 테스트 시 Mock 구현 쉬움
//!    - DB 교체 시 영향 최소화
//!
//! Q: 현재 코드에서 전면적인 Repository 추상화를 쓰지 않은 이유는?
//! A: 오버엔지니어링 방지 - 단일 DB(PostgreSQL)만 사용하고
//!    트랜잭션 경계가 서비스 레이어에 있어 직접 쿼리가 명확함.
//!    단, 원장(C2)은 불변식 검증 테스트가 필요해서 trait로 분리:
//!    credit/debit 계약과 W1/W2 불변식을 in-memory mock으로 검증함.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ApiError;
use crate::types::Money;

/// 원장 엔트리 (trait 수준의 최소 표현)
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub kind: super::TxKind,
    pub amount: Money,
    pub description: String,
}

/// 지갑 원장 계약
///
/// - credit: 엔트리 추가 + 잔액 증가, 퇴화 입력이 아니면 실패하지 않음
/// - debit: 엔트리 추가 + 잔액 감소, 잔액 부족 시 InsufficientFunds
/// - 엔트리는 append-only - 수정/삭제 연산은 계약에 없음
#[async_trait]
pub trait WalletLedger: Send + Sync {
    async fn balance(&self, user_id: Uuid) -> Result<Option<Money>, ApiError>;
    async fn credit(&self, user_id: Uuid, amount: Money, description: &str)
        -> Result<Money, ApiError>;
    async fn debit(&self, user_id: Uuid, amount: Money, description: &str)
        -> Result<Money, ApiError>;
    async fn entries(&self, user_id: Uuid) -> Result<Vec<LedgerEntry>, ApiError>;
}

// PostgreSQL 구현은 services::wallet이 트랜잭션 경계와 함께 제공함.
// 테스트용 Mock 구현:

#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::db::TxKind;
    use std::collections::HashMap;
    use std::sync::RwLock;

    #[derive(Default)]
    struct MockWallet {
        balance: Option<Money>,
        entries: Vec<LedgerEntry>,
    }

    #[derive(Default)]
    pub struct MockWalletLedger {
        wallets: RwLock<HashMap<Uuid, MockWallet>>,
    }

    impl MockWalletLedger {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl WalletLedger for MockWalletLedger {
        async fn balance(&self, user_id: Uuid) -> Result<Option<Money>, ApiError> {
            let wallets = self.wallets.read().unwrap();
            Ok(wallets.get(&user_id).and_then(|w| w.balance))
        }

        async fn credit(
            &self,
            user_id: Uuid,
            amount: Money,
            description: &str,
        ) -> Result<Money, ApiError> {
            let mut wallets = self.wallets.write().unwrap();
            let wallet = wallets.entry(user_id).or_default();
            let balance = match wallet.balance {
                Some(b) => b.checked_add(amount)?,
                None => amount,
            };
            wallet.balance = Some(balance);
            wallet.entries.push(LedgerEntry {
                kind: TxKind::Credit,
                amount,
                description: description.to_string(),
            });
            Ok(balance)
        }

        async fn debit(
            &self,
            user_id: Uuid,
            amount: Money,
            description: &str,
        ) -> Result<Money, ApiError> {
            let mut wallets = self.wallets.write().unwrap();
            let wallet = wallets.entry(user_id).or_default();
            let current = wallet.balance.unwrap_or(Money::zero(amount.currency()));
            // NegativeResult → InsufficientFunds
            let balance = current.checked_sub(amount)?;
            wallet.balance = Some(balance);
            wallet.entries.push(LedgerEntry {
                kind: TxKind::Debit,
                amount,
                description: description.to_string(),
            });
            Ok(balance)
        }

        async fn entries(&self, user_id: Uuid) -> Result<Vec<LedgerEntry>, ApiError> {
            let wallets = self.wallets.read().unwrap();
            Ok(wallets
                .get(&user_id)
                .map(|w| w.entries.clone())
                .unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockWalletLedger;
    use super::*;
    use crate::db::TxKind;
    use crate::types::Currency;

    fn usd(minor: i64) -> Money {
        Money::new(minor, Currency::Usd)
    }

    /// 불변식 W2: balance == Σcredit − Σdebit
    async fn assert_ledger_invariant(ledger: &MockWalletLedger, user: Uuid) {
        let entries = ledger.entries(user).await.unwrap();
        let sum: i64 = entries
            .iter()
            .map(|e| match e.kind {
                TxKind::Credit => e.amount.minor(),
                TxKind::Debit => -e.amount.minor(),
            })
            .sum();
        let balance = ledger.balance(user).await.unwrap().unwrap();
        assert_eq!(balance.minor(), sum);
        // 불변식 W1
        assert!(balance.minor() >= 0);
    }

    #[tokio::test]
    async fn test_credit_then_debit() {
        let ledger = MockWalletLedger::new();
        let user = Uuid::new_v4();

        ledger.credit(user, usd(10_000), "escrow release").await.unwrap();
        let after = ledger.debit(user, usd(4_000), "withdrawal").await.unwrap();
        assert_eq!(after.minor(), 6_000);

        assert_ledger_invariant(&ledger, user).await;
    }

    #[tokio::test]
    async fn test_debit_insufficient_funds() {
        let ledger = MockWalletLedger::new();
        let user = Uuid::new_v4();

        ledger.credit(user, usd(50), "seed").await.unwrap();
        let err = ledger.debit(user, usd(100), "withdrawal").await.unwrap_err();
        assert!(matches!(err, ApiError::InsufficientFunds));

        // 실패한 debit은 엔트리를 남기지 않음
        assert_eq!(ledger.entries(user).await.unwrap().len(), 1);
        assert_ledger_invariant(&ledger, user).await;
    }

    #[tokio::test]
    async fn test_debit_to_exactly_zero() {
        let ledger = MockWalletLedger::new();
        let user = Uuid::new_v4();

        ledger.credit(user, usd(15_000), "project payment").await.unwrap();
        let after = ledger.debit(user, usd(15_000), "withdrawal").await.unwrap();
        assert_eq!(after.minor(), 0);

        assert_ledger_invariant(&ledger, user).await;
    }

    #[tokio::test]
    async fn test_lazy_wallet_has_no_balance() {
        let ledger = MockWalletLedger::new();
        let user = Uuid::new_v4();
        assert!(ledger.balance(user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_interleaved_history_sums() {
        let ledger = MockWalletLedger::new();
        let user = Uuid::new_v4();

        ledger.credit(user, usd(10_000), "order 1").await.unwrap();
        ledger.credit(user, usd(2_500), "order 2").await.unwrap();
        ledger.debit(user, usd(3_000), "withdrawal").await.unwrap();
        ledger.credit(user, usd(500), "order 3").await.unwrap();
        ledger.debit(user, usd(10_000), "withdrawal").await.unwrap();

        let balance = ledger.balance(user).await.unwrap().unwrap();
        assert_eq!(balance.minor(), 0);
        assert_ledger_invariant(&ledger, user).await;
    }
}
