//! Wallet Ledger Service (C2)
//!
//! # Interview Q&A
//!
//! Q: credit/debit이 왜 `&mut PgTx`를 받는가?
//! A: 원장 엔트리와 잔액 변경은 호출자의 트랜잭션 경계 안에서
//!    원자적으로 커밋되어야 함
//!
//!    - 에스크로 해제 = 에스크로 상태 + 주문 상태 + 지갑 credit이 한 단위
//!    - 엔트리만 쓰이고 잔액이 안 바뀌는 경로(또는 반대)는 존재하지 않음
//!    - 시그니처가 트랜잭션을 강제하므로 실수로 pool에 직접 쓸 수 없음
//!
//! Q: 동시 credit 두 건의 순서는?
//! A: 지갑 행의 row-level lock이 직렬화함
//!    - lock 획득 순서 == 잔액 변경 순서 == 엔트리 삽입 순서

use uuid::Uuid;

use crate::db::{self, PgTx, Wallet};
use crate::error::ApiError;
use crate::types::{Currency, Money};

/// 원장 기록의 대상 - 주문 또는 프로젝트 back-reference
#[derive(Debug, Clone, Copy, Default)]
pub struct LedgerRef {
    pub order_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
}

impl LedgerRef {
    pub fn order(order_id: Uuid) -> Self {
        Self {
            order_id: Some(order_id),
            project_id: None,
        }
    }

    pub fn project(project_id: Uuid) -> Self {
        Self {
            order_id: None,
            project_id: Some(project_id),
        }
    }
}

fn validate_amount(amount: Money) -> Result<(), ApiError> {
    if amount.minor() <= 0 {
        return Err(ApiError::ValidationError(
            "ledger amounts must be positive".to_string(),
        ));
    }
    Ok(())
}

/// 유저 지갑에 credit - 지갑이 없으면 lazy 생성
///
/// 퇴화 입력(0 이하)이 아니면 실패하지 않음.
pub async fn credit_user(
    tx: &mut PgTx<'_>,
    user_id: Uuid,
    amount: Money,
    description: &str,
    related: LedgerRef,
) -> Result<Wallet, ApiError> {
    validate_amount(amount)?;

    let wallet = db::wallets::ensure_for_user(tx, user_id, amount.currency().as_str()).await?;
    apply(tx, wallet, amount, db::TxKind::Credit, description, related).await
}

/// 유저 지갑에서 debit
///
/// 잔액 부족 시 InsufficientFunds - 엔트리도 잔액 변경도 일어나지 않음.
pub async fn debit_user(
    tx: &mut PgTx<'_>,
    user_id: Uuid,
    amount: Money,
    description: &str,
    related: LedgerRef,
) -> Result<Wallet, ApiError> {
    validate_amount(amount)?;

    let wallet = db::wallets::ensure_for_user(tx, user_id, amount.currency().as_str()).await?;
    apply(tx, wallet, amount, db::TxKind::Debit, description, related).await
}

/// wallet_id로 직접 credit (출금 보상 트랜잭션 경로)
pub async fn credit_wallet(
    tx: &mut PgTx<'_>,
    wallet_id: Uuid,
    amount: Money,
    description: &str,
    related: LedgerRef,
) -> Result<Wallet, ApiError> {
    validate_amount(amount)?;

    let wallet = db::wallets::lock_by_id(tx, wallet_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("wallet".to_string()))?;
    apply(tx, wallet, amount, db::TxKind::Credit, description, related).await
}

/// wallet_id로 직접 debit (출금 디스패치 경로)
pub async fn debit_wallet(
    tx: &mut PgTx<'_>,
    wallet_id: Uuid,
    amount: Money,
    description: &str,
    related: LedgerRef,
) -> Result<Wallet, ApiError> {
    validate_amount(amount)?;

    let wallet = db::wallets::lock_by_id(tx, wallet_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("wallet".to_string()))?;
    apply(tx, wallet, amount, db::TxKind::Debit, description, related).await
}

/// 잠긴 지갑 행에 원장 연산 적용
async fn apply(
    tx: &mut PgTx<'_>,
    wallet: Wallet,
    amount: Money,
    kind: db::TxKind,
    description: &str,
    related: LedgerRef,
) -> Result<Wallet, ApiError> {
    let currency =
        Currency::parse(&wallet.currency).ok_or_else(|| {
            ApiError::DatabaseError(format!("wallet {} has unknown currency", wallet.id))
        })?;
    let balance = Money::new(wallet.balance_minor, currency);

    let new_balance = match kind {
        db::TxKind::Credit => balance.checked_add(amount)?,
        // NegativeResult → InsufficientFunds (From<MoneyError>)
        db::TxKind::Debit => balance.checked_sub(amount)?,
    };

    db::wallets::set_balance(tx, wallet.id, new_balance.minor()).await?;
    db::wallets::append_entry(
        tx,
        wallet.id,
        kind.as_str(),
        amount.minor(),
        amount.currency().as_str(),
        description,
        related.order_id,
        related.project_id,
    )
    .await?;

    tracing::debug!(
        wallet_id = %wallet.id,
        kind = kind.as_str(),
        amount = %amount.to_display(),
        balance = new_balance.minor(),
        "ledger entry appended"
    );

    Ok(Wallet {
        balance_minor: new_balance.minor(),
        ..wallet
    })
}
