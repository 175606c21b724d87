//! Wallet Queries
//!
//! 지갑 행과 원장 엔트리에 대한 쿼리.
//!
//! 잔액을 바꾸는 헬퍼는 전부 `&mut PgTx`를 받는다 - 원장 엔트리 없이
//! 잔액만 바뀌거나 그 반대가 되는 경로를 타입 수준에서 차단하기 위해
//! 잔액 변경/엔트리 추가는 서비스 레이어(`services::wallet`)만 호출함.

use sqlx::Row;
use uuid::Uuid;

use super::{Database, PgTx, Wallet, WalletTransaction};

/// 지갑 행 잠금 (row-level lock)
///
/// credit/debit은 반드시 이 잠금을 먼저 잡는다 → 원장 순서 == 잔액 변경 순서
pub async fn lock_by_id(tx: &mut PgTx<'_>, wallet_id: Uuid) -> Result<Option<Wallet>, sqlx::Error> {
    sqlx::query_as::<_, Wallet>(
        r#"
        SELECT id, user_id, balance_minor, currency, updated_at
        FROM wallets
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(wallet_id)
    .fetch_optional(&mut **tx)
    .await
}

/// 유저의 지갑을 잠금 상태로 가져옴; 없으면 생성 (lazy creation)
///
/// INSERT ... ON CONFLICT DO NOTHING 후 FOR UPDATE 재조회 -
/// 동시 첫-거래 두 건이 와도 지갑은 하나만 생긴다.
pub async fn ensure_for_user(
    tx: &mut PgTx<'_>,
    user_id: Uuid,
    currency: &str,
) -> Result<Wallet, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO wallets (id, user_id, balance_minor, currency, updated_at)
        VALUES ($1, $2, 0, $3, NOW())
        ON CONFLICT (user_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(currency)
    .execute(&mut **tx)
    .await?;

    sqlx::query_as::<_, Wallet>(
        r#"
        SELECT id, user_id, balance_minor, currency, updated_at
        FROM wallets
        WHERE user_id = $1
        FOR UPDATE
        "#,
    )
    .bind(user_id)
    .fetch_one(&mut **tx)
    .await
}

/// 잔액 갱신 (잠금을 잡은 트랜잭션 안에서만 호출)
pub async fn set_balance(
    tx: &mut PgTx<'_>,
    wallet_id: Uuid,
    balance_minor: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE wallets
        SET balance_minor = $2, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(wallet_id)
    .bind(balance_minor)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// 원장 엔트리 추가 (append-only - UPDATE/DELETE 쿼리는 존재하지 않음)
#[allow(clippy::too_many_arguments)]
pub async fn append_entry(
    tx: &mut PgTx<'_>,
    wallet_id: Uuid,
    kind: &str,
    amount_minor: i64,
    currency: &str,
    description: &str,
    related_order_id: Option<Uuid>,
    related_project_id: Option<Uuid>,
) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO wallet_transactions
            (id, wallet_id, kind, amount_minor, currency, description,
             related_order_id, related_project_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
        "#,
    )
    .bind(id)
    .bind(wallet_id)
    .bind(kind)
    .bind(amount_minor)
    .bind(currency)
    .bind(description)
    .bind(related_order_id)
    .bind(related_project_id)
    .execute(&mut **tx)
    .await?;
    Ok(id)
}

impl Database {
    /// 지갑 조회 (id)
    pub async fn get_wallet(&self, wallet_id: Uuid) -> Result<Option<Wallet>, sqlx::Error> {
        sqlx::query_as::<_, Wallet>(
            r#"
            SELECT id, user_id, balance_minor, currency, updated_at
            FROM wallets
            WHERE id = $1
            "#,
        )
        .bind(wallet_id)
        .fetch_optional(self.pool())
        .await
    }

    /// 유저의 지갑 조회 (없으면 None - 아직 거래가 없는 유저)
    pub async fn get_wallet_by_user(&self, user_id: Uuid) -> Result<Option<Wallet>, sqlx::Error> {
        sqlx::query_as::<_, Wallet>(
            r#"
            SELECT id, user_id, balance_minor, currency, updated_at
            FROM wallets
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await
    }

    /// 원장 히스토리 조회 (최신순, 페이지네이션)
    pub async fn get_wallet_history(
        &self,
        wallet_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<(Vec<WalletTransaction>, i64), sqlx::Error> {
        let offset = page * limit;

        let entries = sqlx::query_as::<_, WalletTransaction>(
            r#"
            SELECT id, wallet_id, kind, amount_minor, currency, description,
                   related_order_id, related_project_id, created_at
            FROM wallet_transactions
            WHERE wallet_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(wallet_id)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(self.pool())
        .await?;

        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM wallet_transactions WHERE wallet_id = $1")
                .bind(wallet_id)
                .fetch_one(self.pool())
                .await?;

        Ok((entries, count.0))
    }

    /// 원장 합계로 잔액 재계산 (검증/리컨실리에이션용)
    ///
    /// 불변식 W2: balance == Σcredit − Σdebit
    pub async fn recompute_balance(&self, wallet_id: Uuid) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(CASE WHEN kind = 'credit' THEN amount_minor
                                     ELSE -amount_minor END), 0) AS balance
            FROM wallet_transactions
            WHERE wallet_id = $1
            "#,
        )
        .bind(wallet_id)
        .fetch_one(self.pool())
        .await?;

        row.try_get::<i64, _>("balance")
    }
}
