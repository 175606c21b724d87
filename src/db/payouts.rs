//! Payout Account / Withdrawal Queries
//!
//! 출금 행 선점은 조건부 UPDATE(`WHERE status IN ('pending','failed')`)로
//! 처리한다 - 디스패처 두 개가 같은 행을 집는 것을 DB 수준에서 차단함.

use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::{Database, PgTx, SellerPayoutAccount, WithdrawalRequest};

/// payout 계좌 등록/갱신 파라미터
#[derive(Debug, Clone)]
pub struct NewPayoutAccount {
    pub user_id: Uuid,
    pub method: String,
    pub bank_name: Option<String>,
    pub bank_code: Option<String>,
    pub last4: String,
    pub account_holder: Option<String>,
    pub country_code: String,
    pub provider: String,
    pub provider_recipient_id: Option<String>,
    pub is_verified: bool,
}

/// payout 계좌 upsert - 유저당 활성 계좌는 최대 1개
pub async fn upsert_payout_account(
    tx: &mut PgTx<'_>,
    account: &NewPayoutAccount,
) -> Result<Uuid, sqlx::Error> {
    let row: (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO seller_payout_accounts
            (id, user_id, method, bank_name, bank_code, last4, account_holder,
             country_code, provider, provider_recipient_id, is_verified,
             created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW(), NOW())
        ON CONFLICT (user_id)
        DO UPDATE SET
            method = EXCLUDED.method,
            bank_name = EXCLUDED.bank_name,
            bank_code = EXCLUDED.bank_code,
            last4 = EXCLUDED.last4,
            account_holder = EXCLUDED.account_holder,
            country_code = EXCLUDED.country_code,
            provider = EXCLUDED.provider,
            provider_recipient_id = EXCLUDED.provider_recipient_id,
            is_verified = EXCLUDED.is_verified,
            updated_at = NOW()
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(account.user_id)
    .bind(&account.method)
    .bind(&account.bank_name)
    .bind(&account.bank_code)
    .bind(&account.last4)
    .bind(&account.account_holder)
    .bind(&account.country_code)
    .bind(&account.provider)
    .bind(&account.provider_recipient_id)
    .bind(account.is_verified)
    .fetch_one(&mut **tx)
    .await?;
    Ok(row.0)
}

/// provider recipient 핸들 저장 (lazy 생성 경로)
pub async fn set_recipient_id(
    tx: &mut PgTx<'_>,
    account_id: Uuid,
    provider_recipient_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE seller_payout_accounts
        SET provider_recipient_id = $2, is_verified = TRUE, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(account_id)
    .bind(provider_recipient_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// 출금 요청 생성 (status = pending)
pub async fn insert_withdrawal(
    tx: &mut PgTx<'_>,
    wallet_id: Uuid,
    amount_minor: i64,
    currency: &str,
    payout_method: &str,
    payout_details: &JsonValue,
) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO withdrawal_requests
            (id, wallet_id, amount_minor, currency, status, payout_method,
             payout_details, created_at, updated_at)
        VALUES ($1, $2, $3, $4, 'pending', $5, $6, NOW(), NOW())
        "#,
    )
    .bind(id)
    .bind(wallet_id)
    .bind(amount_minor)
    .bind(currency)
    .bind(payout_method)
    .bind(payout_details)
    .execute(&mut **tx)
    .await?;
    Ok(id)
}

/// 출금 선점: pending/failed → processing 조건부 전이
///
/// 영향받은 행이 없으면 다른 디스패처가 이미 집었거나 terminal 상태.
pub async fn claim_withdrawal(
    tx: &mut PgTx<'_>,
    withdrawal_id: Uuid,
) -> Result<Option<WithdrawalRequest>, sqlx::Error> {
    sqlx::query_as::<_, WithdrawalRequest>(
        r#"
        UPDATE withdrawal_requests
        SET status = 'processing', updated_at = NOW()
        WHERE id = $1 AND status IN ('pending', 'failed')
        RETURNING id, wallet_id, amount_minor, currency, status, payout_method,
                  payout_details, provider_transfer_id, created_at, updated_at
        "#,
    )
    .bind(withdrawal_id)
    .fetch_optional(&mut **tx)
    .await
}

/// 출금 행 잠금 (reconciliation 경로)
pub async fn lock_withdrawal(
    tx: &mut PgTx<'_>,
    withdrawal_id: Uuid,
) -> Result<Option<WithdrawalRequest>, sqlx::Error> {
    sqlx::query_as::<_, WithdrawalRequest>(
        r#"
        SELECT id, wallet_id, amount_minor, currency, status, payout_method,
               payout_details, provider_transfer_id, created_at, updated_at
        FROM withdrawal_requests
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(withdrawal_id)
    .fetch_optional(&mut **tx)
    .await
}

/// 출금 상태 갱신 (transfer_id 포함 가능)
pub async fn set_withdrawal_status(
    tx: &mut PgTx<'_>,
    withdrawal_id: Uuid,
    status: &str,
    provider_transfer_id: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE withdrawal_requests
        SET status = $2,
            provider_transfer_id = COALESCE($3, provider_transfer_id),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(withdrawal_id)
    .bind(status)
    .bind(provider_transfer_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

impl Database {
    /// 유저의 payout 계좌 조회
    pub async fn get_payout_account(
        &self,
        user_id: Uuid,
    ) -> Result<Option<SellerPayoutAccount>, sqlx::Error> {
        sqlx::query_as::<_, SellerPayoutAccount>(
            r#"
            SELECT id, user_id, method, bank_name, bank_code, last4, account_holder,
                   country_code, provider, provider_recipient_id, is_verified,
                   created_at, updated_at
            FROM seller_payout_accounts
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await
    }

    /// 출금 요청 조회
    pub async fn get_withdrawal(
        &self,
        withdrawal_id: Uuid,
    ) -> Result<Option<WithdrawalRequest>, sqlx::Error> {
        sqlx::query_as::<_, WithdrawalRequest>(
            r#"
            SELECT id, wallet_id, amount_minor, currency, status, payout_method,
                   payout_details, provider_transfer_id, created_at, updated_at
            FROM withdrawal_requests
            WHERE id = $1
            "#,
        )
        .bind(withdrawal_id)
        .fetch_optional(self.pool())
        .await
    }
}
