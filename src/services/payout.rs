//! Payout Dispatcher (C6)
//!
//! # Interview Q&A
//!
//! Q: 지갑 차감이 왜 provider 호출보다 먼저인가?
//! A: 차감 + processing 전이가 한 트랜잭션으로 먼저 커밋됨
//!    - 호출 후 차감이면: 송금은 나갔는데 차감 실패 → 플랫폼 손실
//!    - 차감 후 호출이면: 호출 실패 시 보상 트랜잭션으로 복원
//!      (명시적 거절 → 즉시 복원, 타임아웃 → reconciliation이 판정)
//!
//! Q: 디스패처 두 개가 같은 출금을 집으면?
//! A: 조건부 UPDATE(`WHERE status IN ('pending','failed')`)가 선점
//!    - 진 쪽은 0행 영향 → InvalidTransition
//!    - provider 쪽은 결정적 idempotency key가 이중 송금을 차단
//!
//! Q: NG legacy lane은 왜 pending_manual인가?
//! A: 전자 전송이 불가능해 오퍼레이터가 수동 송금함
//!    - 차감은 다른 lane과 똑같이 즉시 일어남 → 지갑 불변식이 균일

use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::db::{self, Database, SellerPayoutAccount, WithdrawalRequest, WithdrawalStatus};
use crate::error::ApiError;
use crate::services::provider::{
    select_lane, withdrawal_idempotency_key, Lane, PayoutDetails, ProviderRegistry,
    TransferStatus,
};
use crate::services::wallet::{self, LedgerRef};
use crate::types::{Currency, Money, Principal, MIN_WITHDRAWAL_MINOR};

/// 원장 debit description: `withdrawal to <bank_name> ****<last4>`
pub fn withdrawal_description(details: &PayoutDetails) -> String {
    let destination = details.bank_name().unwrap_or("card");
    format!("withdrawal to {} ****{}", destination, details.last4())
}

/// 통화별 최소 출금액 검사 (예: ₦1.00, $1.00)
pub fn check_minimum(amount: Money) -> Result<(), ApiError> {
    if amount.minor() < MIN_WITHDRAWAL_MINOR {
        return Err(ApiError::ValidationError(format!(
            "withdrawal amount is below the minimum of {}",
            Money::new(MIN_WITHDRAWAL_MINOR, amount.currency()).to_display()
        )));
    }
    Ok(())
}

fn parse_withdrawal_status(withdrawal: &WithdrawalRequest) -> Result<WithdrawalStatus, ApiError> {
    WithdrawalStatus::parse(&withdrawal.status).ok_or_else(|| {
        ApiError::DatabaseError(format!("withdrawal {} has unknown status", withdrawal.id))
    })
}

fn parse_details(withdrawal: &WithdrawalRequest) -> Result<PayoutDetails, ApiError> {
    serde_json::from_value(withdrawal.payout_details.clone()).map_err(|_| {
        ApiError::DatabaseError(format!("withdrawal {} has malformed payout details", withdrawal.id))
    })
}

// ============ Account Registration ============

/// payout 계좌 등록 파라미터
#[derive(Debug, Clone)]
pub struct AddPayoutAccount {
    pub country_code: String,
    pub details: PayoutDetails,
}

/// payout 계좌 등록 (§6 add_payout_account)
///
/// lane을 country_code로 고르고, provider lane이면 recipient를 먼저
/// 만들어 핸들을 저장함. manual lane은 핸들 없이 미검증 상태로 저장.
pub async fn add_payout_account(
    db: &Database,
    registry: &ProviderRegistry,
    principal: Principal,
    req: AddPayoutAccount,
) -> Result<SellerPayoutAccount, ApiError> {
    let lane = select_lane(&req.country_code, &req.details)?;
    let currency = Currency::for_country(&req.country_code)
        .ok_or_else(|| ApiError::ValidationError("unsupported payout country".to_string()))?;

    // provider 호출은 트랜잭션 밖 - 결과만 기록
    let recipient_id = match registry.select(lane) {
        Some(provider) => Some(
            provider
                .create_recipient(&req.details, &req.country_code, currency.as_str())
                .await?,
        ),
        None => None,
    };

    let (method, bank_name, bank_code, account_holder) = match &req.details {
        PayoutDetails::Card { .. } => ("card", None, None, None),
        PayoutDetails::Bank {
            bank_name,
            bank_code,
            account_holder,
            ..
        } => (
            "bank_account",
            bank_name.clone(),
            bank_code.clone(),
            Some(account_holder.clone()),
        ),
    };

    let mut tx = db.begin().await?;
    db::payouts::upsert_payout_account(
        &mut tx,
        &db::payouts::NewPayoutAccount {
            user_id: principal.user_id,
            method: method.to_string(),
            bank_name,
            bank_code,
            last4: req.details.last4(),
            account_holder,
            country_code: req.country_code.to_uppercase(),
            provider: lane.as_str().to_string(),
            provider_recipient_id: recipient_id,
            is_verified: lane != Lane::Manual,
        },
    )
    .await?;
    tx.commit().await?;

    tracing::info!(user = %principal.user_id, lane = lane.as_str(), "payout account registered");

    db.get_payout_account(principal.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("payout account".to_string()))
}

// ============ Withdrawal Queue ============

/// 출금 요청 생성 (§6 request_withdrawal) - 큐에 넣기만 함
///
/// 실제 차감과 provider 호출은 process_withdrawal에서.
pub async fn request_withdrawal(
    db: &Database,
    principal: Principal,
    amount: Money,
    details: PayoutDetails,
) -> Result<WithdrawalRequest, ApiError> {
    check_minimum(amount)?;

    let wallet = db
        .get_wallet_by_user(principal.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("wallet".to_string()))?;

    let wallet_currency = Currency::parse(&wallet.currency)
        .ok_or_else(|| ApiError::DatabaseError("wallet has unknown currency".to_string()))?;
    if wallet_currency != amount.currency() {
        return Err(ApiError::CurrencyMismatch);
    }
    // 빠른 실패 - 확정 검사는 디스패치 시 잠금 아래에서 반복됨
    if wallet.balance_minor < amount.minor() {
        return Err(ApiError::InsufficientFunds);
    }

    let method = match &details {
        PayoutDetails::Card { .. } => "card",
        PayoutDetails::Bank { .. } => "bank_account",
    };
    let details_json: JsonValue = serde_json::to_value(&details)
        .map_err(|_| ApiError::InternalError)?;

    let mut tx = db.begin().await?;
    let withdrawal_id = db::payouts::insert_withdrawal(
        &mut tx,
        wallet.id,
        amount.minor(),
        amount.currency().as_str(),
        method,
        &details_json,
    )
    .await?;
    tx.commit().await?;

    tracing::info!(withdrawal_id = %withdrawal_id, amount = %amount.to_display(), "withdrawal requested");

    db.get_withdrawal(withdrawal_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("withdrawal".to_string()))
}

/// 출금 디스패치 (§6 process_withdrawal)
///
/// 1. 조건부 선점 (pending/failed → processing)
/// 2. 최소 금액 + 잔액 검사
/// 3. 지갑 debit - 선점과 같은 트랜잭션으로 커밋
/// 4. lane 라우팅 후 provider 호출 (트랜잭션 밖)
/// 5. 결과 기록: 성공 → completed, 거절 → failed + 보상 credit,
///    타임아웃/모호 → processing 유지 (reconciliation 대상)
pub async fn process_withdrawal(
    db: &Database,
    registry: &ProviderRegistry,
    withdrawal_id: Uuid,
) -> Result<WithdrawalRequest, ApiError> {
    // ---- 선점 + 차감 트랜잭션 ----
    let mut tx = db.begin().await?;

    let withdrawal = match db::payouts::claim_withdrawal(&mut tx, withdrawal_id).await? {
        Some(w) => w,
        None => {
            // 이미 다른 디스패처가 집었거나 terminal 상태
            let current = db
                .get_withdrawal(withdrawal_id)
                .await?
                .ok_or_else(|| ApiError::NotFound("withdrawal".to_string()))?;
            return Err(ApiError::invalid_transition(current.status, "process_withdrawal"));
        }
    };

    let amount = withdrawal
        .amount()
        .ok_or_else(|| ApiError::DatabaseError("withdrawal has unknown currency".to_string()))?;
    check_minimum(amount)?;

    let details = parse_details(&withdrawal)?;
    wallet::debit_wallet(
        &mut tx,
        withdrawal.wallet_id,
        amount,
        &withdrawal_description(&details),
        LedgerRef::default(),
    )
    .await?;

    tx.commit().await?;

    // ---- lane 라우팅 ----
    let wallet_row = db
        .get_wallet(withdrawal.wallet_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("wallet".to_string()))?;
    let account = db
        .get_payout_account(wallet_row.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("payout account".to_string()))?;

    let lane = Lane::parse(&account.provider).ok_or_else(|| {
        ApiError::DatabaseError(format!("payout account {} has unknown provider", account.id))
    })?;
    let idempotency_key = withdrawal_idempotency_key(withdrawal.id, wallet_row.user_id);

    let provider = match registry.select(lane) {
        Some(p) => p,
        None => {
            // NG legacy - 차감은 유지, 오퍼레이터가 수동 송금
            let mut tx = db.begin().await?;
            db::payouts::set_withdrawal_status(
                &mut tx,
                withdrawal.id,
                WithdrawalStatus::PendingManual.as_str(),
                None,
            )
            .await?;
            tx.commit().await?;
            tracing::info!(withdrawal_id = %withdrawal.id, "withdrawal routed to manual lane");
            return db
                .get_withdrawal(withdrawal.id)
                .await?
                .ok_or_else(|| ApiError::NotFound("withdrawal".to_string()));
        }
    };

    // recipient 핸들이 없으면 지금 생성해 저장 (계좌가 provider 연동 전에 만들어진 경우)
    let recipient = match &account.provider_recipient_id {
        Some(r) => r.clone(),
        None => {
            let r = provider
                .create_recipient(&details, &account.country_code, &withdrawal.currency)
                .await?;
            let mut tx = db.begin().await?;
            db::payouts::set_recipient_id(&mut tx, account.id, &r).await?;
            tx.commit().await?;
            r
        }
    };

    // ---- provider 호출 (트랜잭션 밖) + 결과 기록 ----
    match provider
        .initiate_transfer(&recipient, amount, &idempotency_key)
        .await
    {
        Ok(receipt) => {
            let status = match receipt.status {
                TransferStatus::Paid => WithdrawalStatus::Completed,
                // provider가 접수함 - terminal 판정은 reconciliation
                TransferStatus::Pending => WithdrawalStatus::Processing,
                TransferStatus::Failed => WithdrawalStatus::Failed,
            };

            if status == WithdrawalStatus::Failed {
                compensate(db, &withdrawal, amount, Some(&receipt.transfer_id)).await?;
            } else {
                let mut tx = db.begin().await?;
                db::payouts::set_withdrawal_status(
                    &mut tx,
                    withdrawal.id,
                    status.as_str(),
                    Some(&receipt.transfer_id),
                )
                .await?;
                tx.commit().await?;
            }
            tracing::info!(
                withdrawal_id = %withdrawal.id,
                transfer_id = %receipt.transfer_id,
                status = status.as_str(),
                "withdrawal dispatched"
            );
        }
        Err(ApiError::ProviderError { provider, code }) => {
            // 명시적 거절 → 보상 트랜잭션으로 복원
            compensate(db, &withdrawal, amount, None).await?;
            tracing::warn!(
                withdrawal_id = %withdrawal.id,
                provider = %provider,
                code = %code,
                "withdrawal rejected by provider, wallet reversed"
            );
        }
        Err(ApiError::ProviderTimeout(_)) | Err(ApiError::ProviderUnknown(_)) => {
            // 결과 불명 - processing 유지, reconciliation이 판정
            tracing::warn!(withdrawal_id = %withdrawal.id, "withdrawal outcome ambiguous, left processing");
        }
        Err(other) => return Err(other),
    }

    db.get_withdrawal(withdrawal.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("withdrawal".to_string()))
}

/// 출금 reconciliation (§6 verify_withdrawal)
///
/// processing 상태의 출금을 provider 상태와 대조:
/// - paid → completed
/// - failed → failed + 보상 credit
/// - pending → 그대로 둠
///
/// transfer id가 없으면(타임아웃으로 유실) 같은 idempotency key로
/// 재개시해 id를 회수함 - provider dedup 덕분에 이중 송금 없음.
pub async fn verify_withdrawal(
    db: &Database,
    registry: &ProviderRegistry,
    withdrawal_id: Uuid,
) -> Result<WithdrawalRequest, ApiError> {
    let withdrawal = db
        .get_withdrawal(withdrawal_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("withdrawal".to_string()))?;

    if parse_withdrawal_status(&withdrawal)? != WithdrawalStatus::Processing {
        return Ok(withdrawal);
    }

    let amount = withdrawal
        .amount()
        .ok_or_else(|| ApiError::DatabaseError("withdrawal has unknown currency".to_string()))?;
    let wallet_row = db
        .get_wallet(withdrawal.wallet_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("wallet".to_string()))?;
    let account = db
        .get_payout_account(wallet_row.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("payout account".to_string()))?;

    let lane = Lane::parse(&account.provider).ok_or_else(|| {
        ApiError::DatabaseError(format!("payout account {} has unknown provider", account.id))
    })?;
    let provider = registry.select(lane).ok_or_else(|| {
        // manual lane은 reconciliation 대상이 아님
        ApiError::invalid_transition(withdrawal.status.clone(), "verify_withdrawal")
    })?;

    let (transfer_id, status) = match &withdrawal.provider_transfer_id {
        Some(id) => (id.clone(), provider.verify_transfer(id).await?),
        None => {
            let key = withdrawal_idempotency_key(withdrawal.id, wallet_row.user_id);
            let recipient = account.provider_recipient_id.clone().ok_or_else(|| {
                ApiError::DatabaseError(format!("payout account {} has no recipient", account.id))
            })?;
            let receipt = provider.initiate_transfer(&recipient, amount, &key).await?;
            (receipt.transfer_id, receipt.status)
        }
    };

    match status {
        TransferStatus::Paid => {
            let mut tx = db.begin().await?;
            db::payouts::set_withdrawal_status(
                &mut tx,
                withdrawal.id,
                WithdrawalStatus::Completed.as_str(),
                Some(&transfer_id),
            )
            .await?;
            tx.commit().await?;
            tracing::info!(withdrawal_id = %withdrawal.id, "withdrawal reconciled as completed");
        }
        TransferStatus::Failed => {
            compensate(db, &withdrawal, amount, Some(&transfer_id)).await?;
            tracing::warn!(withdrawal_id = %withdrawal.id, "withdrawal reconciled as failed, wallet reversed");
        }
        TransferStatus::Pending => {
            // 아직 terminal이 아님 - transfer id만 저장해 둠
            let mut tx = db.begin().await?;
            db::payouts::set_withdrawal_status(
                &mut tx,
                withdrawal.id,
                WithdrawalStatus::Processing.as_str(),
                Some(&transfer_id),
            )
            .await?;
            tx.commit().await?;
        }
    }

    db.get_withdrawal(withdrawal.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("withdrawal".to_string()))
}

/// 보상 트랜잭션: failed 전이 + `withdrawal reversal` credit
///
/// 상태 재검사 후 적용 - 이미 다른 경로가 terminal로 보냈으면 no-op.
async fn compensate(
    db: &Database,
    withdrawal: &WithdrawalRequest,
    amount: Money,
    transfer_id: Option<&str>,
) -> Result<(), ApiError> {
    let mut tx = db.begin().await?;

    let current = db::payouts::lock_withdrawal(&mut tx, withdrawal.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("withdrawal".to_string()))?;
    if parse_withdrawal_status(&current)? != WithdrawalStatus::Processing {
        return Ok(());
    }

    db::payouts::set_withdrawal_status(
        &mut tx,
        withdrawal.id,
        WithdrawalStatus::Failed.as_str(),
        transfer_id,
    )
    .await?;
    wallet::credit_wallet(
        &mut tx,
        withdrawal.wallet_id,
        amount,
        "withdrawal reversal",
        LedgerRef::default(),
    )
    .await?;
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank_details() -> PayoutDetails {
        PayoutDetails::Bank {
            country: "NG".to_string(),
            bank_name: Some("GTBank".to_string()),
            bank_code: Some("058".to_string()),
            account_number: "0123456789".to_string(),
            account_holder: "Ada Obi".to_string(),
            routing_number: None,
        }
    }

    #[test]
    fn test_withdrawal_description_format() {
        assert_eq!(
            withdrawal_description(&bank_details()),
            "withdrawal to GTBank ****6789"
        );
        let card = PayoutDetails::Card {
            token: "tok_1".to_string(),
            last4: "4242".to_string(),
        };
        assert_eq!(withdrawal_description(&card), "withdrawal to card ****4242");
    }

    #[test]
    fn test_minimum_boundary() {
        // 최소액 - 1 minor unit → 거절
        assert!(check_minimum(Money::new(MIN_WITHDRAWAL_MINOR - 1, Currency::Ngn)).is_err());
        // 정확히 최소액 → 허용
        assert!(check_minimum(Money::new(MIN_WITHDRAWAL_MINOR, Currency::Ngn)).is_ok());
        assert!(check_minimum(Money::new(15_000, Currency::Usd)).is_ok());
    }
}
