//! Payout Endpoints
//!
//! payout 계좌 등록과 출금 큐/디스패치/리컨실리에이션.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{SellerPayoutAccount, WithdrawalRequest};
use crate::error::ApiError;
use crate::services::payout::{self, AddPayoutAccount};
use crate::services::provider::PayoutDetails;
use crate::types::{Currency, Money, Principal};
use crate::AppState;

// ============ Request/Response Types ============

#[derive(Debug, Deserialize)]
pub struct AddAccountRequest {
    pub country_code: String,
    pub details: PayoutDetails,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalRequestBody {
    pub amount_minor: i64,
    pub currency: String,
    pub details: PayoutDetails,
}

#[derive(Debug, Serialize)]
pub struct PayoutAccountResponse {
    pub id: Uuid,
    pub method: String,
    pub bank_name: Option<String>,
    pub last4: String,
    pub country_code: String,
    pub provider: String,
    pub is_verified: bool,
}

impl From<SellerPayoutAccount> for PayoutAccountResponse {
    fn from(a: SellerPayoutAccount) -> Self {
        Self {
            id: a.id,
            method: a.method,
            bank_name: a.bank_name,
            last4: a.last4,
            country_code: a.country_code,
            provider: a.provider,
            is_verified: a.is_verified,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WithdrawalResponse {
    pub id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
    pub payout_method: String,
    pub provider_transfer_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<WithdrawalRequest> for WithdrawalResponse {
    fn from(w: WithdrawalRequest) -> Self {
        Self {
            id: w.id,
            amount_minor: w.amount_minor,
            currency: w.currency,
            status: w.status,
            payout_method: w.payout_method,
            provider_transfer_id: w.provider_transfer_id,
            created_at: w.created_at.to_rfc3339(),
            updated_at: w.updated_at.to_rfc3339(),
        }
    }
}

// ============ Handlers ============

/// POST /payouts/account
///
/// payout 목적지 등록 - country_code가 lane을 결정함
pub async fn add_payout_account(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<AddAccountRequest>,
) -> Result<Json<PayoutAccountResponse>, ApiError> {
    let account = payout::add_payout_account(
        &state.db,
        &state.providers(),
        principal,
        AddPayoutAccount {
            country_code: req.country_code,
            details: req.details,
        },
    )
    .await?;
    Ok(Json(account.into()))
}

/// GET /payouts/account
pub async fn get_payout_account(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<PayoutAccountResponse>, ApiError> {
    let account = state
        .db
        .get_payout_account(principal.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("payout account".to_string()))?;
    Ok(Json(account.into()))
}

/// POST /payouts/withdrawals
///
/// 출금 요청 생성 (큐에 넣기만 - 차감은 디스패치 시)
pub async fn request_withdrawal(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<WithdrawalRequestBody>,
) -> Result<Json<WithdrawalResponse>, ApiError> {
    let currency = Currency::parse(&req.currency)
        .ok_or_else(|| ApiError::ValidationError(format!("unsupported currency: {}", req.currency)))?;

    let withdrawal = payout::request_withdrawal(
        &state.db,
        principal,
        Money::new(req.amount_minor, currency),
        req.details,
    )
    .await?;
    Ok(Json(withdrawal.into()))
}

/// 출금의 소유자인지 검사 (wallet → user)
async fn ensure_owner_or_admin(
    state: &AppState,
    principal: Principal,
    withdrawal_id: Uuid,
) -> Result<(), ApiError> {
    if principal.is_admin() {
        return Ok(());
    }
    let withdrawal = state
        .db
        .get_withdrawal(withdrawal_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("withdrawal".to_string()))?;
    let wallet = state
        .db
        .get_wallet(withdrawal.wallet_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("wallet".to_string()))?;
    if wallet.user_id != principal.user_id {
        return Err(ApiError::Forbidden("not your withdrawal".to_string()));
    }
    Ok(())
}

/// POST /payouts/withdrawals/:id/process
///
/// 디스패처 엔트리 - 선점, 차감, provider 호출
pub async fn process_withdrawal(
    State(state): State<AppState>,
    principal: Principal,
    Path(withdrawal_id): Path<Uuid>,
) -> Result<Json<WithdrawalResponse>, ApiError> {
    ensure_owner_or_admin(&state, principal, withdrawal_id).await?;
    let withdrawal =
        payout::process_withdrawal(&state.db, &state.providers(), withdrawal_id).await?;
    Ok(Json(withdrawal.into()))
}

/// POST /payouts/withdrawals/:id/verify
///
/// reconciliation - processing 상태를 provider와 대조해 terminal로
pub async fn verify_withdrawal(
    State(state): State<AppState>,
    principal: Principal,
    Path(withdrawal_id): Path<Uuid>,
) -> Result<Json<WithdrawalResponse>, ApiError> {
    ensure_owner_or_admin(&state, principal, withdrawal_id).await?;
    let withdrawal =
        payout::verify_withdrawal(&state.db, &state.providers(), withdrawal_id).await?;
    Ok(Json(withdrawal.into()))
}

/// GET /payouts/withdrawals/:id
pub async fn get_withdrawal(
    State(state): State<AppState>,
    principal: Principal,
    Path(withdrawal_id): Path<Uuid>,
) -> Result<Json<WithdrawalResponse>, ApiError> {
    ensure_owner_or_admin(&state, principal, withdrawal_id).await?;
    let withdrawal = state
        .db
        .get_withdrawal(withdrawal_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("withdrawal".to_string()))?;
    Ok(Json(withdrawal.into()))
}
