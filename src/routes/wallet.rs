//! Wallet Endpoints
//!
//! 잔액과 원장 히스토리 조회. 지갑은 첫 credit/debit에서 lazy 생성되므로
//! 아직 지갑이 없는 유저는 잔액 0으로 응답함.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::types::{PageQuery, Pagination, Principal};
use crate::AppState;

// ============ Response Types ============

#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub balance_minor: i64,
    pub currency: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LedgerEntryResponse {
    pub id: Uuid,
    /// credit | debit
    pub kind: String,
    pub amount_minor: i64,
    pub currency: String,
    pub description: String,
    pub related_order_id: Option<Uuid>,
    pub related_project_id: Option<Uuid>,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub entries: Vec<LedgerEntryResponse>,
    pub pagination: Pagination,
}

// ============ Handlers ============

/// GET /wallet
pub async fn get_wallet(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<WalletResponse>, ApiError> {
    match state.db.get_wallet_by_user(principal.user_id).await? {
        Some(wallet) => Ok(Json(WalletResponse {
            balance_minor: wallet.balance_minor,
            currency: Some(wallet.currency),
            updated_at: Some(wallet.updated_at.to_rfc3339()),
        })),
        // 아직 거래가 없는 유저
        None => Ok(Json(WalletResponse {
            balance_minor: 0,
            currency: None,
            updated_at: None,
        })),
    }
}

/// GET /wallet/history
///
/// 원장 히스토리 (최신순, 페이지네이션)
pub async fn get_history(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<PageQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let page = query.page();
    let limit = query.limit();

    let wallet = match state.db.get_wallet_by_user(principal.user_id).await? {
        Some(w) => w,
        None => {
            return Ok(Json(HistoryResponse {
                entries: vec![],
                pagination: Pagination::new(page, limit, 0),
            }))
        }
    };

    let (entries, total) = state.db.get_wallet_history(wallet.id, page, limit).await?;

    Ok(Json(HistoryResponse {
        entries: entries
            .into_iter()
            .map(|e| LedgerEntryResponse {
                id: e.id,
                kind: e.kind,
                amount_minor: e.amount_minor,
                currency: e.currency,
                description: e.description,
                related_order_id: e.related_order_id,
                related_project_id: e.related_project_id,
                created_at: e.created_at.to_rfc3339(),
            })
            .collect(),
        pagination: Pagination::new(page, limit, total),
    }))
}
