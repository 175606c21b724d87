//! Project Workflow Endpoints
//!
//! 프리랜스 워크플로우(C4)의 전이를 HTTP로 노출.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{Project, WorkSubmission};
use crate::error::ApiError;
use crate::services::project::{self, PostProject};
use crate::types::{Currency, Money, Principal};
use crate::AppState;

// ============ Request/Response Types ============

#[derive(Debug, Deserialize)]
pub struct PostProjectRequest {
    pub title: String,
    pub description: String,
    pub budget_minor: i64,
    pub currency: String,
    pub deadline: Option<chrono::DateTime<chrono::Utc>>,
    /// 외부 provider가 처리한 구독 결제 레퍼런스 (게시 gate)
    pub subscription_payment_ref: String,
}

#[derive(Debug, Deserialize)]
pub struct AgreePriceRequest {
    pub amount_minor: i64,
}

#[derive(Debug, Deserialize)]
pub struct SubmitWorkRequest {
    pub description: String,
    pub files_url: Option<String>,
}

/// 프로젝트 응답
#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub budget_minor: i64,
    pub currency: String,
    pub owner_id: Uuid,
    pub freelancer_id: Option<Uuid>,
    pub workflow_status: String,
    pub agreed_price_minor: Option<i64>,
    pub escrow_funded: bool,
    pub escrow_amount_minor: Option<i64>,
    pub escrow_funded_at: Option<String>,
    pub completed_at: Option<String>,
    pub payment_released_at: Option<String>,
    pub created_at: String,
}

impl From<Project> for ProjectResponse {
    fn from(p: Project) -> Self {
        Self {
            id: p.id,
            title: p.title,
            description: p.description,
            budget_minor: p.budget_minor,
            currency: p.currency,
            owner_id: p.owner_id,
            freelancer_id: p.freelancer_id,
            workflow_status: p.workflow_status,
            agreed_price_minor: p.agreed_price_minor,
            escrow_funded: p.escrow_funded,
            escrow_amount_minor: p.escrow_amount_minor,
            escrow_funded_at: p.escrow_funded_at.map(|t| t.to_rfc3339()),
            completed_at: p.completed_at.map(|t| t.to_rfc3339()),
            payment_released_at: p.payment_released_at.map(|t| t.to_rfc3339()),
            created_at: p.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub id: Uuid,
    pub project_id: Uuid,
    pub freelancer_id: Uuid,
    pub description: String,
    pub files_url: Option<String>,
    pub status: String,
    pub created_at: String,
}

impl From<WorkSubmission> for SubmissionResponse {
    fn from(s: WorkSubmission) -> Self {
        Self {
            id: s.id,
            project_id: s.project_id,
            freelancer_id: s.freelancer_id,
            description: s.description,
            files_url: s.files_url,
            status: s.status,
            created_at: s.created_at.to_rfc3339(),
        }
    }
}

// ============ Handlers ============

/// POST /projects
///
/// 프로젝트 게시 - 구독 결제 레퍼런스가 gate
pub async fn post_project(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<PostProjectRequest>,
) -> Result<Json<ProjectResponse>, ApiError> {
    let currency = Currency::parse(&req.currency)
        .ok_or_else(|| ApiError::ValidationError(format!("unsupported currency: {}", req.currency)))?;

    let project = project::post_project(
        &state.db,
        principal,
        PostProject {
            title: req.title,
            description: req.description,
            budget: Money::new(req.budget_minor, currency),
            deadline: req.deadline,
            subscription_payment_ref: req.subscription_payment_ref,
        },
    )
    .await?;
    Ok(Json(project.into()))
}

/// GET /projects/:id
pub async fn get_project(
    State(state): State<AppState>,
    _principal: Principal,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ProjectResponse>, ApiError> {
    let project = state
        .db
        .get_project(project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("project".to_string()))?;
    Ok(Json(project.into()))
}

/// POST /projects/:id/accept
///
/// 프리랜서 수락 (posted → accepted)
pub async fn accept_project(
    State(state): State<AppState>,
    principal: Principal,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ProjectResponse>, ApiError> {
    let project = project::accept_project(&state.db, principal, project_id).await?;
    Ok(Json(project.into()))
}

/// POST /projects/:id/agree-price
///
/// 가격은 프로젝트 통화로 해석됨
pub async fn agree_price(
    State(state): State<AppState>,
    principal: Principal,
    Path(project_id): Path<Uuid>,
    Json(req): Json<AgreePriceRequest>,
) -> Result<Json<ProjectResponse>, ApiError> {
    let current = state
        .db
        .get_project(project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("project".to_string()))?;
    let currency = Currency::parse(&current.currency)
        .ok_or_else(|| ApiError::DatabaseError("project has unknown currency".to_string()))?;

    let project = project::agree_price(
        &state.db,
        principal,
        project_id,
        Money::new(req.amount_minor, currency),
    )
    .await?;
    Ok(Json(project.into()))
}

/// POST /projects/:id/fund-escrow
///
/// owner 지갑 → 프로젝트 에스크로 (price_agreed → escrow_funded)
pub async fn fund_escrow(
    State(state): State<AppState>,
    principal: Principal,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ProjectResponse>, ApiError> {
    let project = project::fund_escrow(&state.db, principal, project_id).await?;
    Ok(Json(project.into()))
}

/// POST /projects/:id/submit-work
pub async fn submit_work(
    State(state): State<AppState>,
    principal: Principal,
    Path(project_id): Path<Uuid>,
    Json(req): Json<SubmitWorkRequest>,
) -> Result<Json<ProjectResponse>, ApiError> {
    let project = project::submit_work(
        &state.db,
        principal,
        project_id,
        &req.description,
        req.files_url.as_deref(),
    )
    .await?;
    Ok(Json(project.into()))
}

/// POST /projects/:id/approve-work
pub async fn approve_work(
    State(state): State<AppState>,
    principal: Principal,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ProjectResponse>, ApiError> {
    let project = project::approve_work(&state.db, principal, project_id).await?;
    Ok(Json(project.into()))
}

/// POST /projects/:id/release-payment
///
/// 에스크로 → 프리랜서 지갑 (completed → paid)
pub async fn release_payment(
    State(state): State<AppState>,
    principal: Principal,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ProjectResponse>, ApiError> {
    let project = project::release_payment(&state.db, principal, project_id).await?;
    Ok(Json(project.into()))
}

/// GET /projects/:id/submissions
pub async fn get_submissions(
    State(state): State<AppState>,
    principal: Principal,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<SubmissionResponse>>, ApiError> {
    let project = state
        .db
        .get_project(project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("project".to_string()))?;

    let is_party = principal.user_id == project.owner_id
        || project.freelancer_id == Some(principal.user_id);
    if !is_party && !principal.is_admin() {
        return Err(ApiError::Forbidden("not a party to this project".to_string()));
    }

    let submissions = state.db.get_work_submissions(project_id).await?;
    Ok(Json(submissions.into_iter().map(Into::into).collect()))
}
