//! Project Workflow State Machine (C4)
//!
//! 프리랜스 계약의 선형 워크플로우:
//!
//! ```text
//! posted → accepted → (negotiating) → price_agreed
//!        → escrow_funded → work_submitted → completed → paid
//! ```
//!
//! fund_escrow와 release_payment는 각각 지갑 원장 기록 + 프로젝트 필드
//! 갱신 + 상태 전진 세 가지를 한 트랜잭션으로 묶는다 - 부분 실패는
//! 전부 롤백됨.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::{self, Database, Project, WorkflowStatus};
use crate::error::ApiError;
use crate::services::wallet::{self, LedgerRef};
use crate::types::{Currency, Money, Principal};

// ============ Transition Function ============

/// 워크플로우 이벤트
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectEvent {
    Accept,
    AgreePrice,
    FundEscrow,
    SubmitWork,
    ApproveWork,
    ReleasePayment,
}

impl ProjectEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectEvent::Accept => "accept",
            ProjectEvent::AgreePrice => "agree_price",
            ProjectEvent::FundEscrow => "fund_escrow",
            ProjectEvent::SubmitWork => "submit_work",
            ProjectEvent::ApproveWork => "approve_work",
            ProjectEvent::ReleasePayment => "release_payment",
        }
    }
}

/// (현재 상태, 이벤트) → 다음 상태
///
/// negotiating은 합의 전 카운터오퍼 상태 - 주변 기능(채팅/협상)이
/// 진입시키며 코어는 agree_price로 빠져나오는 경로만 보장함.
pub fn project_transition(
    current: WorkflowStatus,
    event: ProjectEvent,
) -> Result<WorkflowStatus, ApiError> {
    use ProjectEvent::*;
    use WorkflowStatus::*;

    match (current, event) {
        (Posted, Accept) => Ok(Accepted),
        (Accepted, AgreePrice) | (Negotiating, AgreePrice) => Ok(PriceAgreed),
        (PriceAgreed, FundEscrow) => Ok(EscrowFunded),
        (EscrowFunded, SubmitWork) => Ok(WorkSubmitted),
        (WorkSubmitted, ApproveWork) => Ok(Completed),
        (Completed, ReleasePayment) => Ok(Paid),
        (state, event) => Err(ApiError::invalid_transition(
            state.as_str(),
            event.as_str(),
        )),
    }
}

fn parse_status(project: &Project) -> Result<WorkflowStatus, ApiError> {
    WorkflowStatus::parse(&project.workflow_status).ok_or_else(|| {
        ApiError::DatabaseError(format!("project {} has unknown status", project.id))
    })
}

fn project_currency(project: &Project) -> Result<Currency, ApiError> {
    Currency::parse(&project.currency).ok_or_else(|| {
        ApiError::DatabaseError(format!("project {} has unknown currency", project.id))
    })
}

// ============ Operations ============

/// 프로젝트 게시 파라미터
#[derive(Debug, Clone)]
pub struct PostProject {
    pub title: String,
    pub description: String,
    pub budget: Money,
    pub deadline: Option<DateTime<Utc>>,
    /// 외부 provider가 처리한 구독 결제의 레퍼런스 (게시 gate)
    pub subscription_payment_ref: String,
}

/// 프로젝트 게시 (→ posted)
///
/// 구독 gate: 구독 결제 자체는 코어 밖에서 처리되고, 여기서는
/// provider가 돌려준 레퍼런스의 존재만 전제조건으로 검사함.
pub async fn post_project(
    db: &Database,
    principal: Principal,
    req: PostProject,
) -> Result<Project, ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::ValidationError("title is required".to_string()));
    }
    if req.budget.minor() <= 0 {
        return Err(ApiError::ValidationError("budget must be positive".to_string()));
    }
    if req.subscription_payment_ref.trim().is_empty() {
        return Err(ApiError::Forbidden(
            "an active subscription is required to post projects".to_string(),
        ));
    }

    let project_id = Uuid::new_v4();
    let mut tx = db.begin().await?;
    db::projects::insert_project(
        &mut tx,
        project_id,
        &req.title,
        &req.description,
        req.budget.minor(),
        req.budget.currency().as_str(),
        req.deadline,
        principal.user_id,
        &req.subscription_payment_ref,
    )
    .await?;
    tx.commit().await?;

    tracing::info!(project_id = %project_id, owner = %principal.user_id, "project posted");

    db.get_project(project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("project".to_string()))
}

/// 프리랜서 수락 (posted → accepted)
pub async fn accept_project(
    db: &Database,
    principal: Principal,
    project_id: Uuid,
) -> Result<Project, ApiError> {
    let mut tx = db.begin().await?;

    let project = db::projects::lock_project(&mut tx, project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("project".to_string()))?;

    if project.owner_id == principal.user_id {
        return Err(ApiError::Forbidden(
            "the project owner cannot accept their own project".to_string(),
        ));
    }
    if project.freelancer_id.is_some() {
        return Err(ApiError::invalid_transition(
            project.workflow_status.clone(),
            ProjectEvent::Accept.as_str(),
        ));
    }

    project_transition(parse_status(&project)?, ProjectEvent::Accept)?;
    db::projects::assign_freelancer(&mut tx, project_id, principal.user_id).await?;
    tx.commit().await?;

    tracing::info!(project_id = %project_id, freelancer = %principal.user_id, "project accepted");

    db.get_project(project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("project".to_string()))
}

/// 가격 합의 (accepted | negotiating → price_agreed)
pub async fn agree_price(
    db: &Database,
    principal: Principal,
    project_id: Uuid,
    price: Money,
) -> Result<Project, ApiError> {
    if price.minor() <= 0 {
        return Err(ApiError::ValidationError("price must be positive".to_string()));
    }

    let mut tx = db.begin().await?;

    let project = db::projects::lock_project(&mut tx, project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("project".to_string()))?;

    let is_party = principal.user_id == project.owner_id
        || project.freelancer_id == Some(principal.user_id);
    if !is_party {
        return Err(ApiError::Forbidden(
            "only the owner or freelancer can agree a price".to_string(),
        ));
    }
    if price.currency() != project_currency(&project)? {
        return Err(ApiError::CurrencyMismatch);
    }

    project_transition(parse_status(&project)?, ProjectEvent::AgreePrice)?;
    db::projects::set_agreed_price(&mut tx, project_id, price.minor()).await?;
    tx.commit().await?;

    db.get_project(project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("project".to_string()))
}

/// 에스크로 펀딩 (price_agreed → escrow_funded)
///
/// owner 지갑 debit + 프로젝트 필드 + 상태 전진이 한 트랜잭션.
/// 잔액 부족이면 InsufficientFunds - 원장 엔트리는 남지 않음.
pub async fn fund_escrow(
    db: &Database,
    principal: Principal,
    project_id: Uuid,
) -> Result<Project, ApiError> {
    let mut tx = db.begin().await?;

    let project = db::projects::lock_project(&mut tx, project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("project".to_string()))?;

    if project.owner_id != principal.user_id {
        return Err(ApiError::Forbidden(
            "only the project owner can fund the escrow".to_string(),
        ));
    }
    if project.escrow_funded {
        return Err(ApiError::invalid_transition(
            project.workflow_status.clone(),
            ProjectEvent::FundEscrow.as_str(),
        ));
    }

    project_transition(parse_status(&project)?, ProjectEvent::FundEscrow)?;

    let currency = project_currency(&project)?;
    let agreed = project
        .agreed_price_minor
        .ok_or_else(|| ApiError::invalid_transition(
            project.workflow_status.clone(),
            ProjectEvent::FundEscrow.as_str(),
        ))?;
    let amount = Money::new(agreed, currency);

    wallet::debit_user(
        &mut tx,
        project.owner_id,
        amount,
        "project escrow",
        LedgerRef::project(project_id),
    )
    .await?;
    db::projects::mark_escrow_funded(&mut tx, project_id, amount.minor()).await?;
    tx.commit().await?;

    tracing::info!(project_id = %project_id, amount = %amount.to_display(), "project escrow funded");

    db.get_project(project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("project".to_string()))
}

/// 작업 제출 (escrow_funded → work_submitted)
///
/// WorkSubmission은 부모 프로젝트가 escrow_funded일 때만 생성됨.
pub async fn submit_work(
    db: &Database,
    principal: Principal,
    project_id: Uuid,
    description: &str,
    files_url: Option<&str>,
) -> Result<Project, ApiError> {
    if description.trim().is_empty() {
        return Err(ApiError::ValidationError("description is required".to_string()));
    }

    let mut tx = db.begin().await?;

    let project = db::projects::lock_project(&mut tx, project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("project".to_string()))?;

    if project.freelancer_id != Some(principal.user_id) {
        return Err(ApiError::Forbidden(
            "only the assigned freelancer can submit work".to_string(),
        ));
    }

    project_transition(parse_status(&project)?, ProjectEvent::SubmitWork)?;

    db::projects::insert_work_submission(&mut tx, project_id, principal.user_id, description, files_url)
        .await?;
    db::projects::set_workflow_status(&mut tx, project_id, WorkflowStatus::WorkSubmitted.as_str())
        .await?;
    tx.commit().await?;

    db.get_project(project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("project".to_string()))
}

/// 작업 승인 (work_submitted → completed)
pub async fn approve_work(
    db: &Database,
    principal: Principal,
    project_id: Uuid,
) -> Result<Project, ApiError> {
    let mut tx = db.begin().await?;

    let project = db::projects::lock_project(&mut tx, project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("project".to_string()))?;

    if project.owner_id != principal.user_id {
        return Err(ApiError::Forbidden(
            "only the project owner can approve work".to_string(),
        ));
    }

    project_transition(parse_status(&project)?, ProjectEvent::ApproveWork)?;

    db::projects::approve_latest_submission(&mut tx, project_id).await?;
    db::projects::mark_completed(&mut tx, project_id).await?;
    tx.commit().await?;

    db.get_project(project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("project".to_string()))
}

/// 대금 지급 (completed → paid)
///
/// 프리랜서 지갑 credit + hold 소비(escrow_funded=false) + 상태 전진이
/// 한 트랜잭션. 불변식 P2/P3를 여기서 성립시킴.
pub async fn release_payment(
    db: &Database,
    principal: Principal,
    project_id: Uuid,
) -> Result<Project, ApiError> {
    let mut tx = db.begin().await?;

    let project = db::projects::lock_project(&mut tx, project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("project".to_string()))?;

    if project.owner_id != principal.user_id {
        return Err(ApiError::Forbidden(
            "only the project owner can release payment".to_string(),
        ));
    }
    if !project.escrow_funded || project.payment_released_at.is_some() {
        return Err(ApiError::invalid_transition(
            project.workflow_status.clone(),
            ProjectEvent::ReleasePayment.as_str(),
        ));
    }

    project_transition(parse_status(&project)?, ProjectEvent::ReleasePayment)?;

    let freelancer = project.freelancer_id.ok_or_else(|| {
        ApiError::DatabaseError(format!("project {} is completed without freelancer", project.id))
    })?;
    let currency = project_currency(&project)?;
    let amount = project.escrow_amount_minor.ok_or_else(|| {
        ApiError::DatabaseError(format!("project {} is funded without amount", project.id))
    })?;

    wallet::credit_user(
        &mut tx,
        freelancer,
        Money::new(amount, currency),
        "project payment",
        LedgerRef::project(project_id),
    )
    .await?;
    db::projects::mark_paid(&mut tx, project_id).await?;
    tx.commit().await?;

    tracing::info!(project_id = %project_id, "project payment released");

    db.get_project(project_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("project".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        use ProjectEvent::*;
        use WorkflowStatus::*;
        let mut state = Posted;
        for (event, expected) in [
            (Accept, Accepted),
            (AgreePrice, PriceAgreed),
            (FundEscrow, EscrowFunded),
            (SubmitWork, WorkSubmitted),
            (ApproveWork, Completed),
            (ReleasePayment, Paid),
        ] {
            state = project_transition(state, event).unwrap();
            assert_eq!(state, expected);
        }
    }

    #[test]
    fn test_agree_price_from_negotiating() {
        assert_eq!(
            project_transition(WorkflowStatus::Negotiating, ProjectEvent::AgreePrice).unwrap(),
            WorkflowStatus::PriceAgreed
        );
    }

    #[test]
    fn test_cannot_skip_funding() {
        // price_agreed에서 바로 작업 제출 불가 - 에스크로가 gate
        assert!(project_transition(WorkflowStatus::PriceAgreed, ProjectEvent::SubmitWork).is_err());
        // posted에서 펀딩 불가
        assert!(project_transition(WorkflowStatus::Posted, ProjectEvent::FundEscrow).is_err());
    }

    #[test]
    fn test_paid_is_terminal() {
        use ProjectEvent::*;
        for event in [Accept, AgreePrice, FundEscrow, SubmitWork, ApproveWork, ReleasePayment] {
            assert!(project_transition(WorkflowStatus::Paid, event).is_err());
        }
    }

    #[test]
    fn test_release_requires_completed() {
        assert!(
            project_transition(WorkflowStatus::WorkSubmitted, ProjectEvent::ReleasePayment)
                .is_err()
        );
    }
}
