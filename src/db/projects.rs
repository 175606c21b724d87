//! Project / Work Submission Queries
//!
//! 프리랜스 워크플로우의 전이는 `lock_project`로 행을 잠근 뒤 guard를
//! 검사하고 필드+상태를 한 트랜잭션에서 갱신함.

use uuid::Uuid;

use super::{Database, PgTx, Project, WorkSubmission};

/// 프로젝트 게시 (workflow_status = posted)
#[allow(clippy::too_many_arguments)]
pub async fn insert_project(
    tx: &mut PgTx<'_>,
    id: Uuid,
    title: &str,
    description: &str,
    budget_minor: i64,
    currency: &str,
    deadline: Option<chrono::DateTime<chrono::Utc>>,
    owner_id: Uuid,
    subscription_payment_ref: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO projects
            (id, title, description, budget_minor, currency, deadline, owner_id,
             workflow_status, subscription_paid, subscription_payment_ref,
             escrow_funded, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'posted', TRUE, $8, FALSE, NOW(), NOW())
        "#,
    )
    .bind(id)
    .bind(title)
    .bind(description)
    .bind(budget_minor)
    .bind(currency)
    .bind(deadline)
    .bind(owner_id)
    .bind(subscription_payment_ref)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// 프로젝트 행 잠금
pub async fn lock_project(
    tx: &mut PgTx<'_>,
    project_id: Uuid,
) -> Result<Option<Project>, sqlx::Error> {
    sqlx::query_as::<_, Project>(
        r#"
        SELECT id, title, description, budget_minor, currency, deadline, owner_id,
               freelancer_id, workflow_status, agreed_price_minor, subscription_paid,
               subscription_payment_ref, escrow_funded, escrow_amount_minor,
               escrow_funded_at, completed_at, payment_released_at, created_at, updated_at
        FROM projects
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(project_id)
    .fetch_optional(&mut **tx)
    .await
}

/// 상태만 전진시키는 전이 (accept / agree_price / submit / approve 등)
pub async fn set_workflow_status(
    tx: &mut PgTx<'_>,
    project_id: Uuid,
    status: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE projects SET workflow_status = $2, updated_at = NOW() WHERE id = $1
        "#,
    )
    .bind(project_id)
    .bind(status)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// 프리랜서 배정 (posted → accepted)
pub async fn assign_freelancer(
    tx: &mut PgTx<'_>,
    project_id: Uuid,
    freelancer_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE projects
        SET freelancer_id = $2, workflow_status = 'accepted', updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(project_id)
    .bind(freelancer_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// 합의 가격 기록 (→ price_agreed)
pub async fn set_agreed_price(
    tx: &mut PgTx<'_>,
    project_id: Uuid,
    agreed_price_minor: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE projects
        SET agreed_price_minor = $2, workflow_status = 'price_agreed', updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(project_id)
    .bind(agreed_price_minor)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// 에스크로 펀딩 기록 (→ escrow_funded)
///
/// 불변식 P1: escrow_funded ⇒ escrow_amount == agreed_price ∧ funded_at 설정
pub async fn mark_escrow_funded(
    tx: &mut PgTx<'_>,
    project_id: Uuid,
    escrow_amount_minor: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE projects
        SET escrow_funded = TRUE,
            escrow_amount_minor = $2,
            escrow_funded_at = NOW(),
            workflow_status = 'escrow_funded',
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(project_id)
    .bind(escrow_amount_minor)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// 작업 승인 기록 (→ completed)
pub async fn mark_completed(tx: &mut PgTx<'_>, project_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE projects
        SET workflow_status = 'completed', completed_at = NOW(), updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(project_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// 대금 지급 기록 (→ paid)
///
/// 불변식 P3: hold가 소비되므로 escrow_funded는 false로 돌아감
pub async fn mark_paid(tx: &mut PgTx<'_>, project_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE projects
        SET workflow_status = 'paid',
            escrow_funded = FALSE,
            payment_released_at = NOW(),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(project_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// 작업 제출물 생성 (status = pending)
pub async fn insert_work_submission(
    tx: &mut PgTx<'_>,
    project_id: Uuid,
    freelancer_id: Uuid,
    description: &str,
    files_url: Option<&str>,
) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO work_submissions
            (id, project_id, freelancer_id, description, files_url, status,
             created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, 'pending', NOW(), NOW())
        "#,
    )
    .bind(id)
    .bind(project_id)
    .bind(freelancer_id)
    .bind(description)
    .bind(files_url)
    .execute(&mut **tx)
    .await?;
    Ok(id)
}

/// 최신 pending 제출물 승인 처리
pub async fn approve_latest_submission(
    tx: &mut PgTx<'_>,
    project_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE work_submissions
        SET status = 'approved', updated_at = NOW()
        WHERE id = (
            SELECT id FROM work_submissions
            WHERE project_id = $1 AND status = 'pending'
            ORDER BY created_at DESC
            LIMIT 1
        )
        "#,
    )
    .bind(project_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

impl Database {
    /// 프로젝트 조회
    pub async fn get_project(&self, project_id: Uuid) -> Result<Option<Project>, sqlx::Error> {
        sqlx::query_as::<_, Project>(
            r#"
            SELECT id, title, description, budget_minor, currency, deadline, owner_id,
                   freelancer_id, workflow_status, agreed_price_minor, subscription_paid,
                   subscription_payment_ref, escrow_funded, escrow_amount_minor,
                   escrow_funded_at, completed_at, payment_released_at, created_at, updated_at
            FROM projects
            WHERE id = $1
            "#,
        )
        .bind(project_id)
        .fetch_optional(self.pool())
        .await
    }

    /// 프로젝트의 제출물 목록 (최신순)
    pub async fn get_work_submissions(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<WorkSubmission>, sqlx::Error> {
        sqlx::query_as::<_, WorkSubmission>(
            r#"
            SELECT id, project_id, freelancer_id, description, files_url, status,
                   created_at, updated_at
            FROM work_submissions
            WHERE project_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(project_id)
        .fetch_all(self.pool())
        .await
    }
}
