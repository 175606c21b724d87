//! Database Module
//!
//! # Interview Q&A
//!
//! Q: 왜 PostgreSQL을 선택했는가?
//! A: 에스크로/정산 백엔드에 적합한 이유
//!
//!    1. ACID 트랜잭션: 원장 엔트리와 잔액 변경이 원자적으로 커밋
//!    2. row-level lock (SELECT ... FOR UPDATE): 주문/지갑 단위 직렬화
//!    3. 조건부 UPDATE: 재고 차감, 출금 중복 처리 방지
//!    4. JSONB: payout details 같은 opaque 구조 저장
//!    5. 생태계: SQLx, Diesel 등 Rust 라이브러리 지원
//!
//! Q: 트랜잭션 경계는 어디에 있는가?
//! A: 서비스 레이어가 `db.begin()`으로 열고 commit/rollback
//!    - 상태 전이 + 원장 기록 + 엔티티 갱신이 하나의 트랜잭션
//!    - tx-scoped 쿼리 헬퍼는 `&mut PgTx`를 받음 → 경계 밖에서 호출 불가
//!    - early return 시 Transaction drop이 자동 롤백
//!
//! Q: 커넥션 풀은 어떻게 관리하는가?
//! A: SQLx의 PgPool 사용
//!    - 최소/최대 커넥션 수 설정
//!    - 커넥션 재사용 (오버헤드 감소)
//!    - 자동 health check
//!    - 타임아웃 처리

mod models;
pub mod orders;
pub mod payouts;
pub mod projects;
pub mod repository;
pub mod wallets;

pub use models::*;

use anyhow::Result;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};
use uuid::Uuid;

/// 트랜잭션 타입 별칭 (tx-scoped 쿼리 헬퍼의 시그니처용)
pub type PgTx<'a> = Transaction<'a, Postgres>;

/// 데이터베이스 연결 및 쿼리 담당
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 데이터베이스 연결
    ///
    /// # Connection Pool Settings
    ///
    /// - max_connections: 10 (트래픽에 따라 조정)
    /// - min_connections: 1 (idle 시 최소 유지)
    /// - acquire_timeout: 3초 (커넥션 획득 대기)
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(3))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// 마이그레이션 실행
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await?;
        Ok(())
    }

    /// Health check
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 트랜잭션 시작 - commit 전 drop되면 자동 롤백
    pub async fn begin(&self) -> Result<PgTx<'_>, sqlx::Error> {
        self.pool.begin().await
    }

    /// 사용자 조회
    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, role, country_code, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// 상품 조회
    pub async fn get_product(&self, product_id: Uuid) -> Result<Option<Product>, sqlx::Error> {
        sqlx::query_as::<_, Product>(
            r#"
            SELECT id, seller_id, name, description, price_minor, currency, stock, created_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// 장바구니 상품 일괄 조회 (fan-out 1단계)
    pub async fn get_products_by_ids(
        &self,
        product_ids: &[Uuid],
    ) -> Result<Vec<Product>, sqlx::Error> {
        sqlx::query_as::<_, Product>(
            r#"
            SELECT id, seller_id, name, description, price_minor, currency, stock, created_at
            FROM products
            WHERE id = ANY($1)
            "#,
        )
        .bind(product_ids)
        .fetch_all(&self.pool)
        .await
    }
}
