//! Order / Escrow / Payment Queries
//!
//! 상태 전이는 반드시 row-level lock 아래에서 일어난다:
//! 서비스 레이어가 `lock_order` / `lock_escrow_by_order`로 행을 잠근 뒤
//! guard를 검사하고 상태를 갱신함. 동시 전이는 post-commit 상태를 보거나
//! InvalidTransition으로 끝난다.

use uuid::Uuid;

use super::{Database, Escrow, Order, OrderItem, Payment, PgTx};

/// 주문 INSERT 파라미터
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: Uuid,
    pub order_number: String,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub product_id: Option<Uuid>,
    pub item_name: String,
    pub item_description: Option<String>,
    pub item_cost_minor: i64,
    pub service_fee_minor: i64,
    pub total_minor: i64,
    pub currency: String,
    pub payment_method: Option<String>,
    pub payment_provider: Option<String>,
    pub payment_reference: Option<String>,
}

/// 주문 생성 (status = pending)
pub async fn insert_order(tx: &mut PgTx<'_>, order: &NewOrder) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO orders
            (id, order_number, buyer_id, seller_id, product_id, item_name,
             item_description, item_cost_minor, service_fee_minor, total_minor,
             currency, status, payment_method, payment_provider, payment_reference,
             created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                'pending', $12, $13, $14, NOW(), NOW())
        "#,
    )
    .bind(order.id)
    .bind(&order.order_number)
    .bind(order.buyer_id)
    .bind(order.seller_id)
    .bind(order.product_id)
    .bind(&order.item_name)
    .bind(&order.item_description)
    .bind(order.item_cost_minor)
    .bind(order.service_fee_minor)
    .bind(order.total_minor)
    .bind(&order.currency)
    .bind(&order.payment_method)
    .bind(&order.payment_provider)
    .bind(&order.payment_reference)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// 주문 라인 기록 (결제 완료 시 재고 차감에 사용)
pub async fn insert_order_item(
    tx: &mut PgTx<'_>,
    order_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    unit_price_minor: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO order_items (order_id, product_id, quantity, unit_price_minor)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(order_id)
    .bind(product_id)
    .bind(quantity)
    .bind(unit_price_minor)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// 주문 행 잠금
pub async fn lock_order(tx: &mut PgTx<'_>, order_id: Uuid) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as::<_, Order>(
        r#"
        SELECT id, order_number, buyer_id, seller_id, product_id, item_name,
               item_description, item_cost_minor, service_fee_minor, total_minor,
               currency, status, payment_method, payment_provider, payment_reference,
               created_at, updated_at
        FROM orders
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(order_id)
    .fetch_optional(&mut **tx)
    .await
}

/// 결제 reference에 연결된 pending 주문 전부 잠금 (cart 완료 처리)
///
/// 주문은 fan-out 시 저장된 명시적 payment_reference로 연결됨 -
/// "최근 주문" 같은 시간 기반 휴리스틱은 쓰지 않는다.
pub async fn lock_pending_orders_by_reference(
    tx: &mut PgTx<'_>,
    payment_reference: &str,
) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as::<_, Order>(
        r#"
        SELECT id, order_number, buyer_id, seller_id, product_id, item_name,
               item_description, item_cost_minor, service_fee_minor, total_minor,
               currency, status, payment_method, payment_provider, payment_reference,
               created_at, updated_at
        FROM orders
        WHERE payment_reference = $1 AND status = 'pending'
        ORDER BY created_at
        FOR UPDATE
        "#,
    )
    .bind(payment_reference)
    .fetch_all(&mut **tx)
    .await
}

/// 주문 상태 갱신
pub async fn set_order_status(
    tx: &mut PgTx<'_>,
    order_id: Uuid,
    status: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1
        "#,
    )
    .bind(order_id)
    .bind(status)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// 주문 라인 조회 (트랜잭션 내부 - 재고 차감 직전)
pub async fn get_order_items(
    tx: &mut PgTx<'_>,
    order_id: Uuid,
) -> Result<Vec<OrderItem>, sqlx::Error> {
    sqlx::query_as::<_, OrderItem>(
        r#"
        SELECT order_id, product_id, quantity, unit_price_minor
        FROM order_items
        WHERE order_id = $1
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut **tx)
    .await
}

/// guarded 재고 차감
///
/// `UPDATE ... WHERE stock >= n` - 영향받은 행이 0이면 재고 부족.
/// 동시 구매 두 건이 남은 재고를 둘 다 가져가는 것을 방지함.
pub async fn decrement_stock(
    tx: &mut PgTx<'_>,
    product_id: Uuid,
    quantity: i32,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE products
        SET stock = stock - $2
        WHERE id = $1 AND stock >= $2
        "#,
    )
    .bind(product_id)
    .bind(quantity)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// 에스크로 생성 (status = held)
pub async fn insert_escrow(
    tx: &mut PgTx<'_>,
    order_id: Uuid,
    amount_minor: i64,
    currency: &str,
    auto_release_days: i32,
) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO escrows
            (id, order_id, amount_minor, currency, status, auto_release_days,
             requires_buyer_approval, requires_delivery_confirmation,
             buyer_approved, delivery_confirmed, created_at)
        VALUES ($1, $2, $3, $4, 'held', $5, TRUE, TRUE, FALSE, FALSE, NOW())
        "#,
    )
    .bind(id)
    .bind(order_id)
    .bind(amount_minor)
    .bind(currency)
    .bind(auto_release_days)
    .execute(&mut **tx)
    .await?;
    Ok(id)
}

/// 주문의 에스크로 행 잠금
pub async fn lock_escrow_by_order(
    tx: &mut PgTx<'_>,
    order_id: Uuid,
) -> Result<Option<Escrow>, sqlx::Error> {
    sqlx::query_as::<_, Escrow>(
        r#"
        SELECT id, order_id, amount_minor, currency, status, auto_release_days,
               requires_buyer_approval, requires_delivery_confirmation,
               buyer_approved, delivery_confirmed, dispute_reason,
               created_at, buyer_approved_at, released_at, refunded_at
        FROM escrows
        WHERE order_id = $1
        FOR UPDATE
        "#,
    )
    .bind(order_id)
    .fetch_optional(&mut **tx)
    .await
}

/// 에스크로 해제 기록
///
/// 불변식 E1: terminal 상태에서는 timestamp 하나만 설정됨
pub async fn mark_escrow_released(
    tx: &mut PgTx<'_>,
    escrow_id: Uuid,
    buyer_approved: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE escrows
        SET status = 'released',
            released_at = NOW(),
            buyer_approved = $2,
            buyer_approved_at = CASE WHEN $2 THEN NOW() ELSE buyer_approved_at END,
            delivery_confirmed = $2 OR delivery_confirmed
        WHERE id = $1
        "#,
    )
    .bind(escrow_id)
    .bind(buyer_approved)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// 에스크로 환불 기록
pub async fn mark_escrow_refunded(tx: &mut PgTx<'_>, escrow_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE escrows SET status = 'refunded', refunded_at = NOW() WHERE id = $1
        "#,
    )
    .bind(escrow_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// 분쟁 기록 - release 경로를 동결함
pub async fn mark_escrow_disputed(
    tx: &mut PgTx<'_>,
    escrow_id: Uuid,
    reason: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE escrows SET status = 'disputed', dispute_reason = $2 WHERE id = $1
        "#,
    )
    .bind(escrow_id)
    .bind(reason)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// 인바운드 결제 기록 생성
#[allow(clippy::too_many_arguments)]
pub async fn insert_payment(
    tx: &mut PgTx<'_>,
    order_id: Option<Uuid>,
    amount_minor: i64,
    currency: &str,
    payment_method: &str,
    payment_provider: &str,
    provider_reference: &str,
    provider_transaction_id: Option<&str>,
) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO payments
            (id, order_id, amount_minor, currency, payment_method, payment_provider,
             provider_reference, provider_transaction_id, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', NOW(), NOW())
        "#,
    )
    .bind(id)
    .bind(order_id)
    .bind(amount_minor)
    .bind(currency)
    .bind(payment_method)
    .bind(payment_provider)
    .bind(provider_reference)
    .bind(provider_transaction_id)
    .execute(&mut **tx)
    .await?;
    Ok(id)
}

/// reference로 결제 행 잠금 (webhook 완료 처리의 직렬화 지점)
pub async fn lock_payment_by_reference(
    tx: &mut PgTx<'_>,
    provider_reference: &str,
) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as::<_, Payment>(
        r#"
        SELECT id, order_id, amount_minor, currency, payment_method, payment_provider,
               provider_reference, provider_transaction_id, status, created_at, updated_at
        FROM payments
        WHERE provider_reference = $1
        FOR UPDATE
        "#,
    )
    .bind(provider_reference)
    .fetch_optional(&mut **tx)
    .await
}

/// 결제 상태 갱신
pub async fn set_payment_status(
    tx: &mut PgTx<'_>,
    payment_id: Uuid,
    status: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE payments SET status = $2, updated_at = NOW() WHERE id = $1
        "#,
    )
    .bind(payment_id)
    .bind(status)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// 주문에 성공한 결제가 존재하는지 (cancel guard)
pub async fn has_successful_payment(
    tx: &mut PgTx<'_>,
    order_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let row: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM payments WHERE order_id = $1 AND status = 'success'
        "#,
    )
    .bind(order_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(row.0 > 0)
}

impl Database {
    /// held 상태 에스크로 수 (헬스/운영 지표)
    pub async fn count_held_escrows(&self) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM escrows WHERE status = 'held'")
            .fetch_one(self.pool())
            .await?;
        Ok(row.0)
    }

    /// 주문 조회
    pub async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, sqlx::Error> {
        sqlx::query_as::<_, Order>(
            r#"
            SELECT id, order_number, buyer_id, seller_id, product_id, item_name,
                   item_description, item_cost_minor, service_fee_minor, total_minor,
                   currency, status, payment_method, payment_provider, payment_reference,
                   created_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(self.pool())
        .await
    }

    /// 주문의 에스크로 조회
    pub async fn get_escrow_by_order(&self, order_id: Uuid) -> Result<Option<Escrow>, sqlx::Error> {
        sqlx::query_as::<_, Escrow>(
            r#"
            SELECT id, order_id, amount_minor, currency, status, auto_release_days,
                   requires_buyer_approval, requires_delivery_confirmation,
                   buyer_approved, delivery_confirmed, dispute_reason,
                   created_at, buyer_approved_at, released_at, refunded_at
            FROM escrows
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(self.pool())
        .await
    }

    /// auto-release 대상 후보 스캔
    ///
    /// held 상태이고 보관 기간이 지난 에스크로의 order_id 목록.
    /// 후보일 뿐이며, 실제 해제는 행 잠금 후 guard를 다시 검사함
    /// (disputed 전이/이미 해제된 경우는 그때 걸러짐).
    pub async fn list_auto_release_candidates(&self) -> Result<Vec<Uuid>, sqlx::Error> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT order_id
            FROM escrows
            WHERE status = 'held'
              AND created_at + make_interval(days => auto_release_days) <= NOW()
            ORDER BY created_at
            "#,
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// reference로 결제 조회
    pub async fn get_payment_by_reference(
        &self,
        provider_reference: &str,
    ) -> Result<Option<Payment>, sqlx::Error> {
        sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, order_id, amount_minor, currency, payment_method, payment_provider,
                   provider_reference, provider_transaction_id, status, created_at, updated_at
            FROM payments
            WHERE provider_reference = $1
            "#,
        )
        .bind(provider_reference)
        .fetch_optional(self.pool())
        .await
    }
}
