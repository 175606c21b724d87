//! Cart Fan-out (C5)
//!
//! # Interview Q&A
//!
//! Q: 멀티 셀러 장바구니를 왜 주문 여러 개로 쪼개는가?
//! A: 에스크로는 판매자 단위로 해제/환불되기 때문
//!    - 판매자별 주문 1개 + 에스크로 1개, 결제는 aggregate 1건
//!    - 주문과 결제는 orders.payment_reference 컬럼으로 명시적 연결
//!
//! Q: 외부 결제 세션 생성과 DB 트랜잭션의 순서는?
//! A: provider 호출이 먼저, 그 결과를 트랜잭션 안에서 기록
//!    - 트랜잭션 중간에 외부 I/O가 끼면 커밋 지연 + 부분 상태 위험
//!    - 세션은 만들어졌는데 INSERT가 실패하면 세션은 그냥 만료됨 (무해)
//!
//! Q: complete_cart_payment가 두 번 호출되면?
//! A: payment 행 잠금 후 상태 검사 → 이미 success면 no-op
//!    - webhook 재전송, 수동 재시도 모두 안전

use chrono::Utc;
use uuid::Uuid;

use crate::db::{self, Database, Order, PaymentStatus, Product};
use crate::error::ApiError;
use crate::services::escrow;
use crate::services::stripe::StripeGateway;
use crate::types::{Currency, Money, Principal};

/// 장바구니 라인
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CheckoutItem {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// 체크아웃 요청
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub items: Vec<CheckoutItem>,
    pub payment_method: String,
    pub payment_provider: String,
}

/// 판매자별 그룹 (fan-out 단위)
#[derive(Debug, Clone)]
pub struct SellerGroup {
    pub seller_id: Uuid,
    pub lines: Vec<(Product, i32)>,
    pub subtotal: Money,
    pub service_fee: Money,
    pub total: Money,
}

/// 체크아웃 결과
#[derive(Debug, serde::Serialize)]
pub struct CheckoutSummary {
    pub checkout_session_id: String,
    pub order_ids: Vec<Uuid>,
    pub order_numbers: Vec<String>,
    pub total_amount_minor: i64,
    pub currency: String,
    pub payment_url: String,
}

/// cart 결제 reference 생성: STRIPE-CART-YYYYMMDDHHMMSS
pub fn generate_cart_reference() -> String {
    format!("STRIPE-CART-{}", Utc::now().format("%Y%m%d%H%M%S"))
}

/// 라인 검증 + 판매자별 그룹핑 + 금액 계산 (순수 함수)
///
/// - 누락 상품 → NotFound
/// - 재고 부족 → InsufficientStock (사전 검증; 확정 차감은 결제 완료 시)
/// - 통화 혼합 → CurrencyMismatch
pub fn build_seller_groups(
    products: &[Product],
    items: &[CheckoutItem],
) -> Result<Vec<SellerGroup>, ApiError> {
    if items.is_empty() {
        return Err(ApiError::ValidationError("cart is empty".to_string()));
    }

    let mut currency: Option<Currency> = None;
    // (seller_id → lines) - 입력 순서 유지
    let mut groups: Vec<(Uuid, Vec<(Product, i32)>)> = Vec::new();

    for item in items {
        if item.quantity <= 0 {
            return Err(ApiError::ValidationError("quantity must be positive".to_string()));
        }
        let product = products
            .iter()
            .find(|p| p.id == item.product_id)
            .ok_or_else(|| ApiError::NotFound("product".to_string()))?;

        if product.stock < item.quantity {
            return Err(ApiError::InsufficientStock(product.id.to_string()));
        }

        let product_currency = Currency::parse(&product.currency)
            .ok_or_else(|| ApiError::DatabaseError(format!("product {} has unknown currency", product.id)))?;
        match currency {
            None => currency = Some(product_currency),
            Some(c) if c != product_currency => return Err(ApiError::CurrencyMismatch),
            Some(_) => {}
        }

        match groups.iter_mut().find(|(s, _)| *s == product.seller_id) {
            Some((_, lines)) => lines.push((product.clone(), item.quantity)),
            None => groups.push((product.seller_id, vec![(product.clone(), item.quantity)])),
        }
    }

    let currency = currency.ok_or_else(|| ApiError::ValidationError("cart is empty".to_string()))?;

    groups
        .into_iter()
        .map(|(seller_id, lines)| {
            let mut subtotal = Money::zero(currency);
            for (product, quantity) in &lines {
                let line_total = Money::new(product.price_minor * *quantity as i64, currency);
                subtotal = subtotal.checked_add(line_total)?;
            }
            let service_fee = subtotal.service_fee();
            let total = subtotal.checked_add(service_fee)?;
            Ok(SellerGroup {
                seller_id,
                lines,
                subtotal,
                service_fee,
                total,
            })
        })
        .collect()
}

/// 그룹의 주문 표시 이름 ("Widget ×2, Gadget")
fn group_item_name(group: &SellerGroup) -> String {
    group
        .lines
        .iter()
        .map(|(product, quantity)| {
            if *quantity > 1 {
                format!("{} ×{}", product.name, quantity)
            } else {
                product.name.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// 멀티 셀러 체크아웃 (§4.5)
///
/// 판매자별 주문 N개 + aggregate 결제 1건을 하나의 트랜잭션으로 생성.
/// 전부 생성되거나 아무것도 생성되지 않음.
pub async fn checkout_cart(
    db: &Database,
    stripe: &StripeGateway,
    principal: Principal,
    req: CheckoutRequest,
) -> Result<CheckoutSummary, ApiError> {
    let product_ids: Vec<Uuid> = req.items.iter().map(|i| i.product_id).collect();
    let products = db.get_products_by_ids(&product_ids).await?;

    let groups = build_seller_groups(&products, &req.items)?;
    if groups.iter().any(|g| g.seller_id == principal.user_id) {
        return Err(ApiError::ValidationError(
            "cannot buy your own products".to_string(),
        ));
    }

    let currency = groups[0].subtotal.currency();
    let mut cart_total = Money::zero(currency);
    for group in &groups {
        cart_total = cart_total.checked_add(group.total)?;
    }

    let reference = generate_cart_reference();

    // 외부 세션은 트랜잭션 밖에서 먼저 생성, 결과만 안에서 기록
    let session = stripe
        .create_checkout_session(&reference, cart_total, principal.user_id)
        .await?;

    let mut tx = db.begin().await?;
    let mut order_ids = Vec::with_capacity(groups.len());
    let mut order_numbers = Vec::with_capacity(groups.len());

    for group in &groups {
        let order_id = Uuid::new_v4();
        let order_number = escrow::generate_order_number();
        let single_product = if group.lines.len() == 1 {
            Some(group.lines[0].0.id)
        } else {
            None
        };

        db::orders::insert_order(
            &mut tx,
            &db::orders::NewOrder {
                id: order_id,
                order_number: order_number.clone(),
                buyer_id: principal.user_id,
                seller_id: group.seller_id,
                product_id: single_product,
                item_name: group_item_name(group),
                item_description: None,
                item_cost_minor: group.subtotal.minor(),
                service_fee_minor: group.service_fee.minor(),
                total_minor: group.total.minor(),
                currency: currency.as_str().to_string(),
                payment_method: Some(req.payment_method.clone()),
                payment_provider: Some(req.payment_provider.clone()),
                payment_reference: Some(reference.clone()),
            },
        )
        .await?;

        for (product, quantity) in &group.lines {
            db::orders::insert_order_item(&mut tx, order_id, product.id, *quantity, product.price_minor)
                .await?;
        }

        order_ids.push(order_id);
        order_numbers.push(order_number);
    }

    db::orders::insert_payment(
        &mut tx,
        None,
        cart_total.minor(),
        currency.as_str(),
        &req.payment_method,
        &req.payment_provider,
        &reference,
        Some(&session.session_id),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(
        reference = %reference,
        orders = order_ids.len(),
        total = %cart_total.to_display(),
        "cart checkout created"
    );

    Ok(CheckoutSummary {
        checkout_session_id: reference,
        order_ids,
        order_numbers,
        total_amount_minor: cart_total.minor(),
        currency: currency.as_str().to_string(),
        payment_url: session.url,
    })
}

/// 결제 완료 처리 결과
#[derive(Debug, serde::Serialize)]
pub struct PaymentCompletion {
    pub reference: String,
    pub orders_paid: usize,
    pub already_completed: bool,
}

/// 외부 결제 성공 hook (§4.5) - idempotent
///
/// reference에 연결된 pending 주문 전부를 paid로 전이:
/// 주문별 에스크로 생성 + 재고 차감, 결제는 success로.
/// 어느 한 주문이라도 실패하면 전체 롤백 - 결제는 pending으로 남아
/// 재시도 가능.
pub async fn complete_cart_payment(
    db: &Database,
    reference: &str,
) -> Result<PaymentCompletion, ApiError> {
    let mut tx = db.begin().await?;

    let payment = db::orders::lock_payment_by_reference(&mut tx, reference)
        .await?
        .ok_or_else(|| ApiError::NotFound("payment".to_string()))?;

    let status = PaymentStatus::parse(&payment.status)
        .ok_or_else(|| ApiError::DatabaseError(format!("payment {} has unknown status", payment.id)))?;

    if status == PaymentStatus::Success {
        // 이미 처리됨 - webhook 재전송 등
        return Ok(PaymentCompletion {
            reference: reference.to_string(),
            orders_paid: 0,
            already_completed: true,
        });
    }
    if matches!(status, PaymentStatus::Failed | PaymentStatus::Cancelled) {
        return Err(ApiError::invalid_transition(payment.status.clone(), "complete_payment"));
    }

    // 단일 주문 결제(order_id 있음)와 cart aggregate 모두
    // orders.payment_reference로 연결됨
    let orders: Vec<Order> =
        db::orders::lock_pending_orders_by_reference(&mut tx, reference).await?;
    if orders.is_empty() {
        return Err(ApiError::NotFound("orders for payment reference".to_string()));
    }

    let orders_paid = orders.len();
    for order in &orders {
        escrow::apply_payment_success(&mut tx, order).await?;
    }

    db::orders::set_payment_status(&mut tx, payment.id, PaymentStatus::Success.as_str()).await?;
    tx.commit().await?;

    tracing::info!(reference = %reference, orders_paid, "payment completed, escrows held");

    Ok(PaymentCompletion {
        reference: reference.to_string(),
        orders_paid,
        already_completed: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn product(seller: Uuid, price_minor: i64, stock: i32) -> Product {
        Product {
            id: Uuid::new_v4(),
            seller_id: seller,
            name: "Widget".to_string(),
            description: None,
            price_minor,
            currency: "USD".to_string(),
            stock,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_cart_reference_format() {
        let r = generate_cart_reference();
        assert!(r.starts_with("STRIPE-CART-"));
        let ts = &r["STRIPE-CART-".len()..];
        assert_eq!(ts.len(), 14);
        assert!(ts.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_two_seller_fan_out_math() {
        // S1: $60 상품 1개 / S2: $30 + $10 → 주문 2건, 합계 105.00
        let s1 = Uuid::new_v4();
        let s2 = Uuid::new_v4();
        let p1 = product(s1, 6_000, 5);
        let p2 = product(s2, 3_000, 5);
        let p3 = product(s2, 1_000, 5);
        let products = vec![p1.clone(), p2.clone(), p3.clone()];
        let items = vec![
            CheckoutItem { product_id: p1.id, quantity: 1 },
            CheckoutItem { product_id: p2.id, quantity: 1 },
            CheckoutItem { product_id: p3.id, quantity: 1 },
        ];

        let groups = build_seller_groups(&products, &items).unwrap();
        assert_eq!(groups.len(), 2);

        let g1 = groups.iter().find(|g| g.seller_id == s1).unwrap();
        assert_eq!(g1.subtotal.minor(), 6_000);
        assert_eq!(g1.service_fee.minor(), 300);
        assert_eq!(g1.total.minor(), 6_300);

        let g2 = groups.iter().find(|g| g.seller_id == s2).unwrap();
        assert_eq!(g2.subtotal.minor(), 4_000);
        assert_eq!(g2.service_fee.minor(), 200);
        assert_eq!(g2.total.minor(), 4_200);

        let cart_total: i64 = groups.iter().map(|g| g.total.minor()).sum();
        assert_eq!(cart_total, 10_500);
    }

    #[test]
    fn test_quantity_multiplies_subtotal() {
        let seller = Uuid::new_v4();
        let p = product(seller, 2_500, 10);
        let items = vec![CheckoutItem { product_id: p.id, quantity: 3 }];
        let groups = build_seller_groups(&[p], &items).unwrap();
        assert_eq!(groups[0].subtotal.minor(), 7_500);
        assert_eq!(groups[0].service_fee.minor(), 375);
    }

    #[test]
    fn test_missing_product_rejected() {
        let items = vec![CheckoutItem { product_id: Uuid::new_v4(), quantity: 1 }];
        let err = build_seller_groups(&[], &items).unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn test_insufficient_stock_rejected() {
        let p = product(Uuid::new_v4(), 1_000, 2);
        let items = vec![CheckoutItem { product_id: p.id, quantity: 3 }];
        let err = build_seller_groups(&[p], &items).unwrap_err();
        assert!(matches!(err, ApiError::InsufficientStock(_)));
    }

    #[test]
    fn test_exactly_on_threshold_stock_allowed() {
        let p = product(Uuid::new_v4(), 1_000, 3);
        let items = vec![CheckoutItem { product_id: p.id, quantity: 3 }];
        assert!(build_seller_groups(&[p], &items).is_ok());
    }

    #[test]
    fn test_mixed_currency_rejected() {
        let s = Uuid::new_v4();
        let p1 = product(s, 1_000, 5);
        let mut p2 = product(s, 2_000, 5);
        p2.currency = "NGN".to_string();
        let items = vec![
            CheckoutItem { product_id: p1.id, quantity: 1 },
            CheckoutItem { product_id: p2.id, quantity: 1 },
        ];
        let err = build_seller_groups(&[p1, p2], &items).unwrap_err();
        assert!(matches!(err, ApiError::CurrencyMismatch));
    }

    #[test]
    fn test_empty_cart_rejected() {
        let err = build_seller_groups(&[], &[]).unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
    }
}
