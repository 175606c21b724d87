//! Avalanche Escrow Core API Server
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 API Gateway (auth, rate limit)               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum Web Server                         │
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                      Routes Layer                        ││
//! │  │  /orders/*  /cart/*  /projects/*  /wallet/*  /payouts/* ││
//! │  └─────────────────────────────────────────────────────────┘│
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                    Services Layer                        ││
//! │  │  WalletLedger  EscrowSM  ProjectSM  CartFanOut  Payout  ││
//! │  └─────────────────────────────────────────────────────────┘│
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                    Data Layer                            ││
//! │  │  PostgreSQL (row locks, append-only ledger)             ││
//! │  └─────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────┘
//!                   │                        │
//!                   ▼                        ▼
//!        ┌──────────────────┐     ┌──────────────────┐
//!        │  Stripe (card/   │     │  Paystack        │
//!        │  ACH, checkout)  │     │  (NG/GH/ZA/KE)   │
//!        └──────────────────┘     └──────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// 라이브러리에서 가져오기
use avalanche_api::{
    routes, services, AppState, Config, Database, PaystackGateway, StripeGateway,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 환경변수 로드
    dotenvy::dotenv().ok();

    // 로깅 초기화
    // RUST_LOG=debug,sqlx=warn 형태로 레벨 제어 가능
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "avalanche_api=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("🚀 Starting Avalanche Escrow Core API Server");

    // 설정 로드
    let config = Config::from_env()?;
    tracing::info!("📋 Configuration loaded");

    // 데이터베이스 연결
    let db = Database::connect(&config.database_url).await?;
    tracing::info!("🗄️  Database connected");

    // 마이그레이션 실행
    db.run_migrations().await?;
    tracing::info!("📦 Migrations completed");

    // provider gateway 초기화
    let stripe = StripeGateway::new(&config.stripe_secret_key, &config.frontend_url);
    tracing::info!("💳 Stripe gateway initialized");

    let paystack = PaystackGateway::new(&config.paystack_secret_key);
    tracing::info!("🏦 Paystack gateway initialized");

    // 앱 상태 구성
    let state = AppState {
        db: Arc::new(db),
        stripe: Arc::new(stripe),
        paystack: Arc::new(paystack),
        config: Arc::new(config.clone()),
    };

    // 에스크로 auto-release 백그라운드 루프
    // 주기적 tick은 idempotent - 이미 해제된 에스크로는 건드리지 않음
    let tick_state = state.clone();
    let interval_secs = config.auto_release_interval_secs;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match services::escrow::auto_release_tick(&tick_state.db).await {
                Ok(report) if report.released > 0 => {
                    tracing::info!(released = report.released, "⏰ auto-release tick");
                }
                Ok(_) => {}
                Err(err) => tracing::error!(error = %err, "auto-release tick failed"),
            }
        }
    });
    tracing::info!("⏰ Auto-release loop started (every {}s)", interval_secs);

    // 라우터 구성
    let app = create_router(state);

    // 서버 시작
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🌐 Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// 라우터 생성
///
/// # Route Structure
///
/// ```text
/// GET  /health                          - 서버 상태 확인
///
/// POST /orders                          - 단일 주문 생성
/// GET  /orders/:id                      - 주문 조회
/// GET  /orders/:id/escrow               - 에스크로 조회
/// POST /orders/:id/confirm-delivery     - 구매자 수령 확인 (해제)
/// POST /orders/:id/dispute              - 분쟁 제기
/// POST /orders/:id/resolve-dispute      - 관리자 분쟁 해결
/// POST /orders/:id/cancel               - 주문 취소
///
/// POST /cart/checkout                   - 멀티 셀러 체크아웃
/// POST /cart/complete                   - 결제 완료 재시도 (idempotent)
///
/// POST /projects                        - 프로젝트 게시
/// GET  /projects/:id                    - 프로젝트 조회
/// POST /projects/:id/accept             - 프리랜서 수락
/// POST /projects/:id/agree-price        - 가격 합의
/// POST /projects/:id/fund-escrow        - 에스크로 펀딩
/// POST /projects/:id/submit-work        - 작업 제출
/// POST /projects/:id/approve-work       - 작업 승인
/// POST /projects/:id/release-payment    - 대금 지급
/// GET  /projects/:id/submissions        - 제출물 목록
///
/// GET  /wallet                          - 잔액 조회
/// GET  /wallet/history                  - 원장 히스토리
///
/// POST /payouts/account                 - payout 계좌 등록
/// GET  /payouts/account                 - payout 계좌 조회
/// POST /payouts/withdrawals             - 출금 요청
/// GET  /payouts/withdrawals/:id         - 출금 조회
/// POST /payouts/withdrawals/:id/process - 출금 디스패치
/// POST /payouts/withdrawals/:id/verify  - 출금 reconciliation
///
/// POST /webhooks/stripe                 - 인바운드 결제 webhook
/// POST /internal/escrow/auto-release    - auto-release tick (admin)
/// ```
fn create_router(state: AppState) -> Router {
    // CORS 설정
    // 프로덕션에서는 특정 도메인만 허용
    // 개발 환경에서는 localhost 허용
    use tower_http::cors::AllowOrigin;

    let cors = if state.config.is_production() {
        // 프로덕션: 특정 도메인만 허용 (환경변수로 설정)
        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "https://avalanche.example.com".to_string());
        let origins: Vec<_> = allowed_origins
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    } else {
        // 개발: localhost 허용
        CorsLayer::new()
            .allow_origin([
                "http://localhost:5173".parse().unwrap(),  // Vite dev server
                "http://localhost:3000".parse().unwrap(),  // Alternative
                "http://127.0.0.1:5173".parse().unwrap(),
            ])
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        // Health check
        .route("/health", get(routes::health::health_check))

        // Orders / escrow
        .route("/orders", post(routes::orders::create_order))
        .route("/orders/:id", get(routes::orders::get_order))
        .route("/orders/:id/escrow", get(routes::orders::get_order_escrow))
        .route("/orders/:id/confirm-delivery", post(routes::orders::confirm_delivery))
        .route("/orders/:id/dispute", post(routes::orders::raise_dispute))
        .route("/orders/:id/resolve-dispute", post(routes::orders::resolve_dispute))
        .route("/orders/:id/cancel", post(routes::orders::cancel_order))

        // Cart fan-out
        .route("/cart/checkout", post(routes::cart::checkout_cart))
        .route("/cart/complete", post(routes::cart::complete_payment))

        // Project workflow
        .route("/projects", post(routes::projects::post_project))
        .route("/projects/:id", get(routes::projects::get_project))
        .route("/projects/:id/accept", post(routes::projects::accept_project))
        .route("/projects/:id/agree-price", post(routes::projects::agree_price))
        .route("/projects/:id/fund-escrow", post(routes::projects::fund_escrow))
        .route("/projects/:id/submit-work", post(routes::projects::submit_work))
        .route("/projects/:id/approve-work", post(routes::projects::approve_work))
        .route("/projects/:id/release-payment", post(routes::projects::release_payment))
        .route("/projects/:id/submissions", get(routes::projects::get_submissions))

        // Wallet
        .route("/wallet", get(routes::wallet::get_wallet))
        .route("/wallet/history", get(routes::wallet::get_history))

        // Payouts
        .route(
            "/payouts/account",
            post(routes::payouts::add_payout_account).get(routes::payouts::get_payout_account),
        )
        .route("/payouts/withdrawals", post(routes::payouts::request_withdrawal))
        .route("/payouts/withdrawals/:id", get(routes::payouts::get_withdrawal))
        .route("/payouts/withdrawals/:id/process", post(routes::payouts::process_withdrawal))
        .route("/payouts/withdrawals/:id/verify", post(routes::payouts::verify_withdrawal))

        // Webhooks / internal
        .route("/webhooks/stripe", post(routes::webhooks::stripe_webhook))
        .route("/internal/escrow/auto-release", post(routes::orders::auto_release_tick))

        // 미들웨어
        .layer(TraceLayer::new_for_http())
        .layer(cors)

        // 상태 주입
        .with_state(state)
}
