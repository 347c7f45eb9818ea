//! 予約フローの統合テスト
//!
//! インメモリ台帳を使い、並行予約・決済期限切れの掃除・価格の固定・REST API を検証する

use axum::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
use axum_test::TestServer;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;

use tour_booking_management::adapter::driven::{
    FixedClock, InMemoryBookingLedger, InMemoryTourCatalog, StaticIdentityProvider,
    TracingEventPublisher,
};
use tour_booking_management::adapter::driver::rest_api::{create_app, AppStateInner};
use tour_booking_management::application::service::{
    BookingApplicationService, BookingPolicy, BookingQueryService, CreateBookingCommand,
};
use tour_booking_management::application::ApplicationError;
use tour_booking_management::domain::error::DomainError;
use tour_booking_management::domain::event::CancellationActor;
use tour_booking_management::domain::model::{
    BookingStatus, Currency, DealState, GroupSize, Money, TourCapacityConfig, TourId, TravelerId,
    MAX_UNIT_PRICE,
};
use tour_booking_management::domain::port::BookingLedger;
use tour_booking_management::domain::service::CapacityGuard;

const TOKEN: &str = "traveler-token";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 0).unwrap()
}

fn start_time() -> DateTime<Utc> {
    now() + Duration::days(14)
}

struct Harness {
    service: Arc<BookingApplicationService>,
    ledger: Arc<InMemoryBookingLedger>,
    catalog: Arc<InMemoryTourCatalog>,
    clock: Arc<FixedClock>,
    traveler: TravelerId,
}

impl Harness {
    fn new() -> Self {
        let ledger = Arc::new(InMemoryBookingLedger::new());
        let catalog = Arc::new(InMemoryTourCatalog::new());
        let clock = Arc::new(FixedClock::new(now()));
        let service = Arc::new(BookingApplicationService::new(
            ledger.clone(),
            catalog.clone(),
            Arc::new(TracingEventPublisher::new()),
            clock.clone(),
            BookingPolicy::default(),
        ));
        Self {
            service,
            ledger,
            catalog,
            clock,
            traveler: TravelerId::new(),
        }
    }

    fn add_tour(&self, deal_state: DealState, min: u32, max: u32) -> TourCapacityConfig {
        let config = TourCapacityConfig::new(
            TourId::new(),
            GroupSize::new(min, max).unwrap(),
            Money::new(10_000, Currency::new("USD").unwrap()).unwrap(),
            deal_state,
            vec![start_time(), start_time() + Duration::days(7)],
        )
        .unwrap();
        self.catalog.insert(config.clone());
        config
    }

    fn command(&self, config: &TourCapacityConfig, headcount: u32) -> CreateBookingCommand {
        CreateBookingCommand {
            tour_id: config.tour_id(),
            traveler_id: self.traveler,
            headcount,
            selected_start_time: start_time(),
            offered_price: None,
            special_requests: None,
        }
    }

    async fn confirmed_headcount(&self, config: &TourCapacityConfig) -> u32 {
        self.ledger
            .counter_for(config.tour_id(), config.max_group())
            .await
            .unwrap()
            .confirmed_headcount()
    }

    fn server(&self) -> TestServer {
        self.server_with(StaticIdentityProvider::new().with_token(TOKEN, self.traveler))
    }

    fn server_with(&self, identity_provider: StaticIdentityProvider) -> TestServer {
        let state = AppStateInner {
            booking_service: self.service.clone(),
            booking_query_service: Arc::new(BookingQueryService::new(self.ledger.clone())),
            identity_provider: Arc::new(identity_provider),
        };
        TestServer::new(create_app(state)).unwrap()
    }
}

fn bearer() -> HeaderValue {
    bearer_for(TOKEN)
}

fn bearer_for(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
}

// 並行予約

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bookings_exactly_one_fits() {
    // 定員4に3名と2名が同時に申し込むと、成功するのは必ず一方だけ
    for _ in 0..50 {
        let harness = Harness::new();
        let config = harness.add_tour(DealState::DropIn, 1, 4);

        let a = {
            let service = harness.service.clone();
            let command = harness.command(&config, 3);
            tokio::spawn(async move { service.create_booking(command).await })
        };
        let b = {
            let service = harness.service.clone();
            let command = harness.command(&config, 2);
            tokio::spawn(async move { service.create_booking(command).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(succeeded, 1);
        assert!(results.iter().any(|r| matches!(
            r,
            Err(ApplicationError::DomainError(DomainError::CapacityExceeded { .. }))
        )));

        let held = harness.confirmed_headcount(&config).await;
        assert!(held == 3 || held == 2);
        assert!(held <= config.max_group());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_many_concurrent_single_seat_bookings_never_oversell() {
    let harness = Harness::new();
    let config = harness.add_tour(DealState::EarlyBird { floor_price: 7_000 }, 1, 10);

    let mut handles = Vec::new();
    for _ in 0..40 {
        let service = harness.service.clone();
        let command = harness.command(&config, 1);
        handles.push(tokio::spawn(async move {
            service.create_booking(command).await
        }));
    }

    let mut succeeded = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(ApplicationError::DomainError(DomainError::CapacityExceeded { .. })) => {
                rejected += 1
            }
            Err(other) => panic!("想定外のエラー: {:?}", other),
        }
    }

    assert_eq!(succeeded, 10);
    assert_eq!(rejected, 30);
    assert_eq!(harness.confirmed_headcount(&config).await, 10);
    assert_eq!(
        harness
            .ledger
            .list_by_tour(config.tour_id())
            .await
            .unwrap()
            .len(),
        10
    );
}

// 決済期限切れ

#[tokio::test]
async fn test_stale_pending_booking_is_swept() {
    let harness = Harness::new();
    let config = harness.add_tour(DealState::DropIn, 1, 6);

    let booking = harness
        .service
        .create_booking(harness.command(&config, 4))
        .await
        .unwrap();
    assert_eq!(harness.confirmed_headcount(&config).await, 4);

    // 期限切れ前の掃除では何も起きない
    harness.clock.advance(Duration::minutes(10));
    assert_eq!(harness.service.sweep_stale_pending().await.unwrap(), 0);

    harness.clock.advance(Duration::minutes(5));
    assert_eq!(harness.service.sweep_stale_pending().await.unwrap(), 1);
    assert_eq!(harness.confirmed_headcount(&config).await, 0);

    let swept = harness
        .service
        .get_booking(booking.id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(swept.status(), BookingStatus::Cancelled);
    assert!(swept.cancelled_at().is_some());

    // 解放された座席は再び予約できる
    let retry = harness
        .service
        .create_booking(harness.command(&config, 6))
        .await;
    assert!(retry.is_ok());
}

#[tokio::test]
async fn test_release_through_guard_is_idempotent() {
    let harness = Harness::new();
    let config = harness.add_tour(DealState::DropIn, 1, 8);
    let booking = harness
        .service
        .create_booking(harness.command(&config, 5))
        .await
        .unwrap();

    let guard = CapacityGuard::new(harness.ledger.clone());
    assert!(guard.release(booking.id()).await.unwrap());
    assert!(!guard.release(booking.id()).await.unwrap());
    assert_eq!(harness.confirmed_headcount(&config).await, 0);

    // キャンセルしても二重に解放されない
    harness
        .service
        .cancel_booking(booking.id(), CancellationActor::System)
        .await
        .unwrap();
    assert_eq!(harness.confirmed_headcount(&config).await, 0);
}

// 価格

#[tokio::test]
async fn test_price_is_frozen_at_confirmation() {
    let harness = Harness::new();
    let config = harness.add_tour(DealState::EarlyBird { floor_price: 7_000 }, 1, 10);

    let first = harness
        .service
        .create_booking(harness.command(&config, 5))
        .await
        .unwrap();
    let confirmed = harness.service.confirm_booking(first.id()).await.unwrap();
    assert_eq!(confirmed.price_at_booking().unwrap().amount(), 8_500);
    assert_eq!(confirmed.total_price().unwrap().amount(), 42_500);

    // 残りの座席が埋まり、現在価格は下限まで下がる
    let second = harness
        .service
        .create_booking(harness.command(&config, 5))
        .await
        .unwrap();
    let availability = harness.service.availability(config.tour_id()).await.unwrap();
    assert_eq!(availability.quote.price().unwrap().amount(), 7_000);
    assert!(availability.counter.is_fully_booked());

    let second = harness.service.confirm_booking(second.id()).await.unwrap();
    assert_eq!(second.price_at_booking().unwrap().amount(), 7_000);

    let first = harness
        .service
        .get_booking(first.id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.price_at_booking().unwrap().amount(), 8_500);
}

#[tokio::test]
async fn test_pay_what_you_want_uses_offered_price() {
    let harness = Harness::new();
    let config = harness.add_tour(DealState::PayWhatYouWant, 1, 10);

    let mut command = harness.command(&config, 2);
    command.offered_price = Some(1_234);
    let booking = harness.service.create_booking(command).await.unwrap();

    let confirmed = harness.service.confirm_booking(booking.id()).await.unwrap();
    assert_eq!(confirmed.price_at_booking().unwrap().amount(), 1_234);

    // 価格自由ツアーでは希望価格が必須
    let missing = harness
        .service
        .create_booking(harness.command(&config, 1))
        .await;
    assert!(matches!(
        missing,
        Err(ApplicationError::DomainError(DomainError::Validation(_)))
    ));
}

// REST API

#[tokio::test]
async fn test_http_booking_lifecycle() {
    let harness = Harness::new();
    let config = harness.add_tour(DealState::EarlyBird { floor_price: 7_000 }, 1, 10);
    let server = harness.server();

    let created = server
        .post(&format!("/tours/book/{}", config.tour_id()))
        .add_header(AUTHORIZATION, bearer())
        .json(&json!({
            "headcount": 2,
            "selectedStartTime": start_time().to_rfc3339(),
            "specialRequests": "  window seat  "
        }))
        .await;
    assert_eq!(created.status_code(), StatusCode::CREATED);
    let body: Value = created.json();
    assert_eq!(body["status"], "pending");
    assert_eq!(body["headcount"], 2);
    assert_eq!(body["specialRequests"], "window seat");
    assert!(body["priceAtBooking"].is_null());
    let booking_id = body["id"].as_str().unwrap().to_string();

    let availability: Value = server
        .get(&format!("/tours/{}/availability", config.tour_id()))
        .await
        .json();
    assert_eq!(availability["confirmedHeadcount"], 2);
    assert_eq!(availability["spotsLeft"], 8);
    assert_eq!(availability["progressPercentage"], 20);
    assert_eq!(availability["currentPrice"], 9_400);

    let confirmed = server
        .patch(&format!("/bookings/{}/status", booking_id))
        .add_header(AUTHORIZATION, bearer())
        .json(&json!({ "status": "confirmed" }))
        .await;
    assert_eq!(confirmed.status_code(), StatusCode::OK);
    let body: Value = confirmed.json();
    assert_eq!(body["status"], "confirmed");
    assert_eq!(body["priceAtBooking"], 9_400);
    assert_eq!(body["totalPrice"], 18_800);

    // 確定済みを pending に戻すことはできない
    let back = server
        .patch(&format!("/bookings/{}/status", booking_id))
        .add_header(AUTHORIZATION, bearer())
        .json(&json!({ "status": "pending" }))
        .await;
    assert_eq!(back.status_code(), StatusCode::CONFLICT);
    let body: Value = back.json();
    assert_eq!(body["code"], "INVALID_TRANSITION");

    let cancelled = server
        .patch(&format!("/bookings/{}/status", booking_id))
        .add_header(AUTHORIZATION, bearer())
        .json(&json!({ "status": "cancelled" }))
        .await;
    assert_eq!(cancelled.status_code(), StatusCode::OK);
    assert_eq!(harness.confirmed_headcount(&config).await, 0);

    let fetched: Value = server.get(&format!("/bookings/{}", booking_id)).await.json();
    assert_eq!(fetched["status"], "cancelled");
    assert_eq!(fetched["priceAtBooking"], 9_400);
}

#[tokio::test]
async fn test_http_capacity_exceeded_and_validation() {
    let harness = Harness::new();
    let config = harness.add_tour(DealState::DropIn, 2, 4);
    let server = harness.server();
    let path = format!("/tours/book/{}", config.tour_id());

    let first = server
        .post(&path)
        .add_header(AUTHORIZATION, bearer())
        .json(&json!({ "headcount": 3, "selectedStartTime": start_time().to_rfc3339() }))
        .await;
    assert_eq!(first.status_code(), StatusCode::CREATED);

    let full = server
        .post(&path)
        .add_header(AUTHORIZATION, bearer())
        .json(&json!({ "headcount": 2, "selectedStartTime": start_time().to_rfc3339() }))
        .await;
    assert_eq!(full.status_code(), StatusCode::CONFLICT);
    let body: Value = full.json();
    assert_eq!(body["code"], "CAPACITY_EXCEEDED");

    // 最小催行人数未満
    let too_small = server
        .post(&path)
        .add_header(AUTHORIZATION, bearer())
        .json(&json!({ "headcount": 1, "selectedStartTime": start_time().to_rfc3339() }))
        .await;
    assert_eq!(too_small.status_code(), StatusCode::BAD_REQUEST);

    // 人数の上限
    let too_large = server
        .post(&path)
        .add_header(AUTHORIZATION, bearer())
        .json(&json!({ "headcount": 21, "selectedStartTime": start_time().to_rfc3339() }))
        .await;
    assert_eq!(too_large.status_code(), StatusCode::BAD_REQUEST);

    // ツアーに存在しない開始日時
    let wrong_time = server
        .post(&path)
        .add_header(AUTHORIZATION, bearer())
        .json(&json!({
            "headcount": 2,
            "selectedStartTime": (start_time() + Duration::hours(1)).to_rfc3339()
        }))
        .await;
    assert_eq!(wrong_time.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = wrong_time.json();
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let unknown_tour = server
        .post(&format!("/tours/book/{}", TourId::new()))
        .add_header(AUTHORIZATION, bearer())
        .json(&json!({ "headcount": 2, "selectedStartTime": start_time().to_rfc3339() }))
        .await;
    assert_eq!(unknown_tour.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_http_requires_bearer_token() {
    let harness = Harness::new();
    let config = harness.add_tour(DealState::DropIn, 1, 4);
    let server = harness.server();

    let response = server
        .post(&format!("/tours/book/{}", config.tour_id()))
        .json(&json!({ "headcount": 1, "selectedStartTime": start_time().to_rfc3339() }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["code"], "UNAUTHORIZED");

    let response = server
        .post(&format!("/tours/book/{}", config.tour_id()))
        .add_header(AUTHORIZATION, HeaderValue::from_static("Bearer nope"))
        .json(&json!({ "headcount": 1, "selectedStartTime": start_time().to_rfc3339() }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(harness.confirmed_headcount(&config).await, 0);
}

#[tokio::test]
async fn test_http_other_traveler_cannot_change_booking() {
    let harness = Harness::new();
    let config = harness.add_tour(DealState::DropIn, 1, 4);
    let booking = harness
        .service
        .create_booking(harness.command(&config, 3))
        .await
        .unwrap();
    let server = harness.server_with(
        StaticIdentityProvider::new()
            .with_token(TOKEN, harness.traveler)
            .with_token("other-token", TravelerId::new()),
    );
    let path = format!("/bookings/{}/status", booking.id());

    for status in ["cancelled", "confirmed"] {
        let response = server
            .patch(&path)
            .add_header(AUTHORIZATION, bearer_for("other-token"))
            .json(&json!({ "status": status }))
            .await;
        assert_eq!(response.status_code(), StatusCode::FORBIDDEN, "{}", status);
        let body: Value = response.json();
        assert_eq!(body["code"], "FORBIDDEN");
    }

    let stored: Value = server.get(&format!("/bookings/{}", booking.id())).await.json();
    assert_eq!(stored["status"], "pending");
    assert_eq!(harness.confirmed_headcount(&config).await, 3);

    // 予約者本人はキャンセルできる
    let own = server
        .patch(&path)
        .add_header(AUTHORIZATION, bearer())
        .json(&json!({ "status": "cancelled" }))
        .await;
    assert_eq!(own.status_code(), StatusCode::OK);
    assert_eq!(harness.confirmed_headcount(&config).await, 0);
}

#[tokio::test]
async fn test_http_cancel_stale_pending_returns_expired_booking() {
    let harness = Harness::new();
    let config = harness.add_tour(DealState::DropIn, 1, 4);
    let booking = harness
        .service
        .create_booking(harness.command(&config, 2))
        .await
        .unwrap();
    let server = harness.server();

    harness.clock.advance(Duration::minutes(16));
    let response = server
        .patch(&format!("/bookings/{}/status", booking.id()))
        .add_header(AUTHORIZATION, bearer())
        .json(&json!({ "status": "cancelled" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "cancelled");
    assert_eq!(harness.confirmed_headcount(&config).await, 0);

    // 取消済みを再度キャンセルすると遷移エラー
    let again = server
        .patch(&format!("/bookings/{}/status", booking.id()))
        .add_header(AUTHORIZATION, bearer())
        .json(&json!({ "status": "cancelled" }))
        .await;
    assert_eq!(again.status_code(), StatusCode::CONFLICT);
    assert_eq!(harness.confirmed_headcount(&config).await, 0);
}

#[tokio::test]
async fn test_http_cancel_after_start_time_is_rejected() {
    let harness = Harness::new();
    let config = harness.add_tour(DealState::DropIn, 1, 4);
    let booking = harness
        .service
        .create_booking(harness.command(&config, 2))
        .await
        .unwrap();
    harness.service.confirm_booking(booking.id()).await.unwrap();
    let server = harness.server();

    harness.clock.advance(Duration::days(14));
    let response = server
        .patch(&format!("/bookings/{}/status", booking.id()))
        .add_header(AUTHORIZATION, bearer())
        .json(&json!({ "status": "cancelled" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(harness.confirmed_headcount(&config).await, 2);

    let completed = server
        .patch(&format!("/bookings/{}/status", booking.id()))
        .add_header(AUTHORIZATION, bearer())
        .json(&json!({ "status": "completed" }))
        .await;
    assert_eq!(completed.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_http_offered_price_above_cap_is_rejected() {
    let harness = Harness::new();
    let config = harness.add_tour(DealState::PayWhatYouWant, 1, 20);
    let server = harness.server();
    let path = format!("/tours/book/{}", config.tour_id());

    let huge = server
        .post(&path)
        .add_header(AUTHORIZATION, bearer())
        .json(&json!({
            "headcount": 20,
            "selectedStartTime": start_time().to_rfc3339(),
            "headcountPrice": i64::MAX
        }))
        .await;
    assert_eq!(huge.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = huge.json();
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(harness.confirmed_headcount(&config).await, 0);

    // 上限ちょうどなら最大人数でも合計が収まる
    let created = server
        .post(&path)
        .add_header(AUTHORIZATION, bearer())
        .json(&json!({
            "headcount": 20,
            "selectedStartTime": start_time().to_rfc3339(),
            "headcountPrice": MAX_UNIT_PRICE
        }))
        .await;
    assert_eq!(created.status_code(), StatusCode::CREATED);
    let booking_id = created.json::<Value>()["id"].as_str().unwrap().to_string();

    let confirmed = server
        .patch(&format!("/bookings/{}/status", booking_id))
        .add_header(AUTHORIZATION, bearer())
        .json(&json!({ "status": "confirmed" }))
        .await;
    assert_eq!(confirmed.status_code(), StatusCode::OK);
    let body: Value = confirmed.json();
    assert_eq!(body["priceAtBooking"], MAX_UNIT_PRICE);
    assert_eq!(body["totalPrice"], MAX_UNIT_PRICE * 20);
}

#[tokio::test]
async fn test_http_list_bookings_with_paging() {
    let harness = Harness::new();
    let config = harness.add_tour(DealState::DropIn, 1, 20);
    for headcount in 1..=5 {
        harness
            .service
            .create_booking(harness.command(&config, headcount))
            .await
            .unwrap();
        harness.clock.advance(Duration::seconds(1));
    }
    let server = harness.server();

    let page: Value = server
        .get(&format!(
            "/bookings?tourId={}&page=2&limit=2&sortBy=headcount&sortOrder=asc",
            config.tour_id()
        ))
        .await
        .json();
    assert_eq!(page["meta"]["page"], 2);
    assert_eq!(page["meta"]["limit"], 2);
    assert_eq!(page["meta"]["total"], 5);
    assert_eq!(page["meta"]["totalPages"], 3);
    let headcounts: Vec<i64> = page["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["headcount"].as_i64().unwrap())
        .collect();
    assert_eq!(headcounts, vec![3, 4]);

    let filtered: Value = server
        .get("/bookings?minHeadcount=4&status=pending")
        .await
        .json();
    assert_eq!(filtered["meta"]["total"], 2);

    for bad in [
        "/bookings?limit=101",
        "/bookings?page=0",
        "/bookings?minPrice=500&maxPrice=100",
        "/bookings?status=shipped",
        "/bookings?sortBy=nonsense",
        "/bookings?tourId=not-a-uuid",
    ] {
        let response = server.get(bad).await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST, "{}", bad);
    }
}

#[tokio::test]
async fn test_http_health_and_not_found() {
    let harness = Harness::new();
    let server = harness.server();

    let health: Value = server.get("/health").await.json();
    assert_eq!(health["status"], "healthy");

    let missing = server
        .get(&format!("/bookings/{}", uuid::Uuid::new_v4()))
        .await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

    let invalid = server.get("/bookings/not-a-uuid").await;
    assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);
}
