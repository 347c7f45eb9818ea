use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::Json,
    routing::{get, patch, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, warn};
use uuid::Uuid;

use crate::adapter::driver::request_dto::{BookTourRequest, BookingsQueryParams, UpdateStatusRequest};
use crate::adapter::driver::response_dto::{
    AvailabilityResponse, BookingResponse, PagedBookingsResponse,
};
use crate::application::service::{
    BookingApplicationService, BookingQueryService, CreateBookingCommand,
};
use crate::application::ApplicationError;
use crate::domain::error::DomainError;
use crate::domain::event::CancellationActor;
use crate::domain::model::{BookingId, BookingStatus, TourId, TravelerId, MAX_HEADCOUNT};
use crate::domain::port::IdentityProvider;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

fn api_error(status: StatusCode, code: &str, error: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            error: error.into(),
            code: code.to_string(),
        }),
    )
}

fn validation_error(error: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    api_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", error)
}

// アプリケーションサービスを含む状態
pub type AppState = AppStateInner;

#[derive(Clone)]
pub struct AppStateInner {
    pub booking_service: Arc<BookingApplicationService>,
    pub booking_query_service: Arc<BookingQueryService>,
    pub identity_provider: Arc<dyn IdentityProvider>,
}

// REST APIルーターを作成
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/tours/book/:tour_id", post(book_tour))
        .route("/tours/:tour_id/availability", get(get_tour_availability))
        .route("/bookings", get(get_bookings))
        .route("/bookings/:booking_id", get(get_booking_by_id))
        .route("/bookings/:booking_id/status", patch(update_booking_status))
}

/// ミドルウェア（リクエストトレース・CORS）と状態を組み込んだアプリケーションを作成
pub fn create_app(state: AppState) -> Router {
    create_router()
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

// ヘルスチェックエンドポイント
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "tour-booking-management",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Authorization ヘッダーのBearerトークンを利用者IDに解決する
async fn authenticate(
    headers: &HeaderMap,
    identity_provider: &dyn IdentityProvider,
) -> ApiResult<TravelerId> {
    let unauthorized =
        |msg: &str| map_application_error(ApplicationError::Unauthorized(msg.to_string()));

    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| unauthorized("認証情報がありません"))?;

    let token = match header.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
        _ => return Err(unauthorized("Bearerトークンを指定してください")),
    };
    if token.is_empty() {
        return Err(unauthorized("Bearerトークンが空です"));
    }

    match identity_provider.resolve(token).await {
        Ok(Some(traveler_id)) => Ok(traveler_id),
        Ok(None) => Err(unauthorized("トークンが無効または期限切れです")),
        Err(err) => Err(map_application_error(err.into())),
    }
}

fn parse_path_uuid(path: Result<Path<Uuid>, PathRejection>) -> ApiResult<Uuid> {
    path.map(|Path(id)| id)
        .map_err(|_| validation_error("無効なID形式です"))
}

// ツアー予約エンドポイント
async fn book_tour(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    headers: HeaderMap,
    body: Result<Json<BookTourRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<BookingResponse>)> {
    let traveler_id = authenticate(&headers, state.identity_provider.as_ref()).await?;
    let tour_id = TourId::from_uuid(parse_path_uuid(path)?);
    let Json(request) =
        body.map_err(|e| validation_error(format!("無効なリクエストです: {}", e.body_text())))?;

    if request.headcount == 0 || request.headcount > MAX_HEADCOUNT {
        return Err(validation_error(format!(
            "人数は1〜{}名の範囲で指定してください",
            MAX_HEADCOUNT
        )));
    }

    let command = CreateBookingCommand {
        tour_id,
        traveler_id,
        headcount: request.headcount,
        selected_start_time: request.selected_start_time,
        offered_price: request.headcount_price,
        special_requests: request.special_requests,
    };

    match state.booking_service.create_booking(command).await {
        Ok(booking) => Ok((
            StatusCode::CREATED,
            Json(BookingResponse::from_booking(&booking)),
        )),
        Err(err) => Err(map_application_error(err)),
    }
}

// 予約ステータス更新エンドポイント
async fn update_booking_status(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    headers: HeaderMap,
    body: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> ApiResult<Json<BookingResponse>> {
    let traveler_id = authenticate(&headers, state.identity_provider.as_ref()).await?;
    let booking_id = BookingId::from_uuid(parse_path_uuid(path)?);
    let Json(request) =
        body.map_err(|e| validation_error(format!("無効なリクエストです: {}", e.body_text())))?;

    let target = BookingStatus::from_string(&request.status)
        .map_err(|_| validation_error(format!("無効なステータス値: {}", request.status)))?;

    match state
        .booking_service
        .update_status(booking_id, target, CancellationActor::Principal(traveler_id))
        .await
    {
        Ok(booking) => Ok(Json(BookingResponse::from_booking(&booking))),
        Err(err) => Err(map_application_error(err)),
    }
}

// 予約一覧取得エンドポイント
async fn get_bookings(
    State(state): State<AppState>,
    query: Result<Query<BookingsQueryParams>, QueryRejection>,
) -> ApiResult<Json<PagedBookingsResponse>> {
    let Query(params) = query.map_err(|_| validation_error("無効なクエリパラメータです"))?;
    let params = params.into_search_params().map_err(validation_error)?;

    match state.booking_query_service.search_bookings(params).await {
        Ok(page) => Ok(Json(PagedBookingsResponse::from_page(&page))),
        Err(err) => Err(map_application_error(err)),
    }
}

// 予約詳細取得エンドポイント
async fn get_booking_by_id(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<BookingResponse>> {
    let booking_id = BookingId::from_uuid(parse_path_uuid(path)?);

    match state.booking_query_service.get_booking_by_id(booking_id).await {
        Ok(Some(booking)) => Ok(Json(BookingResponse::from_booking(&booking))),
        Ok(None) => Err(api_error(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "指定された予約が見つかりません",
        )),
        Err(err) => Err(map_application_error(err)),
    }
}

// 空席状況取得エンドポイント
async fn get_tour_availability(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<AvailabilityResponse>> {
    let tour_id = TourId::from_uuid(parse_path_uuid(path)?);

    match state.booking_service.availability(tour_id).await {
        Ok(availability) => Ok(Json(AvailabilityResponse::from_availability(&availability))),
        Err(err) => Err(map_application_error(err)),
    }
}

// アプリケーションエラーをHTTPエラーにマッピング
pub fn map_application_error(err: ApplicationError) -> (StatusCode, Json<ApiError>) {
    match err {
        ApplicationError::DomainError(domain_err) => map_domain_error(domain_err),
        ApplicationError::NotFound(msg) => api_error(StatusCode::NOT_FOUND, "NOT_FOUND", msg),
        ApplicationError::Unauthorized(msg) => {
            api_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
        }
        ApplicationError::Forbidden(msg) => api_error(StatusCode::FORBIDDEN, "FORBIDDEN", msg),
        ApplicationError::RepositoryError(repo_err) if repo_err.is_retryable() => {
            warn!(error = %repo_err, "ストアが利用できません");
            api_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "STORE_UNAVAILABLE",
                repo_err.to_string(),
            )
        }
        ApplicationError::RepositoryError(repo_err) => {
            error!(error = %repo_err, "保存データの読み取りに失敗しました");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                repo_err.to_string(),
            )
        }
    }
}

// ドメインエラーをHTTPエラーにマッピング
fn map_domain_error(domain_err: DomainError) -> (StatusCode, Json<ApiError>) {
    match domain_err {
        DomainError::Validation(msg) | DomainError::InvalidValue(msg) => validation_error(msg),
        err @ DomainError::CapacityExceeded { .. } => {
            api_error(StatusCode::CONFLICT, "CAPACITY_EXCEEDED", err.to_string())
        }
        err @ DomainError::InvalidTransition { .. } => {
            warn!(error = %err, "不正な状態遷移が要求されました");
            api_error(StatusCode::CONFLICT, "INVALID_TRANSITION", err.to_string())
        }
        err @ DomainError::CurrencyMismatch => {
            error!(error = %err, "ツアーと予約の通貨が一致しません");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::driven::StaticIdentityProvider;
    use crate::domain::port::RepositoryError;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[tokio::test]
    async fn test_authenticate_bearer_token() {
        let traveler = TravelerId::new();
        let provider = StaticIdentityProvider::new().with_token("abc", traveler);

        let resolved = authenticate(&headers("Bearer abc"), &provider).await.unwrap();
        assert_eq!(resolved, traveler);

        let resolved = authenticate(&headers("bearer abc"), &provider).await.unwrap();
        assert_eq!(resolved, traveler);
    }

    #[tokio::test]
    async fn test_authenticate_rejects_missing_or_unknown_token() {
        let provider = StaticIdentityProvider::new();

        let (status, Json(err)) = authenticate(&HeaderMap::new(), &provider).await.unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.code, "UNAUTHORIZED");

        let (status, _) = authenticate(&headers("Basic abc"), &provider).await.unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = authenticate(&headers("Bearer unknown"), &provider).await.unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_map_application_error_not_found() {
        let app_error = ApplicationError::NotFound("リソースが見つかりません".to_string());
        let (status, Json(api_error)) = map_application_error(app_error);

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(api_error.code, "NOT_FOUND");
        assert_eq!(api_error.error, "リソースが見つかりません");
    }

    #[test]
    fn test_map_application_error_forbidden() {
        let app_error = ApplicationError::Forbidden("権限がありません".to_string());
        let (status, Json(api_error)) = map_application_error(app_error);

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(api_error.code, "FORBIDDEN");
    }

    #[test]
    fn test_map_domain_errors() {
        let cases = [
            (
                DomainError::Validation("bad".to_string()),
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
            ),
            (
                DomainError::CapacityExceeded {
                    requested: 3,
                    remaining: 1,
                },
                StatusCode::CONFLICT,
                "CAPACITY_EXCEEDED",
            ),
            (
                DomainError::InvalidTransition {
                    from: BookingStatus::Cancelled,
                    to: BookingStatus::Confirmed,
                },
                StatusCode::CONFLICT,
                "INVALID_TRANSITION",
            ),
        ];
        for (err, expected_status, expected_code) in cases {
            let (status, Json(api_error)) = map_application_error(err.into());
            assert_eq!(status, expected_status);
            assert_eq!(api_error.code, expected_code);
        }
    }

    #[test]
    fn test_map_repository_errors() {
        let (status, Json(api_error)) = map_application_error(
            RepositoryError::ConnectionFailed("pool timed out".to_string()).into(),
        );
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(api_error.code, "STORE_UNAVAILABLE");

        let (status, _) = map_application_error(
            RepositoryError::FetchFailed("corrupt row".to_string()).into(),
        );
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_api_error_structure() {
        let api_error = ApiError {
            error: "テストエラー".to_string(),
            code: "TEST_ERROR".to_string(),
        };

        let json = serde_json::to_string(&api_error).unwrap();
        assert!(json.contains("テストエラー"));
        assert!(json.contains("TEST_ERROR"));

        let deserialized: ApiError = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.error, "テストエラー");
        assert_eq!(deserialized.code, "TEST_ERROR");
    }
}
