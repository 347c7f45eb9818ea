use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tour_booking_management::adapter::driven::{
    MySqlBookingLedger, MySqlIdentityProvider, MySqlTourCatalog, SystemClock,
    TracingEventPublisher,
};
use tour_booking_management::adapter::driver::rest_api::{create_app, AppStateInner};
use tour_booking_management::adapter::{
    BookingPolicyConfig, DatabaseConfig, DatabaseMigration, ServerConfig,
};
use tour_booking_management::application::service::{
    BookingApplicationService, BookingQueryService,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .envファイルから環境変数を読み込む
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("=== ツアー予約管理システム REST API ===");

    // 設定を読み込む
    let database_config = DatabaseConfig::from_env()?;
    let server_config = ServerConfig::from_env()?;
    let policy_config = BookingPolicyConfig::from_env()?;
    info!(
        host = %database_config.host,
        port = database_config.port,
        payment_ttl_seconds = policy_config.payment_ttl_seconds,
        sweep_interval_seconds = policy_config.sweep_interval_seconds,
        "設定を読み込みました"
    );

    // 接続プールを作成
    let pool = database_config
        .pool_options()
        .connect(&database_config.connection_string())
        .await?;
    info!("データベース接続プールを作成しました");

    // マイグレーションを実行
    DatabaseMigration::new(pool.clone()).run().await?;

    // アダプターを作成
    let ledger = Arc::new(MySqlBookingLedger::new(pool.clone()));
    let tour_catalog = Arc::new(MySqlTourCatalog::new(pool.clone()));
    let identity_provider = Arc::new(MySqlIdentityProvider::new(pool.clone()));

    // アプリケーションサービスを作成
    let booking_service = Arc::new(BookingApplicationService::new(
        ledger.clone(),
        tour_catalog,
        Arc::new(TracingEventPublisher::new()),
        Arc::new(SystemClock),
        policy_config.policy(),
    ));
    let booking_query_service = Arc::new(BookingQueryService::new(ledger));

    // 決済期限切れの仮押さえを定期的に掃除する
    let sweeper = booking_service.clone();
    let sweep_interval = policy_config.sweep_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = sweeper.sweep_stale_pending().await {
                error!(error = %err, "仮押さえの掃除に失敗しました");
            }
        }
    });

    // アプリケーション状態を作成
    let app_state = AppStateInner {
        booking_service,
        booking_query_service,
        identity_provider,
    };
    let app = create_app(app_state);

    // サーバーを起動
    let listener = tokio::net::TcpListener::bind(server_config.bind_address()).await?;
    info!(address = %server_config.bind_address(), "REST APIサーバーが起動しました");
    info!("  POST  /tours/book/:tour_id - ツアー予約");
    info!("  PATCH /bookings/:id/status - 予約ステータス更新");
    info!("  GET   /bookings - 予約一覧取得");
    info!("  GET   /bookings/:id - 予約詳細取得");
    info!("  GET   /tours/:tour_id/availability - 空席状況取得");
    info!("  GET   /health - ヘルスチェック");

    axum::serve(listener, app).await?;

    Ok(())
}
