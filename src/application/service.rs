use crate::application::ApplicationError;
use crate::domain::error::DomainError;
use crate::domain::event::CancellationActor;
use crate::domain::model::{
    Booking, BookingId, BookingStatus, TourCapacityConfig, TourCapacityCounter, TourId,
    TravelerId,
};
use crate::domain::port::{BookingLedger, Clock, EventPublisher, TourCatalog, TransitionOutcome};
use crate::domain::pricing::{PricingEngine, Quote};
use crate::domain::service::CapacityGuard;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

mod booking_query_service;

pub use booking_query_service::{BookingQueryService, BookingSearchParams, Page};

/// 予約ポリシー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingPolicy {
    /// 仮押さえの決済期限
    pub payment_ttl: Duration,
    /// 1回の掃除で読み込む仮押さえの件数
    pub sweep_batch_size: u32,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            payment_ttl: Duration::minutes(15),
            sweep_batch_size: 100,
        }
    }
}

/// 予約作成コマンド
#[derive(Debug, Clone)]
pub struct CreateBookingCommand {
    pub tour_id: TourId,
    pub traveler_id: TravelerId,
    pub headcount: u32,
    pub selected_start_time: DateTime<Utc>,
    /// 価格自由ツアーで旅行者が指定する1名あたりの価格
    pub offered_price: Option<i64>,
    pub special_requests: Option<String>,
}

/// ツアーの空席状況
/// 空席数・充足率は読み出し時にカウンターから導出する
#[derive(Debug, Clone)]
pub struct TourAvailability {
    pub config: TourCapacityConfig,
    pub counter: TourCapacityCounter,
    pub quote: Quote,
}

/// 予約アプリケーションサービス
/// 予約のライフサイクル（仮押さえ → 確定 → キャンセル／催行済み）を調整する
pub struct BookingApplicationService {
    ledger: Arc<dyn BookingLedger>,
    tour_catalog: Arc<dyn TourCatalog>,
    capacity_guard: CapacityGuard,
    event_publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    policy: BookingPolicy,
}

impl BookingApplicationService {
    /// 新しいアプリケーションサービスを作成
    ///
    /// # Arguments
    /// * `ledger` - 予約台帳
    /// * `tour_catalog` - ツアーカタログ
    /// * `event_publisher` - イベント発行者
    /// * `clock` - 時刻
    /// * `policy` - 予約ポリシー
    pub fn new(
        ledger: Arc<dyn BookingLedger>,
        tour_catalog: Arc<dyn TourCatalog>,
        event_publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        policy: BookingPolicy,
    ) -> Self {
        Self {
            capacity_guard: CapacityGuard::new(ledger.clone()),
            ledger,
            tour_catalog,
            event_publisher,
            clock,
            policy,
        }
    }

    /// 予約ポリシーを取得
    pub fn policy(&self) -> BookingPolicy {
        self.policy
    }

    async fn load_config(&self, tour_id: TourId) -> Result<TourCapacityConfig, ApplicationError> {
        self.tour_catalog
            .find_config(tour_id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("ツアーが見つかりません: {}", tour_id)))
    }

    async fn load_booking(&self, booking_id: BookingId) -> Result<Booking, ApplicationError> {
        self.ledger.get(booking_id).await?.ok_or_else(|| {
            ApplicationError::NotFound(format!("予約が見つかりません: {}", booking_id))
        })
    }

    /// 溜まったドメインイベントを発行する
    /// 台帳への書き込みは確定済みのため、発行に失敗しても処理は失敗扱いにしない
    fn publish_events(&self, booking: &mut Booking) {
        for event in booking.take_domain_events() {
            if let Err(err) = self.event_publisher.publish(&event) {
                warn!(
                    booking_id = %event.booking_id(),
                    event_type = event.event_type(),
                    error = %err,
                    "ドメインイベントの発行に失敗しました"
                );
            }
        }
    }

    /// 状態遷移後の予約を台帳に書き込み、イベントを発行する
    async fn persist_transition(
        &self,
        booking: &mut Booking,
        expected: BookingStatus,
    ) -> Result<(), ApplicationError> {
        match self.ledger.apply_transition(booking, expected).await? {
            TransitionOutcome::Applied { released } => {
                info!(
                    booking_id = %booking.id(),
                    tour_id = %booking.tour_id(),
                    from = %expected,
                    to = %booking.status(),
                    released_headcount = if released { booking.headcount() } else { 0 },
                    "予約のステータスを更新しました"
                );
                self.publish_events(booking);
                Ok(())
            }
            TransitionOutcome::Stale { current: None } => Err(ApplicationError::NotFound(
                format!("予約が見つかりません: {}", booking.id()),
            )),
            TransitionOutcome::Stale {
                current: Some(current),
            } => {
                warn!(
                    booking_id = %booking.id(),
                    expected = %expected,
                    current = %current,
                    attempted = %booking.status(),
                    "並行する状態遷移と競合しました"
                );
                Err(DomainError::InvalidTransition {
                    from: current,
                    to: booking.status(),
                }
                .into())
            }
        }
    }

    /// 読み込んだ予約が決済期限切れなら取り消して保存する
    async fn expire_loaded(
        &self,
        booking: &mut Booking,
        now: DateTime<Utc>,
    ) -> Result<bool, ApplicationError> {
        if !booking.expire_if_stale(now, self.policy.payment_ttl) {
            return Ok(false);
        }
        self.persist_transition(booking, BookingStatus::Pending)
            .await?;
        info!(
            booking_id = %booking.id(),
            tour_id = %booking.tour_id(),
            headcount = booking.headcount(),
            "決済期限切れの仮押さえを取り消しました"
        );
        Ok(true)
    }

    /// ツアーの現在価格と空席状況を取得
    ///
    /// # Returns
    /// * `Ok(TourAvailability)` - 空席状況
    /// * `Err(ApplicationError::NotFound)` - ツアーが存在しない
    pub async fn availability(&self, tour_id: TourId) -> Result<TourAvailability, ApplicationError> {
        let config = self.load_config(tour_id).await?;
        let counter = self
            .ledger
            .counter_for(tour_id, config.max_group())
            .await?;
        let quote = PricingEngine::quote(&config, counter.confirmed_headcount());
        Ok(TourAvailability {
            config,
            counter,
            quote,
        })
    }

    /// 座席を仮押さえして予約を作成
    ///
    /// # Returns
    /// * `Ok(Booking)` - 作成された仮押さえ状態の予約
    /// * `Err(ApplicationError)` - 検証失敗、満席、ツアーが存在しないなど
    pub async fn create_booking(
        &self,
        command: CreateBookingCommand,
    ) -> Result<Booking, ApplicationError> {
        let config = self.load_config(command.tour_id).await?;
        let now = self.clock.now();

        let mut booking = Booking::create(
            self.ledger.next_identity(),
            &config,
            command.traveler_id,
            command.headcount,
            command.selected_start_time,
            command.offered_price,
            command.special_requests,
            now,
        )?;

        self.capacity_guard.reserve(&booking, &config).await?;
        self.publish_events(&mut booking);

        Ok(booking)
    }

    /// 予約を確定し、確定時点のカウンター値で価格を固定する
    /// 決済期限切れの仮押さえは先に取り消されるため確定できない
    pub async fn confirm_booking(&self, booking_id: BookingId) -> Result<Booking, ApplicationError> {
        let mut booking = self.load_booking(booking_id).await?;
        let now = self.clock.now();
        self.expire_loaded(&mut booking, now).await?;

        let config = self.load_config(booking.tour_id()).await?;
        let counter = self
            .ledger
            .counter_for(booking.tour_id(), config.max_group())
            .await?;
        let quote = PricingEngine::quote(&config, counter.confirmed_headcount());
        debug!(
            booking_id = %booking_id,
            confirmed_headcount = counter.confirmed_headcount(),
            quote = ?quote,
            "確定価格を見積もりました"
        );

        let expected = booking.status();
        booking.confirm(quote, now)?;
        self.persist_transition(&mut booking, expected).await?;

        Ok(booking)
    }

    /// 予約をキャンセルし、座席を解放する
    /// 決済期限切れの仮押さえは期限切れとして取り消した予約を返す
    pub async fn cancel_booking(
        &self,
        booking_id: BookingId,
        actor: CancellationActor,
    ) -> Result<Booking, ApplicationError> {
        let mut booking = self.load_booking(booking_id).await?;
        ensure_actor_may_modify(&booking, actor)?;
        let now = self.clock.now();
        // 期限切れで取り消した場合はその結果をそのまま返す
        if self.expire_loaded(&mut booking, now).await? {
            return Ok(booking);
        }

        let expected = booking.status();
        booking.cancel(actor, now)?;
        self.persist_transition(&mut booking, expected).await?;

        info!(booking_id = %booking_id, actor = %actor, "予約をキャンセルしました");
        Ok(booking)
    }

    /// 決済期限を過ぎた仮押さえを取り消す
    ///
    /// # Returns
    /// * `Ok(true)` - 取り消した
    /// * `Ok(false)` - 対象外（既に確定・取消済み、または期限内）
    pub async fn expire_pending_if_stale(
        &self,
        booking_id: BookingId,
        now: DateTime<Utc>,
    ) -> Result<bool, ApplicationError> {
        let mut booking = self.load_booking(booking_id).await?;
        self.expire_loaded(&mut booking, now).await
    }

    /// 開始日時を過ぎた確定済みの予約を催行済みにする
    pub async fn mark_completed(
        &self,
        booking_id: BookingId,
        now: DateTime<Utc>,
    ) -> Result<Booking, ApplicationError> {
        let mut booking = self.load_booking(booking_id).await?;
        self.expire_loaded(&mut booking, now).await?;

        let expected = booking.status();
        booking.mark_completed(now)?;
        self.persist_transition(&mut booking, expected).await?;

        Ok(booking)
    }

    /// 指定されたステータスへ遷移させる
    /// pending への遷移はどの状態からも許可されない
    /// 旅行者本人以外の操作は拒否する
    pub async fn update_status(
        &self,
        booking_id: BookingId,
        target: BookingStatus,
        actor: CancellationActor,
    ) -> Result<Booking, ApplicationError> {
        let booking = self.load_booking(booking_id).await?;
        ensure_actor_may_modify(&booking, actor)?;

        match target {
            BookingStatus::Confirmed => self.confirm_booking(booking_id).await,
            BookingStatus::Cancelled => self.cancel_booking(booking_id, actor).await,
            BookingStatus::Completed => self.mark_completed(booking_id, self.clock.now()).await,
            BookingStatus::Pending => {
                warn!(
                    booking_id = %booking_id,
                    current = %booking.status(),
                    "pending への遷移が要求されました"
                );
                Err(DomainError::InvalidTransition {
                    from: booking.status(),
                    to: BookingStatus::Pending,
                }
                .into())
            }
        }
    }

    /// 決済期限を過ぎた仮押さえをまとめて取り消す
    /// 何度実行しても結果は変わらない
    ///
    /// # Returns
    /// * `Ok(usize)` - 今回取り消した件数
    pub async fn sweep_stale_pending(&self) -> Result<usize, ApplicationError> {
        let now = self.clock.now();
        let cutoff = now - self.policy.payment_ttl;
        let batch_size = self.policy.sweep_batch_size.max(1);
        let mut expired = 0;

        loop {
            let stale = self.ledger.find_stale_pending(cutoff, batch_size).await?;
            let fetched = stale.len();
            let mut progressed = false;

            for mut booking in stale {
                match self.expire_loaded(&mut booking, now).await {
                    Ok(true) => {
                        expired += 1;
                        progressed = true;
                    }
                    Ok(false) => {}
                    // 並行する確定・キャンセルに先を越された場合は対象外
                    Err(ApplicationError::DomainError(DomainError::InvalidTransition { .. })) => {
                        debug!(booking_id = %booking.id(), "掃除対象の予約は既に遷移済みです");
                    }
                    Err(err) => return Err(err),
                }
            }

            if fetched < batch_size as usize || !progressed {
                break;
            }
        }

        if expired > 0 {
            info!(expired, "決済期限切れの仮押さえを掃除しました");
        }
        Ok(expired)
    }

    /// 予約IDで予約を取得
    pub async fn get_booking(&self, booking_id: BookingId) -> Result<Option<Booking>, ApplicationError> {
        self.ledger
            .get(booking_id)
            .await
            .map_err(ApplicationError::from)
    }
}

fn ensure_actor_may_modify(
    booking: &Booking,
    actor: CancellationActor,
) -> Result<(), ApplicationError> {
    match actor {
        CancellationActor::Principal(traveler_id) if traveler_id != booking.traveler_id() => {
            warn!(
                booking_id = %booking.id(),
                actor = %actor,
                "予約者以外による変更を拒否しました"
            );
            Err(ApplicationError::Forbidden(format!(
                "予約 {} を変更する権限がありません",
                booking.id()
            )))
        }
        _ => Ok(()),
    }
}
