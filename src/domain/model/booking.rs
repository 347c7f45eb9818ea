use crate::domain::error::DomainError;
use crate::domain::event::{
    BookingCancelled, BookingCompleted, BookingConfirmed, BookingCreated, BookingExpired,
    CancellationActor, DomainEvent,
};
use crate::domain::model::{
    BookingId, BookingStatus, Currency, DealState, Money, TourCapacityConfig, TourId, TravelerId,
    MAX_UNIT_PRICE,
};
use crate::domain::pricing::Quote;
use chrono::{DateTime, Duration, Utc};

/// 特記事項の最大文字数
pub const MAX_SPECIAL_REQUESTS_LEN: usize = 500;

/// 永続化層から予約を再構築するためのデータ
#[derive(Debug, Clone)]
pub struct BookingSnapshot {
    pub id: BookingId,
    pub tour_id: TourId,
    pub traveler_id: TravelerId,
    pub headcount: u32,
    pub currency: Currency,
    pub offered_price: Option<i64>,
    pub special_requests: Option<String>,
    pub price_at_booking: Option<i64>,
    pub status: BookingStatus,
    pub selected_start_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Booking集約
/// 予約のライフサイクルを管理し、状態遷移のルールを適用する
///
/// 人数とツアーIDは作成後に変更されない。
/// 変化するのはステータスと各タイムスタンプのみで、いずれも状態遷移でのみ一度だけ設定される。
#[derive(Debug, Clone)]
pub struct Booking {
    id: BookingId,
    tour_id: TourId,
    traveler_id: TravelerId,
    headcount: u32,
    currency: Currency,
    offered_price: Option<Money>,
    special_requests: Option<String>,
    price_at_booking: Option<Money>,
    status: BookingStatus,
    selected_start_time: DateTime<Utc>,
    created_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    domain_events: Vec<DomainEvent>,
}

impl Booking {
    /// 新しい予約を仮押さえ状態で作成
    /// 事前条件:
    /// - 人数が最小催行人数〜定員の範囲内
    /// - 開始日時がツアーの開始日時の1つで、かつ未来
    /// - 価格自由ツアーでは希望価格の指定が必須、それ以外では指定不可
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        id: BookingId,
        config: &TourCapacityConfig,
        traveler_id: TravelerId,
        headcount: u32,
        selected_start_time: DateTime<Utc>,
        offered_price: Option<i64>,
        special_requests: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        config.validate_headcount(headcount)?;
        config.validate_start_time(selected_start_time, now)?;

        let offered_price = match (config.deal_state(), offered_price) {
            (DealState::PayWhatYouWant, Some(amount)) if amount > MAX_UNIT_PRICE => {
                return Err(DomainError::Validation(format!(
                    "希望価格は{}以下である必要があります: {}",
                    MAX_UNIT_PRICE, amount
                )));
            }
            (DealState::PayWhatYouWant, Some(amount)) => {
                Some(Money::new(amount, config.currency()).map_err(|_| {
                    DomainError::Validation(format!(
                        "希望価格は0以上である必要があります: {}",
                        amount
                    ))
                })?)
            }
            (DealState::PayWhatYouWant, None) => {
                return Err(DomainError::Validation(
                    "価格自由ツアーでは希望価格の指定が必要です".to_string(),
                ));
            }
            (_, Some(_)) => {
                return Err(DomainError::Validation(
                    "希望価格を指定できるのは価格自由ツアーのみです".to_string(),
                ));
            }
            (_, None) => None,
        };

        let special_requests = special_requests
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if let Some(requests) = &special_requests {
            if requests.chars().count() > MAX_SPECIAL_REQUESTS_LEN {
                return Err(DomainError::Validation(format!(
                    "特記事項は{}文字以内で入力してください",
                    MAX_SPECIAL_REQUESTS_LEN
                )));
            }
        }

        let mut booking = Self {
            id,
            tour_id: config.tour_id(),
            traveler_id,
            headcount,
            currency: config.currency(),
            offered_price,
            special_requests,
            price_at_booking: None,
            status: BookingStatus::Pending,
            selected_start_time,
            created_at: now,
            confirmed_at: None,
            cancelled_at: None,
            completed_at: None,
            domain_events: Vec::new(),
        };

        booking
            .domain_events
            .push(DomainEvent::BookingCreated(BookingCreated {
                booking_id: id,
                tour_id: booking.tour_id,
                traveler_id,
                headcount,
                selected_start_time,
                occurred_at: now,
            }));

        Ok(booking)
    }

    /// データベースから取得したデータで予約を再構築
    /// リポジトリでの使用を想定
    pub fn reconstruct(snapshot: BookingSnapshot) -> Result<Self, DomainError> {
        let currency = snapshot.currency;
        let to_money = |amount: Option<i64>| -> Result<Option<Money>, DomainError> {
            amount.map(|a| Money::new(a, currency)).transpose()
        };
        let price_at_booking = to_money(snapshot.price_at_booking)?;

        // 確定済み以降の予約は価格と確定日時を必ず持つ
        let confirmed_or_later = matches!(
            snapshot.status,
            BookingStatus::Confirmed | BookingStatus::Completed
        );
        if confirmed_or_later && (price_at_booking.is_none() || snapshot.confirmed_at.is_none()) {
            return Err(DomainError::InvalidValue(format!(
                "確定済みの予約に価格または確定日時がありません: {}",
                snapshot.id
            )));
        }

        Ok(Self {
            id: snapshot.id,
            tour_id: snapshot.tour_id,
            traveler_id: snapshot.traveler_id,
            headcount: snapshot.headcount,
            currency,
            offered_price: to_money(snapshot.offered_price)?,
            special_requests: snapshot.special_requests,
            price_at_booking,
            status: snapshot.status,
            selected_start_time: snapshot.selected_start_time,
            created_at: snapshot.created_at,
            confirmed_at: snapshot.confirmed_at,
            cancelled_at: snapshot.cancelled_at,
            completed_at: snapshot.completed_at,
            domain_events: Vec::new(),
        })
    }

    pub fn id(&self) -> BookingId {
        self.id
    }

    pub fn tour_id(&self) -> TourId {
        self.tour_id
    }

    pub fn traveler_id(&self) -> TravelerId {
        self.traveler_id
    }

    pub fn headcount(&self) -> u32 {
        self.headcount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// 旅行者が指定した1名あたりの希望価格（価格自由ツアーのみ）
    pub fn offered_price(&self) -> Option<Money> {
        self.offered_price
    }

    pub fn special_requests(&self) -> Option<&str> {
        self.special_requests.as_deref()
    }

    /// 確定時に固定された1名あたりの価格
    pub fn price_at_booking(&self) -> Option<Money> {
        self.price_at_booking
    }

    /// 合計金額（確定価格 × 人数）
    /// 未確定、または保存済みデータの価格が上限を超えて桁あふれする場合は None
    pub fn total_price(&self) -> Option<Money> {
        self.price_at_booking
            .and_then(|p| p.multiply(self.headcount))
    }

    pub fn status(&self) -> BookingStatus {
        self.status
    }

    pub fn selected_start_time(&self) -> DateTime<Utc> {
        self.selected_start_time
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.confirmed_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// ドメインイベントを取得してクリア
    pub fn take_domain_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.domain_events)
    }

    /// 遷移が許可されているか確認する
    fn ensure_transition(&self, next: BookingStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        Ok(())
    }

    /// 決済期限を過ぎた仮押さえか
    pub fn is_payment_window_elapsed(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.status == BookingStatus::Pending && now - self.created_at >= ttl
    }

    /// 予約を確定し、価格を固定する
    /// 事前条件:
    /// - ステータスがPending
    ///
    /// 価格自由ツアーの場合は作成時の希望価格をそのまま採用する
    pub fn confirm(&mut self, quote: Quote, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_transition(BookingStatus::Confirmed)?;

        let price = match quote {
            Quote::Fixed(price) => price,
            Quote::TravelerSpecified => self.offered_price.ok_or_else(|| {
                DomainError::Validation("希望価格が指定されていない予約です".to_string())
            })?,
        };
        if price.currency() != self.currency {
            return Err(DomainError::CurrencyMismatch);
        }

        self.status = BookingStatus::Confirmed;
        self.price_at_booking = Some(price);
        self.confirmed_at = Some(now);

        self.domain_events
            .push(DomainEvent::BookingConfirmed(BookingConfirmed {
                booking_id: self.id,
                tour_id: self.tour_id,
                traveler_id: self.traveler_id,
                headcount: self.headcount,
                price_at_booking: price,
                occurred_at: now,
            }));

        Ok(())
    }

    /// 予約をキャンセル
    /// 事前条件:
    /// - ステータスがPendingまたはConfirmed
    /// - 選択した開始日時より前（開始後は催行済みにしかできない）
    pub fn cancel(&mut self, actor: CancellationActor, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_transition(BookingStatus::Cancelled)?;

        if now >= self.selected_start_time {
            return Err(DomainError::Validation(format!(
                "開始日時を過ぎた予約はキャンセルできません: {}",
                self.selected_start_time.to_rfc3339()
            )));
        }

        self.status = BookingStatus::Cancelled;
        self.cancelled_at = Some(now);

        self.domain_events
            .push(DomainEvent::BookingCancelled(BookingCancelled {
                booking_id: self.id,
                tour_id: self.tour_id,
                released_headcount: self.headcount,
                actor,
                occurred_at: now,
            }));

        Ok(())
    }

    /// 決済期限を過ぎた仮押さえを取り消す
    ///
    /// # Returns
    /// * `true` - 期限切れとしてキャンセルした
    /// * `false` - 対象外（Pendingでない、または期限内）
    pub fn expire_if_stale(&mut self, now: DateTime<Utc>, ttl: Duration) -> bool {
        if !self.is_payment_window_elapsed(now, ttl) {
            return false;
        }

        self.status = BookingStatus::Cancelled;
        self.cancelled_at = Some(now);

        self.domain_events
            .push(DomainEvent::BookingExpired(BookingExpired {
                booking_id: self.id,
                tour_id: self.tour_id,
                released_headcount: self.headcount,
                occurred_at: now,
            }));

        true
    }

    /// 催行済みにマーク
    /// 事前条件:
    /// - ステータスがConfirmed
    /// - 選択した開始日時を過ぎている
    pub fn mark_completed(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.ensure_transition(BookingStatus::Completed)?;

        if self.selected_start_time > now {
            return Err(DomainError::Validation(format!(
                "開始日時前のツアーは催行済みにできません: {}",
                self.selected_start_time.to_rfc3339()
            )));
        }

        self.status = BookingStatus::Completed;
        self.completed_at = Some(now);

        self.domain_events
            .push(DomainEvent::BookingCompleted(BookingCompleted {
                booking_id: self.id,
                tour_id: self.tour_id,
                occurred_at: now,
            }));

        Ok(())
    }
}
