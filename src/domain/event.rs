use crate::domain::model::{BookingId, Money, TourId, TravelerId};
use chrono::{DateTime, Utc};

/// ドメインイベント列挙型
/// 予約ライフサイクル上の重要な出来事を表現する
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    /// 座席が仮押さえされた
    BookingCreated(BookingCreated),
    /// 予約が確定された
    BookingConfirmed(BookingConfirmed),
    /// 予約がキャンセルされた
    BookingCancelled(BookingCancelled),
    /// 決済期限切れで予約が取り消された
    BookingExpired(BookingExpired),
    /// ツアーが催行された
    BookingCompleted(BookingCompleted),
}

impl DomainEvent {
    /// イベント種別名
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::BookingCreated(_) => "BookingCreated",
            DomainEvent::BookingConfirmed(_) => "BookingConfirmed",
            DomainEvent::BookingCancelled(_) => "BookingCancelled",
            DomainEvent::BookingExpired(_) => "BookingExpired",
            DomainEvent::BookingCompleted(_) => "BookingCompleted",
        }
    }

    /// 対象の予約ID
    pub fn booking_id(&self) -> BookingId {
        match self {
            DomainEvent::BookingCreated(e) => e.booking_id,
            DomainEvent::BookingConfirmed(e) => e.booking_id,
            DomainEvent::BookingCancelled(e) => e.booking_id,
            DomainEvent::BookingExpired(e) => e.booking_id,
            DomainEvent::BookingCompleted(e) => e.booking_id,
        }
    }
}

/// 仮押さえイベント
#[derive(Debug, Clone, PartialEq)]
pub struct BookingCreated {
    pub booking_id: BookingId,
    pub tour_id: TourId,
    pub traveler_id: TravelerId,
    pub headcount: u32,
    pub selected_start_time: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// 予約確定イベント
#[derive(Debug, Clone, PartialEq)]
pub struct BookingConfirmed {
    pub booking_id: BookingId,
    pub tour_id: TourId,
    pub traveler_id: TravelerId,
    pub headcount: u32,
    /// 確定した1名あたりの価格
    pub price_at_booking: Money,
    pub occurred_at: DateTime<Utc>,
}

/// キャンセルの実行者
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationActor {
    /// 認証済みの利用者（予約した旅行者本人）
    Principal(TravelerId),
    /// システム（期限切れの自動取消など）
    System,
}

impl std::fmt::Display for CancellationActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancellationActor::Principal(id) => write!(f, "principal:{}", id),
            CancellationActor::System => write!(f, "system"),
        }
    }
}

/// 予約キャンセルイベント
#[derive(Debug, Clone, PartialEq)]
pub struct BookingCancelled {
    pub booking_id: BookingId,
    pub tour_id: TourId,
    /// 解放された人数
    pub released_headcount: u32,
    pub actor: CancellationActor,
    pub occurred_at: DateTime<Utc>,
}

/// 決済期限切れイベント
#[derive(Debug, Clone, PartialEq)]
pub struct BookingExpired {
    pub booking_id: BookingId,
    pub tour_id: TourId,
    pub released_headcount: u32,
    pub occurred_at: DateTime<Utc>,
}

/// 催行完了イベント
#[derive(Debug, Clone, PartialEq)]
pub struct BookingCompleted {
    pub booking_id: BookingId,
    pub tour_id: TourId,
    pub occurred_at: DateTime<Utc>,
}
