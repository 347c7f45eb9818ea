use crate::domain::event::DomainEvent;
use crate::domain::port::{EventPublisher, PublisherError};
use tracing::info;

/// ログ出力によるイベント発行者
/// ドメインイベントを構造化ログとして書き出す
pub struct TracingEventPublisher;

impl TracingEventPublisher {
    /// 新しいイベント発行者を作成
    pub fn new() -> Self {
        Self
    }
}

impl Default for TracingEventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for TracingEventPublisher {
    fn publish(&self, event: &DomainEvent) -> Result<(), PublisherError> {
        match event {
            DomainEvent::BookingCreated(e) => {
                info!(
                    event_type = event.event_type(),
                    booking_id = %e.booking_id,
                    tour_id = %e.tour_id,
                    traveler_id = %e.traveler_id,
                    headcount = e.headcount,
                    selected_start_time = %e.selected_start_time.to_rfc3339(),
                    occurred_at = %e.occurred_at.to_rfc3339(),
                    "予約作成"
                );
            }
            DomainEvent::BookingConfirmed(e) => {
                info!(
                    event_type = event.event_type(),
                    booking_id = %e.booking_id,
                    tour_id = %e.tour_id,
                    traveler_id = %e.traveler_id,
                    headcount = e.headcount,
                    price_at_booking = e.price_at_booking.amount(),
                    currency = %e.price_at_booking.currency(),
                    occurred_at = %e.occurred_at.to_rfc3339(),
                    "予約確定"
                );
            }
            DomainEvent::BookingCancelled(e) => {
                info!(
                    event_type = event.event_type(),
                    booking_id = %e.booking_id,
                    tour_id = %e.tour_id,
                    released_headcount = e.released_headcount,
                    actor = %e.actor,
                    occurred_at = %e.occurred_at.to_rfc3339(),
                    "予約キャンセル"
                );
            }
            DomainEvent::BookingExpired(e) => {
                info!(
                    event_type = event.event_type(),
                    booking_id = %e.booking_id,
                    tour_id = %e.tour_id,
                    released_headcount = e.released_headcount,
                    occurred_at = %e.occurred_at.to_rfc3339(),
                    "決済期限切れ"
                );
            }
            DomainEvent::BookingCompleted(e) => {
                info!(
                    event_type = event.event_type(),
                    booking_id = %e.booking_id,
                    tour_id = %e.tour_id,
                    occurred_at = %e.occurred_at.to_rfc3339(),
                    "催行完了"
                );
            }
        }
        Ok(())
    }
}
