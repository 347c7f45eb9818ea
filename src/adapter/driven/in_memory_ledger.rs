use crate::domain::error::DomainError;
use crate::domain::model::{
    Booking, BookingId, BookingStatus, Reservation, TourCapacityCounter, TourId,
};
use crate::domain::port::{
    BookingCriteria, BookingLedger, RepositoryError, ReserveOutcome, TransitionOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

struct StoredBooking {
    booking: Booking,
    capacity_released: bool,
}

#[derive(Default)]
struct LedgerState {
    bookings: HashMap<BookingId, StoredBooking>,
    counters: HashMap<TourId, u32>,
}

impl LedgerState {
    /// 座席を一度だけ解放する
    fn release(&mut self, booking_id: BookingId) -> bool {
        let Some(stored) = self.bookings.get_mut(&booking_id) else {
            return false;
        };
        if stored.capacity_released {
            return false;
        }
        stored.capacity_released = true;

        let tour_id = stored.booking.tour_id();
        let headcount = stored.booking.headcount();
        let counter = self.counters.entry(tour_id).or_insert(0);
        *counter = counter.saturating_sub(headcount);
        true
    }
}

/// インメモリ予約台帳
/// MySQL実装と同じ意味論を1つのロックで実現する。テストやローカル実行用
#[derive(Default)]
pub struct InMemoryBookingLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryBookingLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

/// 保存用の複製（未発行のイベントは持ち込まない）
fn detached(booking: &Booking) -> Booking {
    let mut copy = booking.clone();
    copy.take_domain_events();
    copy
}

#[async_trait]
impl BookingLedger for InMemoryBookingLedger {
    async fn reserve_and_append(
        &self,
        booking: &Booking,
        max_group: u32,
    ) -> Result<ReserveOutcome, RepositoryError> {
        let mut state = self.state.lock().await;
        if state.bookings.contains_key(&booking.id()) {
            return Err(RepositoryError::OperationFailed(format!(
                "予約IDが重複しています: {}",
                booking.id()
            )));
        }

        let tour_id = booking.tour_id();
        let current = state.counters.get(&tour_id).copied().unwrap_or(0);
        let mut counter = TourCapacityCounter::new(tour_id, max_group, current);

        match counter.reserve(booking.headcount()) {
            Ok(()) => {
                state
                    .counters
                    .insert(tour_id, counter.confirmed_headcount());
                state.bookings.insert(
                    booking.id(),
                    StoredBooking {
                        booking: detached(booking),
                        capacity_released: false,
                    },
                );
                Ok(ReserveOutcome::Reserved(Reservation {
                    booking_id: booking.id(),
                    tour_id,
                    headcount: booking.headcount(),
                    confirmed_headcount_after: counter.confirmed_headcount(),
                }))
            }
            Err(DomainError::CapacityExceeded { remaining, .. }) => {
                Ok(ReserveOutcome::Rejected { remaining })
            }
            Err(e) => Err(RepositoryError::OperationFailed(e.to_string())),
        }
    }

    async fn apply_transition(
        &self,
        booking: &Booking,
        expected: BookingStatus,
    ) -> Result<TransitionOutcome, RepositoryError> {
        let mut state = self.state.lock().await;
        let Some(stored) = state.bookings.get_mut(&booking.id()) else {
            return Ok(TransitionOutcome::Stale { current: None });
        };
        let current = stored.booking.status();
        if current != expected {
            return Ok(TransitionOutcome::Stale {
                current: Some(current),
            });
        }

        stored.booking = detached(booking);
        let released = if booking.status() == BookingStatus::Cancelled {
            state.release(booking.id())
        } else {
            false
        };

        Ok(TransitionOutcome::Applied { released })
    }

    async fn release(&self, booking_id: BookingId) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().await;
        Ok(state.release(booking_id))
    }

    async fn get(&self, booking_id: BookingId) -> Result<Option<Booking>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.bookings.get(&booking_id).map(|s| s.booking.clone()))
    }

    async fn list_by_tour(&self, tour_id: TourId) -> Result<Vec<Booking>, RepositoryError> {
        let state = self.state.lock().await;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|s| s.booking.tour_id() == tour_id)
            .map(|s| s.booking.clone())
            .collect();
        bookings.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().to_string().cmp(&b.id().to_string()))
        });
        Ok(bookings)
    }

    async fn counter_for(
        &self,
        tour_id: TourId,
        max_group: u32,
    ) -> Result<TourCapacityCounter, RepositoryError> {
        let state = self.state.lock().await;
        let confirmed = state.counters.get(&tour_id).copied().unwrap_or(0);
        Ok(TourCapacityCounter::new(tour_id, max_group, confirmed))
    }

    async fn find_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<Booking>, RepositoryError> {
        let state = self.state.lock().await;
        let mut stale: Vec<Booking> = state
            .bookings
            .values()
            .map(|s| &s.booking)
            .filter(|b| b.status() == BookingStatus::Pending && b.created_at() <= cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|b| b.created_at());
        stale.truncate(limit as usize);
        Ok(stale)
    }

    async fn query(
        &self,
        criteria: &BookingCriteria,
    ) -> Result<(Vec<Booking>, u64), RepositoryError> {
        let state = self.state.lock().await;
        let mut matched: Vec<&Booking> = state
            .bookings
            .values()
            .map(|s| &s.booking)
            .filter(|b| criteria.matches(b))
            .collect();
        matched.sort_by(|a, b| criteria.compare(a, b));

        let total = matched.len() as u64;
        let page = matched
            .into_iter()
            .skip(criteria.offset as usize)
            .take(criteria.limit as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    fn next_identity(&self) -> BookingId {
        BookingId::new()
    }
}
