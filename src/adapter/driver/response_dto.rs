use crate::application::service::{Page, TourAvailability};
use crate::domain::model::Booking;
use crate::domain::pricing::Quote;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// 予約用のレスポンスDTO
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    pub id: String,
    pub tour_id: String,
    pub traveler_id: String,
    pub headcount: u32,
    pub status: String,
    pub selected_start_time: DateTime<Utc>,
    pub special_requests: Option<String>,
    pub headcount_price: Option<i64>,
    /// 確定時に固定された1名あたりの価格
    pub price_at_booking: Option<i64>,
    pub total_price: Option<i64>,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BookingResponse {
    /// ドメインオブジェクトからBookingResponseを作成
    pub fn from_booking(booking: &Booking) -> Self {
        Self {
            id: booking.id().to_string(),
            tour_id: booking.tour_id().to_string(),
            traveler_id: booking.traveler_id().to_string(),
            headcount: booking.headcount(),
            status: booking.status().to_string(),
            selected_start_time: booking.selected_start_time(),
            special_requests: booking.special_requests().map(str::to_string),
            headcount_price: booking.offered_price().map(|p| p.amount()),
            price_at_booking: booking.price_at_booking().map(|p| p.amount()),
            total_price: booking.total_price().map(|p| p.amount()),
            currency: booking.currency().code(),
            created_at: booking.created_at(),
            confirmed_at: booking.confirmed_at(),
            cancelled_at: booking.cancelled_at(),
            completed_at: booking.completed_at(),
        }
    }
}

/// ページング情報
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

/// 予約一覧用のレスポンスDTO
#[derive(Debug, Serialize)]
pub struct PagedBookingsResponse {
    pub data: Vec<BookingResponse>,
    pub meta: PageMeta,
}

impl PagedBookingsResponse {
    pub fn from_page(page: &Page<Booking>) -> Self {
        Self {
            data: page.data.iter().map(BookingResponse::from_booking).collect(),
            meta: PageMeta {
                page: page.page,
                limit: page.limit,
                total: page.total,
                total_pages: page.total_pages,
            },
        }
    }
}

/// 空席状況用のレスポンスDTO
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub tour_id: String,
    pub deal_state: String,
    pub currency: String,
    pub base_price: i64,
    /// 現在の1名あたりの価格（価格自由ツアーでは null）
    pub current_price: Option<i64>,
    pub traveler_specified_price: bool,
    pub min_group: u32,
    pub max_group: u32,
    pub confirmed_headcount: u32,
    pub spots_left: u32,
    pub progress_percentage: u8,
    pub is_fully_booked: bool,
}

impl AvailabilityResponse {
    pub fn from_availability(availability: &TourAvailability) -> Self {
        let config = &availability.config;
        let counter = &availability.counter;
        Self {
            tour_id: config.tour_id().to_string(),
            deal_state: config.deal_state().kind().to_string(),
            currency: config.currency().code(),
            base_price: config.base_price().amount(),
            current_price: availability.quote.price().map(|p| p.amount()),
            traveler_specified_price: matches!(availability.quote, Quote::TravelerSpecified),
            min_group: config.min_group(),
            max_group: config.max_group(),
            confirmed_headcount: counter.confirmed_headcount(),
            spots_left: counter.spots_left(),
            progress_percentage: counter.progress_percentage(),
            is_fully_booked: counter.is_fully_booked(),
        }
    }
}
