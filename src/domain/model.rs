// ドメインモデル（エンティティと値オブジェクト）

mod value_objects;
mod tour;
mod capacity;
mod booking;

pub use value_objects::{
    BookingId, TourId, TravelerId,
    Currency, Money,
    BookingStatus,
    MAX_HEADCOUNT, MAX_UNIT_PRICE,
};

pub use tour::{DealState, GroupSize, TourCapacityConfig};
pub use capacity::{Reservation, TourCapacityCounter};
pub use booking::{Booking, BookingSnapshot, MAX_SPECIAL_REQUESTS_LEN};
