// 駆動される側アダプター（台帳・カタログ・認証の実装など）

mod booking_ledger;
mod clock;
mod event_publisher;
mod identity_provider;
mod in_memory_ledger;
mod tour_catalog;

pub use booking_ledger::MySqlBookingLedger;
pub use clock::{FixedClock, SystemClock};
pub use event_publisher::TracingEventPublisher;
pub use identity_provider::{MySqlIdentityProvider, StaticIdentityProvider};
pub use in_memory_ledger::InMemoryBookingLedger;
pub use tour_catalog::{InMemoryTourCatalog, MySqlTourCatalog};
