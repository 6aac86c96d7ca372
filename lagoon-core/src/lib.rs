pub mod booking;
pub mod events;
pub mod identity;
pub mod occurrence;
pub mod payment;
pub mod repository;

pub use booking::{Booking, BookingStatus, PaymentStatus, TransitionUpdate, BASE_CURRENCY};
pub use occurrence::{Occurrence, OccurrenceSource};
pub use payment::{AuthorizeRequest, AuthorizedPayment, PaymentGateway, PaymentRecord, PaymentSplit};
pub use repository::{BookingRepository, OccurrenceRepository, ReserveOutcome, StoreError};
