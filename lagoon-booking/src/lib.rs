pub mod eligibility;
pub mod gateway;
pub mod lifecycle;
pub mod orchestrator;
pub mod reference;
pub mod split;
pub mod validate;

pub use eligibility::ActionEligibility;
pub use lifecycle::{LifecycleEngine, TransitionError, TransitionOutcome};
pub use orchestrator::{BookingError, BookingOrchestrator, BookingPolicy};
pub use split::{split, CommissionRate, SplitError};
pub use validate::{BookingIntake, FieldViolation};
