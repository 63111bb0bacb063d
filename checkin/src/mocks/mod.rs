//! In-memory doubles for testing.
//!
//! Enabled by the `test-utils` feature (on by default).

pub mod clock;
pub mod registration_store;

pub use clock::{FixedClock, MockClock, test_clock};
pub use registration_store::MockRegistrationStore;
