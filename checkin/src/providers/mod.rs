//! Storage providers.
//!
//! The check-in core depends on these traits; the registration service
//! supplies the implementation. Concrete backends live in
//! [`stores`](crate::stores) and in-memory doubles in `mocks`.

pub mod registration_store;

pub use registration_store::RegistrationStore;
