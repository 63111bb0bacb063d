//! # Checkin
//!
//! Admission credential lifecycle for event check-in: mint a single-use
//! credential per registration, resolve it at scan time, and admit each
//! credential at most once, with an undo path for staff corrections.
//!
//! ## Architecture
//!
//! ```text
//! scan ──▶ AdmissionOrchestrator ──▶ CredentialIssuer ──▶ RegistrationStore
//!          (admit / undo / status)   (mint / resolve)     (Postgres, Redis, mock)
//! ```
//!
//! - [`CredentialIssuer`] mints collision-free credentials and resolves
//!   untrusted strings, rejecting malformed input before any lookup.
//! - [`AdmissionOrchestrator`] owns the `active ⇄ used` state machine. Each
//!   transition is a single conditional write in the store, so concurrent
//!   scans of one credential yield exactly one admission.
//! - Business outcomes ([`AdmitResult`], [`AdmissionStatus`], `bool` for
//!   undo) are values; only storage failures are [`CheckInError`]s.
//!
//! ## Example
//!
//! ```
//! use checkin::{AdmissionOrchestrator, CredentialIssuer, RegistrationId};
//! use checkin::mocks::{MockRegistrationStore, test_clock};
//!
//! # tokio_test::block_on(async {
//! let store = MockRegistrationStore::new();
//! let id = store.register(RegistrationId::new());
//! let orchestrator = AdmissionOrchestrator::new(CredentialIssuer::new(store, test_clock()));
//!
//! let credential = orchestrator.issuer().mint(id).await?;
//! let first = orchestrator.admit(credential.as_str(), Some("Gate-A")).await?;
//! let second = orchestrator.admit(credential.as_str(), Some("Gate-B")).await?;
//!
//! assert!(first.is_success());
//! assert_eq!(second.reason(), Some("already admitted"));
//! assert_eq!(second.admitted_by(), Some("Gate-A"));
//! # Ok::<(), checkin::CheckInError>(())
//! # }).unwrap();
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

// Public modules
pub mod config;
pub mod credential;
pub mod environment;
pub mod error;
pub mod issuer;
pub mod metrics;
pub mod orchestrator;
pub mod providers;
pub mod stores;
pub mod types;

#[cfg(feature = "test-utils")]
pub mod mocks;

// Re-export main types for convenience
pub use config::{CheckInConfig, Config};
pub use environment::{Clock, SystemClock};
pub use error::{CheckInError, Result};
pub use issuer::CredentialIssuer;
pub use orchestrator::AdmissionOrchestrator;
pub use providers::RegistrationStore;
pub use types::{
    Admission, AdmissionCredential, AdmissionStatus, AdmitResult, CredentialStatus, Registration,
    RegistrationId,
};
