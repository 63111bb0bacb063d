//! Registration store trait.
//!
//! This module defines the slice of the registration service's storage that
//! the check-in core needs: point lookups by credential, credential
//! assignment, and the two conditional admission transitions.

use crate::error::Result;
use crate::types::{AdmissionCredential, Registration, RegistrationId};
use chrono::{DateTime, Utc};

/// Registration store.
///
/// # Implementation Notes
///
/// - `find_by_credential()` and `credential_exists()` are exact-match point
///   lookups and need an index on the credential field
/// - A credential value belongs to at most one registration; a uniqueness
///   constraint on the credential field is expected as a backstop
/// - **CRITICAL**: `mark_admitted()` and `revert_admission()` MUST be a single
///   conditional update (guard and effect in one step)
///
/// # Atomicity Requirements
///
/// A read followed by a separate write lets two concurrent scans of the same
/// credential both observe `active` and both succeed. Implementations must
/// use:
/// - `PostgreSQL`: `UPDATE ... WHERE admission_credential = $1 AND
///   credential_status = 'active' RETURNING ...`
/// - `Redis`: a Lua script evaluating the guard and writing in one call
/// - In-memory: check-and-set under one mutex guard
pub trait RegistrationStore: Send + Sync {
    /// Look up the registration currently holding `credential`.
    ///
    /// # Errors
    ///
    /// Returns error if the storage operation fails.
    fn find_by_credential(
        &self,
        credential: &AdmissionCredential,
    ) -> impl std::future::Future<Output = Result<Option<Registration>>> + Send;

    /// Check whether any registration currently holds `credential`.
    ///
    /// # Errors
    ///
    /// Returns error if the storage operation fails.
    fn credential_exists(
        &self,
        credential: &AdmissionCredential,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Attach `credential` to a registration, replacing any previous one.
    ///
    /// One atomic write: sets the credential, resets the status to `active`
    /// and clears the admission fields. The replaced credential must no
    /// longer resolve afterwards.
    ///
    /// # Errors
    ///
    /// - [`CheckInError::RegistrationNotFound`](crate::CheckInError::RegistrationNotFound)
    ///   if the registration does not exist
    /// - [`CheckInError::CredentialConflict`](crate::CheckInError::CredentialConflict)
    ///   if another registration already holds the value
    /// - Storage failures
    fn assign_credential(
        &self,
        registration_id: RegistrationId,
        credential: &AdmissionCredential,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Conditionally move `credential` from `active` to `used`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(registration))`: this call performed the transition
    /// - `Ok(None)`: no registration holds the credential in `active` state
    ///
    /// # Errors
    ///
    /// Returns error if the storage operation fails.
    fn mark_admitted(
        &self,
        credential: &AdmissionCredential,
        admitted_at: DateTime<Utc>,
        admitted_by: &str,
    ) -> impl std::future::Future<Output = Result<Option<Registration>>> + Send;

    /// Conditionally move `credential` from `used` back to `active`.
    ///
    /// Clears the admission time and operator tag together.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(registration))`: this call reverted the admission
    /// - `Ok(None)`: no registration holds the credential in `used` state
    ///
    /// # Errors
    ///
    /// Returns error if the storage operation fails.
    fn revert_admission(
        &self,
        credential: &AdmissionCredential,
    ) -> impl std::future::Future<Output = Result<Option<Registration>>> + Send;
}
