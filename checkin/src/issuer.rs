//! Credential Issuer.
//!
//! Mints admission credentials, checks their shape, and resolves them back
//! to registrations. The issuer knows nothing about check-in as an event;
//! it only deals with credential existence and format.

use crate::config::CheckInConfig;
use crate::credential;
use crate::environment::Clock;
use crate::error::{CheckInError, Result};
use crate::metrics;
use crate::providers::RegistrationStore;
use crate::types::{AdmissionCredential, Registration, RegistrationId};

/// Mints and resolves admission credentials.
///
/// # Uniqueness
///
/// Each candidate is probed with [`is_unique`](Self::is_unique) before it is
/// written. The probe and the write are not atomic with each other, so the
/// store's uniqueness backstop may still reject the write with
/// [`CheckInError::CredentialConflict`]; that counts as a collision and the
/// next candidate is tried.
#[derive(Debug, Clone)]
pub struct CredentialIssuer<S, C> {
    store: S,
    clock: C,
    max_attempts: u32,
}

impl<S, C> CredentialIssuer<S, C>
where
    S: RegistrationStore,
    C: Clock,
{
    /// Create an issuer with the default retry bound.
    #[must_use]
    pub fn new(store: S, clock: C) -> Self {
        Self::with_config(store, clock, &CheckInConfig::default())
    }

    /// Create an issuer using `config.max_mint_attempts`.
    ///
    /// A bound of zero is treated as one attempt.
    #[must_use]
    pub fn with_config(store: S, clock: C, config: &CheckInConfig) -> Self {
        Self {
            store,
            clock,
            max_attempts: config.max_mint_attempts.max(1),
        }
    }

    /// Backing store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Injected clock.
    #[must_use]
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// Mint a fresh credential for `registration_id`.
    ///
    /// Any previous credential on the registration is replaced and stops
    /// resolving. The status is reset to `active`.
    ///
    /// # Errors
    ///
    /// - [`CheckInError::RegistrationNotFound`] if the registration does not exist
    /// - [`CheckInError::CredentialGenerationExhausted`] if no unique value was
    ///   found within the retry bound
    /// - Storage failures from the underlying store
    #[tracing::instrument(skip_all, fields(registration_id = %registration_id))]
    pub async fn mint(&self, registration_id: RegistrationId) -> Result<AdmissionCredential> {
        for attempt in 1..=self.max_attempts {
            let candidate = credential::generate_candidate(self.clock.now());

            if !self.is_unique(&candidate).await? {
                metrics::record_mint_collision();
                tracing::warn!(attempt, "Credential candidate already in use, regenerating");
                continue;
            }

            match self.store.assign_credential(registration_id, &candidate).await {
                Ok(()) => {
                    metrics::record_credential_minted();
                    tracing::info!(
                        attempt,
                        credential = candidate.redacted(),
                        "Admission credential minted"
                    );
                    return Ok(candidate);
                }
                Err(CheckInError::CredentialConflict) => {
                    metrics::record_mint_collision();
                    tracing::warn!(attempt, "Credential write hit uniqueness constraint, regenerating");
                }
                Err(e) => return Err(e),
            }
        }

        metrics::record_mint_exhausted();
        tracing::error!(
            attempts = self.max_attempts,
            "Exhausted credential generation attempts; store may be inconsistent"
        );
        Err(CheckInError::CredentialGenerationExhausted {
            attempts: self.max_attempts,
        })
    }

    /// Resolve an untrusted credential string to its registration.
    ///
    /// Malformed input is rejected without a storage lookup and reported the
    /// same way as an unknown credential.
    ///
    /// # Errors
    ///
    /// Returns error only if the storage lookup fails.
    pub async fn resolve(&self, raw: &str) -> Result<Option<Registration>> {
        let Some(credential) = AdmissionCredential::parse(raw) else {
            tracing::debug!("Rejected malformed credential without lookup");
            return Ok(None);
        };

        self.lookup(&credential).await
    }

    /// Look up the registration holding an already-parsed credential.
    ///
    /// # Errors
    ///
    /// Returns error only if the storage lookup fails.
    pub async fn lookup(&self, credential: &AdmissionCredential) -> Result<Option<Registration>> {
        self.store.find_by_credential(credential).await
    }

    /// `true` if no registration currently holds `credential`.
    ///
    /// # Errors
    ///
    /// Returns error if the storage lookup fails.
    pub async fn is_unique(&self, credential: &AdmissionCredential) -> Result<bool> {
        Ok(!self.store.credential_exists(credential).await?)
    }

    /// Pure structural check; never touches storage.
    #[must_use]
    pub fn is_valid_format(raw: &str) -> bool {
        credential::is_valid_format(raw)
    }
}

#[cfg(all(test, feature = "test-utils"))]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::mocks::{FixedClock, MockRegistrationStore, test_clock};
    use crate::types::CredentialStatus;

    type TestIssuer = CredentialIssuer<MockRegistrationStore, FixedClock>;

    fn issuer() -> TestIssuer {
        CredentialIssuer::new(MockRegistrationStore::new(), test_clock())
    }

    #[tokio::test]
    async fn test_mint_produces_valid_active_credential() {
        let issuer = issuer();
        let id = issuer.store().register(RegistrationId::new());

        let credential = issuer.mint(id).await.unwrap();

        assert!(TestIssuer::is_valid_format(credential.as_str()));
        let registration = issuer.resolve(credential.as_str()).await.unwrap().unwrap();
        assert_eq!(registration.id, id);
        assert_eq!(registration.credential_status, CredentialStatus::Active);
        assert!(!issuer.is_unique(&credential).await.unwrap());
    }

    #[tokio::test]
    async fn test_mint_unknown_registration_fails_loudly() {
        let issuer = issuer();
        let missing = RegistrationId::new();

        let err = issuer.mint(missing).await.unwrap_err();
        assert_eq!(err, CheckInError::RegistrationNotFound(missing));
    }

    #[tokio::test]
    async fn test_remint_invalidates_previous_credential() {
        let issuer = issuer();
        let id = issuer.store().register(RegistrationId::new());

        let first = issuer.mint(id).await.unwrap();
        let second = issuer.mint(id).await.unwrap();

        assert_ne!(first, second);
        assert!(issuer.resolve(first.as_str()).await.unwrap().is_none());
        assert!(issuer.is_unique(&first).await.unwrap());
        assert_eq!(issuer.resolve(second.as_str()).await.unwrap().unwrap().id, id);
    }

    #[tokio::test]
    async fn test_resolve_malformed_skips_storage() {
        let issuer = issuer();
        issuer.store().fail_next("store offline");

        // Malformed input never reaches the failing store.
        assert!(issuer.resolve("not-a-real-credential").await.unwrap().is_none());
        assert_eq!(issuer.store().lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_mint_retries_on_collision() {
        let issuer = issuer();
        let id = issuer.store().register(RegistrationId::new());
        issuer.store().collide_next(1);
        issuer.store().conflict_next(1);

        let credential = issuer.mint(id).await.unwrap();
        assert_eq!(issuer.resolve(credential.as_str()).await.unwrap().unwrap().id, id);
    }

    #[tokio::test]
    async fn test_mint_exhaustion_after_bound() {
        let store = MockRegistrationStore::new();
        let issuer = CredentialIssuer::with_config(
            store,
            test_clock(),
            &CheckInConfig::new().with_max_mint_attempts(3),
        );
        let id = issuer.store().register(RegistrationId::new());
        issuer.store().collide_next(3);

        let err = issuer.mint(id).await.unwrap_err();
        assert_eq!(err, CheckInError::CredentialGenerationExhausted { attempts: 3 });
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_mint_propagates_storage_failure() {
        let issuer = issuer();
        let id = issuer.store().register(RegistrationId::new());
        issuer.store().fail_next("connection reset");

        let err = issuer.mint(id).await.unwrap_err();
        assert!(matches!(err, CheckInError::DatabaseError(_)));
    }
}
