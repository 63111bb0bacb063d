//! Admission Orchestrator.
//!
//! Enforces the admit/undo state machine on top of credentials resolved by
//! the [`CredentialIssuer`]:
//!
//! ```text
//!            admit (guard: status = active)
//!   ┌────────┐ ─────────────────────────────▶ ┌──────┐
//!   │ active │                                │ used │
//!   └────────┘ ◀───────────────────────────── └──────┘
//!            undo  (guard: status = used)
//! ```
//!
//! `expired` is declared on [`CredentialStatus`] but no transition leads to it.
//!
//! Every guard is evaluated by the store in the same step as its effect, so
//! two scans racing on one credential produce exactly one admission. The
//! preliminary lookup only decides which negative result to report; it
//! never licenses the write.
//!
//! Business-rule outcomes are returned as values. Only storage failures are
//! `Err`, so the transport layer can tell "already admitted" from "system
//! error, try again" without inspecting error internals.

use crate::config::{CheckInConfig, DEFAULT_OPERATOR_TAG};
use crate::credential::normalize_operator_tag;
use crate::environment::Clock;
use crate::error::Result;
use crate::issuer::CredentialIssuer;
use crate::metrics;
use crate::providers::RegistrationStore;
use crate::types::{AdmissionCredential, AdmissionStatus, AdmitResult, CredentialStatus};

/// Performs check-in, undo and status reads for admission credentials.
#[derive(Debug, Clone)]
pub struct AdmissionOrchestrator<S, C> {
    issuer: CredentialIssuer<S, C>,
    config: CheckInConfig,
}

impl<S, C> AdmissionOrchestrator<S, C>
where
    S: RegistrationStore,
    C: Clock,
{
    /// Create an orchestrator with default configuration.
    #[must_use]
    pub fn new(issuer: CredentialIssuer<S, C>) -> Self {
        Self::with_config(issuer, CheckInConfig::default())
    }

    /// Create an orchestrator with explicit configuration.
    ///
    /// The fallback operator tag goes through the same trim and length rule
    /// as scanned tags; a blank fallback becomes [`DEFAULT_OPERATOR_TAG`].
    #[must_use]
    pub fn with_config(issuer: CredentialIssuer<S, C>, mut config: CheckInConfig) -> Self {
        config.operator_tag_max_len = config.operator_tag_max_len.max(1);
        config.default_operator_tag = normalize_operator_tag(
            Some(&config.default_operator_tag),
            DEFAULT_OPERATOR_TAG,
            config.operator_tag_max_len,
        );
        Self { issuer, config }
    }

    /// The issuer credentials are resolved through.
    #[must_use]
    pub const fn issuer(&self) -> &CredentialIssuer<S, C> {
        &self.issuer
    }

    /// Admit the registration holding `raw`.
    ///
    /// `operator` identifies the scanning staff member or device; when absent
    /// or blank the configured default tag is recorded instead.
    ///
    /// # Errors
    ///
    /// Returns error only on storage failure. Unknown, malformed and
    /// already-used credentials are reported through [`AdmitResult`].
    #[tracing::instrument(skip_all, fields(operator = operator.unwrap_or_default()))]
    pub async fn admit(&self, raw: &str, operator: Option<&str>) -> Result<AdmitResult> {
        let Some(credential) = AdmissionCredential::parse(raw) else {
            metrics::record_admission("invalid_credential");
            tracing::warn!("Admission rejected: malformed credential");
            return Ok(AdmitResult::InvalidCredential);
        };

        let Some(registration) = self.issuer.lookup(&credential).await? else {
            metrics::record_admission("invalid_credential");
            tracing::warn!("Admission rejected: unknown credential");
            return Ok(AdmitResult::InvalidCredential);
        };

        if registration.is_admitted() {
            metrics::record_admission("already_admitted");
            tracing::warn!(
                registration_id = %registration.id,
                admitted_by = registration.admitted_by().unwrap_or_default(),
                "Admission rejected: already admitted"
            );
            return Ok(AdmitResult::AlreadyAdmitted { registration });
        }

        if registration.credential_status != CredentialStatus::Active {
            metrics::record_admission("invalid_credential");
            tracing::warn!(
                registration_id = %registration.id,
                status = %registration.credential_status,
                "Admission rejected: credential not admissible"
            );
            return Ok(AdmitResult::InvalidCredential);
        }

        let operator = normalize_operator_tag(
            operator,
            &self.config.default_operator_tag,
            self.config.operator_tag_max_len,
        );
        let now = self.issuer.clock().now();

        if let Some(admitted) = self
            .issuer
            .store()
            .mark_admitted(&credential, now, &operator)
            .await?
        {
            metrics::record_admission("admitted");
            tracing::info!(
                registration_id = %admitted.id,
                admitted_by = %operator,
                "Registration admitted"
            );
            return Ok(AdmitResult::Admitted {
                registration: admitted,
            });
        }

        // Lost the conditional update; report whatever state won.
        match self.issuer.lookup(&credential).await? {
            Some(current) if current.is_admitted() => {
                metrics::record_admission("already_admitted");
                tracing::warn!(
                    registration_id = %current.id,
                    "Admission rejected: concurrent scan admitted first"
                );
                Ok(AdmitResult::AlreadyAdmitted {
                    registration: current,
                })
            }
            _ => {
                metrics::record_admission("invalid_credential");
                tracing::warn!("Admission rejected: credential changed during check-in");
                Ok(AdmitResult::InvalidCredential)
            }
        }
    }

    /// Revert the admission of the registration holding `raw`.
    ///
    /// Returns `false` for unknown credentials and for credentials that are
    /// not currently admitted; state is left unchanged in both cases.
    ///
    /// # Errors
    ///
    /// Returns error only on storage failure.
    #[tracing::instrument(skip_all)]
    pub async fn undo(&self, raw: &str) -> Result<bool> {
        let Some(credential) = AdmissionCredential::parse(raw) else {
            metrics::record_undo("invalid_credential");
            tracing::warn!("Undo rejected: malformed credential");
            return Ok(false);
        };

        let Some(registration) = self.issuer.lookup(&credential).await? else {
            metrics::record_undo("invalid_credential");
            tracing::warn!("Undo rejected: unknown credential");
            return Ok(false);
        };

        if !registration.is_admitted() {
            metrics::record_undo("not_admitted");
            tracing::debug!(registration_id = %registration.id, "Undo skipped: not admitted");
            return Ok(false);
        }

        match self.issuer.store().revert_admission(&credential).await? {
            Some(reverted) => {
                metrics::record_undo("reverted");
                tracing::info!(
                    registration_id = %reverted.id,
                    previously_admitted_by = registration.admitted_by().unwrap_or_default(),
                    "Admission reverted"
                );
                Ok(true)
            }
            None => {
                metrics::record_undo("not_admitted");
                tracing::debug!(
                    registration_id = %registration.id,
                    "Undo skipped: admission reverted concurrently"
                );
                Ok(false)
            }
        }
    }

    /// Read the admission state of `raw`.
    ///
    /// Unknown credentials report `is_admitted = false` with the `expired`
    /// status sentinel and no registration.
    ///
    /// # Errors
    ///
    /// Returns error only on storage failure.
    pub async fn status(&self, raw: &str) -> Result<AdmissionStatus> {
        Ok(self
            .issuer
            .resolve(raw)
            .await?
            .map_or_else(AdmissionStatus::unknown, AdmissionStatus::from))
    }

    /// Shorthand for `status(raw).is_admitted`.
    ///
    /// # Errors
    ///
    /// Returns error only on storage failure.
    pub async fn is_already_admitted(&self, raw: &str) -> Result<bool> {
        Ok(self.status(raw).await?.is_admitted)
    }
}

#[cfg(all(test, feature = "test-utils"))]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::error::CheckInError;
    use crate::mocks::{MockClock, MockRegistrationStore};
    use crate::types::{AdmissionCredential, RegistrationId};
    use chrono::Duration;

    fn orchestrator() -> AdmissionOrchestrator<MockRegistrationStore, MockClock> {
        AdmissionOrchestrator::new(CredentialIssuer::new(
            MockRegistrationStore::new(),
            MockClock::default(),
        ))
    }

    async fn minted(
        orchestrator: &AdmissionOrchestrator<MockRegistrationStore, MockClock>,
    ) -> AdmissionCredential {
        let id = orchestrator.issuer().store().register(RegistrationId::new());
        orchestrator.issuer().mint(id).await.unwrap()
    }

    #[tokio::test]
    async fn test_admit_records_operator_and_time() {
        let orchestrator = orchestrator();
        let credential = minted(&orchestrator).await;
        let now = orchestrator.issuer().clock().now();

        let result = orchestrator.admit(credential.as_str(), Some("Gate-A")).await.unwrap();

        assert!(result.is_success());
        assert_eq!(result.admitted_by(), Some("Gate-A"));
        assert_eq!(result.admitted_at(), Some(now));
        assert_eq!(
            result.registration().unwrap().credential_status,
            CredentialStatus::Used
        );
    }

    #[tokio::test]
    async fn test_second_admit_reports_first_operator() {
        let orchestrator = orchestrator();
        let credential = minted(&orchestrator).await;

        orchestrator.admit(credential.as_str(), Some("Gate-A")).await.unwrap();
        let second = orchestrator.admit(credential.as_str(), Some("Gate-B")).await.unwrap();

        assert!(!second.is_success());
        assert_eq!(second.reason(), Some("already admitted"));
        assert_eq!(second.admitted_by(), Some("Gate-A"));
    }

    #[tokio::test]
    async fn test_admit_unknown_credential() {
        let orchestrator = orchestrator();

        let malformed = orchestrator.admit("not-a-real-credential", None).await.unwrap();
        assert_eq!(malformed, AdmitResult::InvalidCredential);

        let unknown = orchestrator
            .admit("0f8fad5b-d9cb-469f-a165-70867728950e-1735689600000", None)
            .await
            .unwrap();
        assert_eq!(unknown.reason(), Some("invalid or expired credential"));
    }

    #[tokio::test]
    async fn test_admit_without_operator_uses_default_tag() {
        let orchestrator = orchestrator();
        let credential = minted(&orchestrator).await;

        let result = orchestrator.admit(credential.as_str(), None).await.unwrap();
        assert_eq!(result.admitted_by(), Some("unspecified"));
    }

    #[tokio::test]
    async fn test_admit_expired_credential_is_rejected() {
        let orchestrator = orchestrator();
        let credential = minted(&orchestrator).await;
        orchestrator
            .issuer()
            .store()
            .set_status(&credential, CredentialStatus::Expired);

        let result = orchestrator.admit(credential.as_str(), None).await.unwrap();
        assert_eq!(result, AdmitResult::InvalidCredential);
    }

    #[tokio::test]
    async fn test_undo_on_unused_is_noop() {
        let orchestrator = orchestrator();
        let credential = minted(&orchestrator).await;
        let before = orchestrator.status(credential.as_str()).await.unwrap();

        assert!(!orchestrator.undo(credential.as_str()).await.unwrap());
        assert_eq!(orchestrator.status(credential.as_str()).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_undo_unknown_credential() {
        let orchestrator = orchestrator();
        assert!(!orchestrator.undo("not-a-real-credential").await.unwrap());
    }

    #[tokio::test]
    async fn test_admit_undo_admit_cycle() {
        let orchestrator = orchestrator();
        let credential = minted(&orchestrator).await;

        let first = orchestrator.admit(credential.as_str(), Some("Gate-A")).await.unwrap();
        assert!(first.is_success());

        assert!(orchestrator.undo(credential.as_str()).await.unwrap());
        let reverted = orchestrator.status(credential.as_str()).await.unwrap();
        assert!(!reverted.is_admitted);
        assert_eq!(reverted.admitted_at, None);
        assert_eq!(reverted.admitted_by, None);
        assert_eq!(reverted.credential_status, CredentialStatus::Active);

        orchestrator.issuer().clock().advance(Duration::minutes(3));
        let second = orchestrator.admit(credential.as_str(), Some("Gate-C")).await.unwrap();
        assert!(second.is_success());

        let status = orchestrator.status(credential.as_str()).await.unwrap();
        assert!(status.is_admitted);
        assert_eq!(status.admitted_by.as_deref(), Some("Gate-C"));
        assert!(status.admitted_at > first.admitted_at());
    }

    #[tokio::test]
    async fn test_status_unknown_uses_sentinel() {
        let orchestrator = orchestrator();
        let status = orchestrator.status("garbage").await.unwrap();

        assert_eq!(status, AdmissionStatus::unknown());
        assert!(!orchestrator.is_already_admitted("garbage").await.unwrap());
    }

    #[tokio::test]
    async fn test_storage_failure_is_not_a_business_result() {
        let orchestrator = orchestrator();
        let credential = minted(&orchestrator).await;
        orchestrator.issuer().store().fail_next("db unavailable");

        let err = orchestrator.admit(credential.as_str(), None).await.unwrap_err();
        assert!(matches!(err, CheckInError::DatabaseError(_)));
        assert!(err.is_retryable());

        // Nothing was written; a retry succeeds.
        assert!(orchestrator.admit(credential.as_str(), None).await.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_lost_race_reports_winner() {
        let orchestrator = orchestrator();
        let credential = minted(&orchestrator).await;

        // Another device wins between our resolve and our conditional update.
        orchestrator
            .issuer()
            .store()
            .admit_before_next_transition(&credential, "Gate-Z");

        let result = orchestrator.admit(credential.as_str(), Some("Gate-A")).await.unwrap();
        assert_eq!(result.reason(), Some("already admitted"));
        assert_eq!(result.admitted_by(), Some("Gate-Z"));
    }

    #[tokio::test]
    async fn test_blank_default_tag_falls_back_to_builtin() {
        let config = CheckInConfig::default().with_default_operator_tag("   ");
        let orchestrator = AdmissionOrchestrator::with_config(
            CredentialIssuer::new(MockRegistrationStore::new(), MockClock::default()),
            config,
        );
        let credential = minted(&orchestrator).await;

        let result = orchestrator.admit(credential.as_str(), None).await.unwrap();

        assert!(result.is_success());
        assert_eq!(result.admitted_by(), Some(DEFAULT_OPERATOR_TAG));
    }

    #[tokio::test]
    async fn test_default_tag_is_trimmed_and_capped() {
        let config = CheckInConfig::default()
            .with_default_operator_tag("  Front-Desk-Kiosk  ")
            .with_operator_tag_max_len(10);
        let orchestrator = AdmissionOrchestrator::with_config(
            CredentialIssuer::new(MockRegistrationStore::new(), MockClock::default()),
            config,
        );
        let credential = minted(&orchestrator).await;

        let result = orchestrator.admit(credential.as_str(), Some("")).await.unwrap();

        assert_eq!(result.admitted_by(), Some("Front-Desk"));
    }

    #[tokio::test]
    async fn test_malformed_credential_skips_storage() {
        let orchestrator = orchestrator();

        assert_eq!(
            orchestrator.admit("garbage", Some("Gate-A")).await.unwrap(),
            AdmitResult::InvalidCredential
        );
        assert!(!orchestrator.undo("garbage").await.unwrap());
        assert_eq!(orchestrator.issuer().store().lookup_count(), 0);
    }
}
