//! Mock registration store for testing.

use crate::error::{CheckInError, Result};
use crate::providers::RegistrationStore;
use crate::types::{Admission, AdmissionCredential, CredentialStatus, Registration, RegistrationId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Inner {
    registrations: HashMap<RegistrationId, Registration>,
    by_credential: HashMap<AdmissionCredential, RegistrationId>,
    fail_next: Option<String>,
    collide_next: u32,
    conflict_next: u32,
    lookups: usize,
    racing_admission: Option<(AdmissionCredential, String)>,
}

impl Inner {
    fn take_failure(&mut self) -> Result<()> {
        match self.fail_next.take() {
            Some(message) => Err(CheckInError::DatabaseError(message)),
            None => Ok(()),
        }
    }

    fn holder_mut(&mut self, credential: &AdmissionCredential) -> Option<&mut Registration> {
        let id = self.by_credential.get(credential)?;
        self.registrations.get_mut(id)
    }
}

/// Mock registration store.
///
/// In-memory store where every guard and its effect run under one mutex
/// guard, giving the same single-step semantics as a conditional `UPDATE`.
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockRegistrationStore {
    inner: Arc<Mutex<Inner>>,
}

impl MockRegistrationStore {
    /// Create an empty mock store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| CheckInError::DatabaseError("Mutex lock failed".to_string()))
    }

    fn lock_for_test(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a registration with no credential (stands in for the
    /// registration service). Returns the id for chaining.
    pub fn register(&self, id: RegistrationId) -> RegistrationId {
        self.lock_for_test()
            .registrations
            .insert(id, Registration::new(id));
        id
    }

    /// Fetch a registration by id.
    #[must_use]
    pub fn get(&self, id: RegistrationId) -> Option<Registration> {
        self.lock_for_test().registrations.get(&id).cloned()
    }

    /// Number of registrations (for testing).
    #[must_use]
    pub fn registration_count(&self) -> usize {
        self.lock_for_test().registrations.len()
    }

    /// Number of credential lookups served (for testing).
    #[must_use]
    pub fn lookup_count(&self) -> usize {
        self.lock_for_test().lookups
    }

    /// Make the next store call fail with a database error.
    pub fn fail_next(&self, message: &str) {
        self.lock_for_test().fail_next = Some(message.to_string());
    }

    /// Report the next `count` existence probes as taken.
    pub fn collide_next(&self, count: u32) {
        self.lock_for_test().collide_next = count;
    }

    /// Reject the next `count` credential assignments as uniqueness conflicts.
    pub fn conflict_next(&self, count: u32) {
        self.lock_for_test().conflict_next = count;
    }

    /// Overwrite the status of the registration holding `credential`.
    pub fn set_status(&self, credential: &AdmissionCredential, status: CredentialStatus) {
        if let Some(registration) = self.lock_for_test().holder_mut(credential) {
            registration.credential_status = status;
        }
    }

    /// Simulate another scanner admitting `credential` as `operator` just
    /// before the next `mark_admitted` evaluates its guard.
    pub fn admit_before_next_transition(&self, credential: &AdmissionCredential, operator: &str) {
        self.lock_for_test().racing_admission = Some((credential.clone(), operator.to_string()));
    }
}

impl RegistrationStore for MockRegistrationStore {
    async fn find_by_credential(
        &self,
        credential: &AdmissionCredential,
    ) -> Result<Option<Registration>> {
        let mut inner = self.lock()?;
        inner.lookups += 1;
        inner.take_failure()?;

        Ok(inner
            .by_credential
            .get(credential)
            .and_then(|id| inner.registrations.get(id))
            .cloned())
    }

    async fn credential_exists(&self, credential: &AdmissionCredential) -> Result<bool> {
        let mut inner = self.lock()?;
        inner.lookups += 1;
        inner.take_failure()?;

        if inner.collide_next > 0 {
            inner.collide_next -= 1;
            return Ok(true);
        }

        Ok(inner.by_credential.contains_key(credential))
    }

    async fn assign_credential(
        &self,
        registration_id: RegistrationId,
        credential: &AdmissionCredential,
    ) -> Result<()> {
        let mut inner = self.lock()?;
        inner.take_failure()?;

        if !inner.registrations.contains_key(&registration_id) {
            return Err(CheckInError::RegistrationNotFound(registration_id));
        }

        if inner.conflict_next > 0 {
            inner.conflict_next -= 1;
            return Err(CheckInError::CredentialConflict);
        }

        if inner
            .by_credential
            .get(credential)
            .is_some_and(|holder| *holder != registration_id)
        {
            return Err(CheckInError::CredentialConflict);
        }

        let previous = inner
            .registrations
            .get(&registration_id)
            .and_then(|r| r.admission_credential.clone());
        if let Some(previous) = previous {
            inner.by_credential.remove(&previous);
        }

        inner.by_credential.insert(credential.clone(), registration_id);
        if let Some(registration) = inner.registrations.get_mut(&registration_id) {
            registration.admission_credential = Some(credential.clone());
            registration.credential_status = CredentialStatus::Active;
            registration.admission = None;
        }

        Ok(())
    }

    async fn mark_admitted(
        &self,
        credential: &AdmissionCredential,
        admitted_at: DateTime<Utc>,
        admitted_by: &str,
    ) -> Result<Option<Registration>> {
        let mut inner = self.lock()?;
        inner.take_failure()?;

        if let Some((racing, operator)) = inner.racing_admission.take() {
            if let Some(registration) = inner.holder_mut(&racing) {
                registration.credential_status = CredentialStatus::Used;
                registration.admission = Some(Admission {
                    admitted_at,
                    admitted_by: operator,
                });
            }
        }

        let Some(registration) = inner.holder_mut(credential) else {
            return Ok(None);
        };

        if registration.credential_status != CredentialStatus::Active {
            return Ok(None);
        }

        registration.credential_status = CredentialStatus::Used;
        registration.admission = Some(Admission {
            admitted_at,
            admitted_by: admitted_by.to_string(),
        });

        Ok(Some(registration.clone()))
    }

    async fn revert_admission(
        &self,
        credential: &AdmissionCredential,
    ) -> Result<Option<Registration>> {
        let mut inner = self.lock()?;
        inner.take_failure()?;

        let Some(registration) = inner.holder_mut(credential) else {
            return Ok(None);
        };

        if registration.credential_status != CredentialStatus::Used {
            return Ok(None);
        }

        registration.credential_status = CredentialStatus::Active;
        registration.admission = None;

        Ok(Some(registration.clone()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::credential::generate_candidate;

    #[tokio::test]
    async fn test_assign_rejects_value_held_elsewhere() {
        let store = MockRegistrationStore::new();
        let a = store.register(RegistrationId::new());
        let b = store.register(RegistrationId::new());
        let credential = generate_candidate(Utc::now());

        store.assign_credential(a, &credential).await.unwrap();
        let err = store.assign_credential(b, &credential).await.unwrap_err();

        assert_eq!(err, CheckInError::CredentialConflict);
        assert_eq!(store.find_by_credential(&credential).await.unwrap().unwrap().id, a);
    }

    #[tokio::test]
    async fn test_mark_admitted_is_single_shot() {
        let store = MockRegistrationStore::new();
        let id = store.register(RegistrationId::new());
        let credential = generate_candidate(Utc::now());
        store.assign_credential(id, &credential).await.unwrap();

        let now = Utc::now();
        assert!(store.mark_admitted(&credential, now, "a").await.unwrap().is_some());
        assert!(store.mark_admitted(&credential, now, "b").await.unwrap().is_none());
        assert_eq!(store.get(id).unwrap().admitted_by(), Some("a"));
    }

    #[tokio::test]
    async fn test_reassign_clears_admission() {
        let store = MockRegistrationStore::new();
        let id = store.register(RegistrationId::new());
        let first = generate_candidate(Utc::now());
        store.assign_credential(id, &first).await.unwrap();
        store.mark_admitted(&first, Utc::now(), "a").await.unwrap();

        let second = generate_candidate(Utc::now());
        store.assign_credential(id, &second).await.unwrap();

        let registration = store.get(id).unwrap();
        assert_eq!(registration.credential_status, CredentialStatus::Active);
        assert!(registration.admission.is_none());
        assert!(!store.credential_exists(&first).await.unwrap());
    }
}
