//! Shared data contract for the check-in core.
//!
//! The registration record itself is owned by the registration service. The
//! types here cover the slice of it this crate reads and mutates, plus the
//! typed outcomes returned to the transport layer.

use crate::credential;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque, stable identifier of a registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistrationId(Uuid);

impl RegistrationId {
    /// Creates a new random `RegistrationId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `RegistrationId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RegistrationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A well-formed admission credential.
///
/// Holding a value of this type proves the string passed
/// [`credential::is_valid_format`]; it says nothing about whether any
/// registration currently holds it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AdmissionCredential(String);

impl AdmissionCredential {
    /// Parse an untrusted string, returning `None` if it is malformed.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        credential::is_valid_format(raw).then(|| Self(raw.to_string()))
    }

    /// Wrap a string produced by the generator.
    pub(crate) const fn from_generated(value: String) -> Self {
        Self(value)
    }

    /// Borrow the credential text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix safe to put in logs.
    #[must_use]
    pub fn redacted(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for AdmissionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AdmissionCredential {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if credential::is_valid_format(&value) {
            Ok(Self(value))
        } else {
            Err(format!("malformed admission credential: {value:?}"))
        }
    }
}

impl From<AdmissionCredential> for String {
    fn from(value: AdmissionCredential) -> Self {
        value.0
    }
}

// ============================================================================
// Status
// ============================================================================

/// Lifecycle status of a registration's admission credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CredentialStatus {
    /// Minted and valid for admission.
    #[default]
    Active,
    /// Admission has occurred.
    Used,
    /// Reserved for time-based invalidation. Nothing in this crate produces it.
    Expired,
}

impl CredentialStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Used => "used",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "used" => Ok(Self::Used),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unknown credential status: {other}")),
        }
    }
}

// ============================================================================
// Registration
// ============================================================================

/// Who admitted a registration, and when.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admission {
    /// Time of admission.
    pub admitted_at: DateTime<Utc>,
    /// Operator tag of the staff member or device that scanned.
    pub admitted_by: String,
}

/// Admission-relevant fields of a registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Registration identifier.
    pub id: RegistrationId,
    /// Current credential, if one has been minted.
    pub admission_credential: Option<AdmissionCredential>,
    /// Credential status.
    pub credential_status: CredentialStatus,
    /// Present exactly when `credential_status` is `Used`.
    pub admission: Option<Admission>,
}

impl Registration {
    /// A registration with no credential minted yet.
    #[must_use]
    pub const fn new(id: RegistrationId) -> Self {
        Self {
            id,
            admission_credential: None,
            credential_status: CredentialStatus::Active,
            admission: None,
        }
    }

    /// Time of admission, if admitted.
    #[must_use]
    pub fn admitted_at(&self) -> Option<DateTime<Utc>> {
        self.admission.as_ref().map(|a| a.admitted_at)
    }

    /// Operator tag of the admission, if admitted.
    #[must_use]
    pub fn admitted_by(&self) -> Option<&str> {
        self.admission.as_ref().map(|a| a.admitted_by.as_str())
    }

    /// Whether the credential has been consumed.
    #[must_use]
    pub const fn is_admitted(&self) -> bool {
        self.admission.is_some()
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Reason reported when a credential does not resolve.
pub const REASON_INVALID_CREDENTIAL: &str = "invalid or expired credential";

/// Reason reported when a credential was already consumed.
pub const REASON_ALREADY_ADMITTED: &str = "already admitted";

/// Outcome of an admission attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdmitResult {
    /// The credential moved from `active` to `used`.
    Admitted {
        /// Registration after the transition.
        registration: Registration,
    },
    /// The credential was already consumed; the snapshot shows who and when.
    AlreadyAdmitted {
        /// Current registration state.
        registration: Registration,
    },
    /// Malformed, unknown, or not admissible credential.
    InvalidCredential,
}

impl AdmitResult {
    /// `true` only for a fresh admission.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }

    /// Human-readable failure reason, `None` on success.
    #[must_use]
    pub const fn reason(&self) -> Option<&'static str> {
        match self {
            Self::Admitted { .. } => None,
            Self::AlreadyAdmitted { .. } => Some(REASON_ALREADY_ADMITTED),
            Self::InvalidCredential => Some(REASON_INVALID_CREDENTIAL),
        }
    }

    /// Registration snapshot, when the credential resolved.
    #[must_use]
    pub const fn registration(&self) -> Option<&Registration> {
        match self {
            Self::Admitted { registration } | Self::AlreadyAdmitted { registration } => {
                Some(registration)
            }
            Self::InvalidCredential => None,
        }
    }

    /// Admission time recorded on the registration.
    #[must_use]
    pub fn admitted_at(&self) -> Option<DateTime<Utc>> {
        self.registration().and_then(Registration::admitted_at)
    }

    /// Operator tag recorded on the registration.
    #[must_use]
    pub fn admitted_by(&self) -> Option<&str> {
        self.registration().and_then(Registration::admitted_by)
    }
}

/// Read-only admission report for a credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionStatus {
    /// Whether the credential has been consumed.
    pub is_admitted: bool,
    /// Time of admission.
    pub admitted_at: Option<DateTime<Utc>>,
    /// Operator tag of the admission.
    pub admitted_by: Option<String>,
    /// Credential status; `Expired` when the credential is unknown.
    pub credential_status: CredentialStatus,
    /// Registration the credential resolved to.
    pub registration: Option<Registration>,
}

impl AdmissionStatus {
    /// Report for a credential that resolved to nothing.
    #[must_use]
    pub const fn unknown() -> Self {
        Self {
            is_admitted: false,
            admitted_at: None,
            admitted_by: None,
            credential_status: CredentialStatus::Expired,
            registration: None,
        }
    }

    /// Whether the credential resolved to a registration at all.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        self.registration.is_some()
    }
}

impl From<Registration> for AdmissionStatus {
    fn from(registration: Registration) -> Self {
        Self {
            is_admitted: registration.is_admitted(),
            admitted_at: registration.admitted_at(),
            admitted_by: registration.admitted_by().map(str::to_string),
            credential_status: registration.credential_status,
            registration: Some(registration),
        }
    }
}
