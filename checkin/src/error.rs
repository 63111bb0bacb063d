//! Error types for credential issuing and admission.
//!
//! Only infrastructure failures live here. Business-rule outcomes (unknown
//! credential, already admitted, nothing to undo) are reported as typed
//! results by the orchestrator and never surface as a `CheckInError`.

use crate::types::RegistrationId;
use thiserror::Error;

/// Result type alias for check-in operations.
pub type Result<T> = std::result::Result<T, CheckInError>;

/// Infrastructure-level failures of the check-in core.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckInError {
    // ═══════════════════════════════════════════════════════════
    // Store contract violations
    // ═══════════════════════════════════════════════════════════

    /// The registration a credential was minted for does not exist.
    #[error("Registration not found: {0}")]
    RegistrationNotFound(RegistrationId),

    /// Another registration already holds the credential value.
    ///
    /// Raised by stores that enforce uniqueness at write time. The issuer
    /// retries on it, so callers only see it from direct store access.
    #[error("Admission credential already assigned to another registration")]
    CredentialConflict,

    // ═══════════════════════════════════════════════════════════
    // Issuing
    // ═══════════════════════════════════════════════════════════

    /// No unique credential could be generated within the retry bound.
    #[error("Failed to generate a unique admission credential after {attempts} attempts")]
    CredentialGenerationExhausted {
        /// Number of candidates tried
        attempts: u32,
    },

    // ═══════════════════════════════════════════════════════════
    // System Errors
    // ═══════════════════════════════════════════════════════════

    /// Storage operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Stored data could not be decoded.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl CheckInError {
    /// Returns `true` if retrying the whole operation may succeed.
    ///
    /// # Examples
    ///
    /// ```
    /// # use checkin::CheckInError;
    /// assert!(CheckInError::DatabaseError("timeout".into()).is_retryable());
    /// assert!(!CheckInError::ConfigurationError("bad".into()).is_retryable());
    /// ```
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DatabaseError(_)
                | Self::CredentialConflict
                | Self::CredentialGenerationExhausted { .. }
        )
    }

    /// Returns `true` if this error should be reported as a system failure
    /// (HTTP 5xx) rather than a problem with the caller's request.
    ///
    /// # Examples
    ///
    /// ```
    /// # use checkin::{CheckInError, RegistrationId};
    /// assert!(CheckInError::CredentialGenerationExhausted { attempts: 5 }.is_infrastructure());
    /// assert!(!CheckInError::RegistrationNotFound(RegistrationId::new()).is_infrastructure());
    /// ```
    #[must_use]
    pub const fn is_infrastructure(&self) -> bool {
        !matches!(self, Self::RegistrationNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhaustion_message_names_attempts() {
        let err = CheckInError::CredentialGenerationExhausted { attempts: 5 };
        assert_eq!(
            err.to_string(),
            "Failed to generate a unique admission credential after 5 attempts"
        );
    }

    #[test]
    fn test_registration_not_found_is_not_retryable() {
        let err = CheckInError::RegistrationNotFound(RegistrationId::new());
        assert!(!err.is_retryable());
        assert!(!err.is_infrastructure());
    }
}
