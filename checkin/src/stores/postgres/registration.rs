//! `PostgreSQL` registration store.
//!
//! # Schema
//!
//! See `migrations/`. The `admission_credential` column carries a `UNIQUE`
//! constraint, which doubles as the point-lookup index and as the backstop
//! against two concurrent mints landing on the same value. `CHECK`
//! constraints keep the admission pair consistent with the status.
//!
//! # Atomicity
//!
//! Admission and undo are single `UPDATE ... WHERE ... AND credential_status
//! = $expected RETURNING ...` statements. Row-level locking makes exactly one
//! of two concurrent updates match; the loser sees zero rows.
//!
//! # Example
//!
//! ```no_run
//! use checkin::stores::PostgresRegistrationStore;
//! use sqlx::PgPool;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = PgPool::connect("postgresql://localhost/checkin").await?;
//! let store = PostgresRegistrationStore::new(pool);
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::PostgresConfig;
use crate::error::{CheckInError, Result};
use crate::providers::RegistrationStore;
use crate::types::{Admission, AdmissionCredential, CredentialStatus, Registration, RegistrationId};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use uuid::Uuid;

const RETURNING_COLUMNS: &str =
    "id, admission_credential, credential_status, admitted_at, admitted_by";

#[derive(sqlx::FromRow)]
struct RegistrationRow {
    id: Uuid,
    admission_credential: Option<String>,
    credential_status: String,
    admitted_at: Option<DateTime<Utc>>,
    admitted_by: Option<String>,
}

impl TryFrom<RegistrationRow> for Registration {
    type Error = CheckInError;

    fn try_from(row: RegistrationRow) -> Result<Self> {
        let admission_credential = row
            .admission_credential
            .map(|raw| {
                AdmissionCredential::parse(&raw).ok_or_else(|| {
                    CheckInError::SerializationError(format!(
                        "Stored credential for {} is malformed",
                        row.id
                    ))
                })
            })
            .transpose()?;

        let credential_status = row
            .credential_status
            .parse::<CredentialStatus>()
            .map_err(CheckInError::SerializationError)?;

        let admission = match (row.admitted_at, row.admitted_by) {
            (Some(admitted_at), Some(admitted_by)) => Some(Admission {
                admitted_at,
                admitted_by,
            }),
            (None, None) => None,
            _ => {
                return Err(CheckInError::SerializationError(format!(
                    "Registration {} has a partial admission record",
                    row.id
                )));
            }
        };

        Ok(Self {
            id: RegistrationId::from_uuid(row.id),
            admission_credential,
            credential_status,
            admission,
        })
    }
}

/// `PostgreSQL` registration store.
#[derive(Clone, Debug)]
pub struct PostgresRegistrationStore {
    /// `PostgreSQL` connection pool.
    pool: PgPool,
}

impl PostgresRegistrationStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the database is unreachable.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout))
            .idle_timeout(Duration::from_secs(config.idle_timeout))
            .connect(&config.url)
            .await
            .map_err(|e| CheckInError::DatabaseError(format!("Failed to connect: {e}")))?;

        tracing::info!(
            max_connections = config.max_connections,
            "PostgresRegistrationStore initialized"
        );

        Ok(Self::new(pool))
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns error if migrations fail.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CheckInError::DatabaseError(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Insert a bare registration row.
    ///
    /// Registrations are created by the registration service; this exists
    /// for seeding demos and tests.
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails.
    pub async fn insert_registration(&self, id: RegistrationId) -> Result<()> {
        sqlx::query("INSERT INTO registrations (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| CheckInError::DatabaseError(format!("Failed to insert registration: {e}")))?;
        Ok(())
    }
}

impl RegistrationStore for PostgresRegistrationStore {
    async fn find_by_credential(
        &self,
        credential: &AdmissionCredential,
    ) -> Result<Option<Registration>> {
        let row: Option<RegistrationRow> = sqlx::query_as(&format!(
            "SELECT {RETURNING_COLUMNS} FROM registrations WHERE admission_credential = $1"
        ))
        .bind(credential.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CheckInError::DatabaseError(format!("Failed to look up credential: {e}")))?;

        row.map(Registration::try_from).transpose()
    }

    async fn credential_exists(&self, credential: &AdmissionCredential) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM registrations WHERE admission_credential = $1)",
        )
        .bind(credential.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CheckInError::DatabaseError(format!("Failed to probe credential: {e}")))?;

        Ok(exists)
    }

    async fn assign_credential(
        &self,
        registration_id: RegistrationId,
        credential: &AdmissionCredential,
    ) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE registrations
            SET admission_credential = $2,
                credential_status = 'active',
                admitted_at = NULL,
                admitted_by = NULL
            WHERE id = $1
            ",
        )
        .bind(registration_id.as_uuid())
        .bind(credential.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                CheckInError::CredentialConflict
            }
            other => CheckInError::DatabaseError(format!("Failed to assign credential: {other}")),
        })?;

        if result.rows_affected() == 0 {
            return Err(CheckInError::RegistrationNotFound(registration_id));
        }

        Ok(())
    }

    async fn mark_admitted(
        &self,
        credential: &AdmissionCredential,
        admitted_at: DateTime<Utc>,
        admitted_by: &str,
    ) -> Result<Option<Registration>> {
        let row: Option<RegistrationRow> = sqlx::query_as(&format!(
            r"
            UPDATE registrations
            SET credential_status = 'used',
                admitted_at = $2,
                admitted_by = $3
            WHERE admission_credential = $1 AND credential_status = 'active'
            RETURNING {RETURNING_COLUMNS}
            "
        ))
        .bind(credential.as_str())
        .bind(admitted_at)
        .bind(admitted_by)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CheckInError::DatabaseError(format!("Failed to record admission: {e}")))?;

        row.map(Registration::try_from).transpose()
    }

    async fn revert_admission(
        &self,
        credential: &AdmissionCredential,
    ) -> Result<Option<Registration>> {
        let row: Option<RegistrationRow> = sqlx::query_as(&format!(
            r"
            UPDATE registrations
            SET credential_status = 'active',
                admitted_at = NULL,
                admitted_by = NULL
            WHERE admission_credential = $1 AND credential_status = 'used'
            RETURNING {RETURNING_COLUMNS}
            "
        ))
        .bind(credential.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CheckInError::DatabaseError(format!("Failed to revert admission: {e}")))?;

        row.map(Registration::try_from).transpose()
    }
}
