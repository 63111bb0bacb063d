//! Redis-based registration store.
//!
//! # Architecture
//!
//! - **Registration hash**: `checkin:registration:{id}` with fields `id`,
//!   `credential`, `status`, `admitted_at` (RFC 3339) and `admitted_by`
//! - **Credential index**: `checkin:credential:{credential}` → registration id
//!
//! Assignment, admission and undo each run as one Lua script, so the guard
//! and the write happen in a single server-side step with no interleaving.
//! The index key is created with `SET NX`, which is the uniqueness backstop
//! for concurrent mints.
//!
//! # Deployment
//!
//! Single-node (or primary/replica) Redis only. The scripts derive the old
//! credential index key and the registration key from stored values rather
//! than from `KEYS`, which Redis Cluster rejects, and `ConnectionManager`
//! does not speak the cluster protocol.
//!
//! # Example
//!
//! ```no_run
//! use checkin::stores::RedisRegistrationStore;
//! use checkin::RegistrationId;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisRegistrationStore::new("redis://127.0.0.1:6379").await?;
//! store.register(RegistrationId::new()).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{CheckInError, Result};
use crate::providers::RegistrationStore;
use crate::types::{Admission, AdmissionCredential, CredentialStatus, Registration, RegistrationId};
use chrono::{DateTime, SecondsFormat, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::collections::HashMap;
use uuid::Uuid;

const REGISTRATION_PREFIX: &str = "checkin:registration:";
const CREDENTIAL_PREFIX: &str = "checkin:credential:";

/// KEYS[1] registration hash, KEYS[2] new credential index key.
/// ARGV[1] id, ARGV[2] credential, ARGV[3] credential key prefix.
/// Returns -1 if the registration is missing, 0 on conflict, 1 on success.
const ASSIGN_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return -1
end
local holder = redis.call('GET', KEYS[2])
if holder and holder ~= ARGV[1] then
    return 0
end
local previous = redis.call('HGET', KEYS[1], 'credential')
if previous and previous ~= ARGV[2] then
    redis.call('DEL', ARGV[3] .. previous)
end
redis.call('SET', KEYS[2], ARGV[1])
redis.call('HSET', KEYS[1], 'credential', ARGV[2], 'status', 'active')
redis.call('HDEL', KEYS[1], 'admitted_at', 'admitted_by')
return 1
";

/// KEYS[1] credential index key.
/// ARGV[1] registration key prefix, ARGV[2] expected status, ARGV[3] new
/// status, ARGV[4] admitted_at, ARGV[5] admitted_by (both empty to clear).
/// Returns the updated hash, or nil if the guard failed.
const TRANSITION_SCRIPT: &str = r"
local id = redis.call('GET', KEYS[1])
if not id then
    return false
end
local key = ARGV[1] .. id
if redis.call('HGET', key, 'status') ~= ARGV[2] then
    return false
end
if ARGV[4] == '' then
    redis.call('HSET', key, 'status', ARGV[3])
    redis.call('HDEL', key, 'admitted_at', 'admitted_by')
else
    redis.call('HSET', key, 'status', ARGV[3], 'admitted_at', ARGV[4], 'admitted_by', ARGV[5])
end
return redis.call('HGETALL', key)
";

/// `Redis`-backed registration store.
///
/// This type is `Clone`; clones share the same `ConnectionManager`.
#[derive(Clone)]
pub struct RedisRegistrationStore {
    /// Connection manager for connection pooling.
    conn_manager: ConnectionManager,
}

impl RedisRegistrationStore {
    /// Connect to `Redis`.
    ///
    /// # Errors
    ///
    /// Returns error if the URL is malformed or the connection fails.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            CheckInError::DatabaseError(format!("Failed to create Redis client: {e}"))
        })?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            CheckInError::DatabaseError(format!("Failed to create Redis connection manager: {e}"))
        })?;

        tracing::info!("RedisRegistrationStore initialized successfully");

        Ok(Self { conn_manager })
    }

    fn registration_key(id: RegistrationId) -> String {
        format!("{REGISTRATION_PREFIX}{id}")
    }

    fn credential_key(credential: &AdmissionCredential) -> String {
        format!("{CREDENTIAL_PREFIX}{credential}")
    }

    /// Create a bare registration record.
    ///
    /// Registrations are created by the registration service; this exists
    /// for seeding demos and tests. Existing records are left untouched.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    pub async fn register(&self, id: RegistrationId) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: bool = conn
            .hset_nx(Self::registration_key(id), "id", id.to_string())
            .await
            .map_err(|e| CheckInError::DatabaseError(format!("Failed to create registration: {e}")))?;
        let _: bool = conn
            .hset_nx(Self::registration_key(id), "status", CredentialStatus::Active.as_str())
            .await
            .map_err(|e| CheckInError::DatabaseError(format!("Failed to create registration: {e}")))?;
        Ok(())
    }

    async fn transition(
        &self,
        credential: &AdmissionCredential,
        from: CredentialStatus,
        to: CredentialStatus,
        admission: Option<(DateTime<Utc>, &str)>,
    ) -> Result<Option<Registration>> {
        let mut conn = self.conn_manager.clone();
        let (admitted_at, admitted_by) = admission
            .map(|(at, by)| (at.to_rfc3339_opts(SecondsFormat::Micros, true), by.to_string()))
            .unwrap_or_default();

        let fields: Option<HashMap<String, String>> = Script::new(TRANSITION_SCRIPT)
            .key(Self::credential_key(credential))
            .arg(REGISTRATION_PREFIX)
            .arg(from.as_str())
            .arg(to.as_str())
            .arg(admitted_at)
            .arg(admitted_by)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                CheckInError::DatabaseError(format!("Failed to apply admission transition: {e}"))
            })?;

        fields.map(registration_from_hash).transpose()
    }
}

fn registration_from_hash(fields: HashMap<String, String>) -> Result<Registration> {
    let field = |name: &str| fields.get(name).filter(|v| !v.is_empty());

    let id = field("id")
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .map(RegistrationId::from_uuid)
        .ok_or_else(|| CheckInError::SerializationError("Registration hash lacks id".to_string()))?;

    let admission_credential = field("credential")
        .map(|raw| {
            AdmissionCredential::parse(raw).ok_or_else(|| {
                CheckInError::SerializationError(format!("Stored credential for {id} is malformed"))
            })
        })
        .transpose()?;

    let credential_status = field("status")
        .map(|raw| raw.parse::<CredentialStatus>())
        .transpose()
        .map_err(CheckInError::SerializationError)?
        .unwrap_or_default();

    // An empty operator tag is still a recorded admission.
    let admission = match (field("admitted_at"), fields.get("admitted_by")) {
        (Some(at), Some(by)) => Some(Admission {
            admitted_at: DateTime::parse_from_rfc3339(at)
                .map_err(|e| CheckInError::SerializationError(e.to_string()))?
                .with_timezone(&Utc),
            admitted_by: by.clone(),
        }),
        (None, None) => None,
        _ => {
            return Err(CheckInError::SerializationError(format!(
                "Registration {id} has a partial admission record"
            )));
        }
    };

    Ok(Registration {
        id,
        admission_credential,
        credential_status,
        admission,
    })
}

impl RegistrationStore for RedisRegistrationStore {
    async fn find_by_credential(
        &self,
        credential: &AdmissionCredential,
    ) -> Result<Option<Registration>> {
        let mut conn = self.conn_manager.clone();

        let id: Option<String> = conn
            .get(Self::credential_key(credential))
            .await
            .map_err(|e| CheckInError::DatabaseError(format!("Failed to look up credential: {e}")))?;

        let Some(id) = id else {
            return Ok(None);
        };

        let fields: HashMap<String, String> = conn
            .hgetall(format!("{REGISTRATION_PREFIX}{id}"))
            .await
            .map_err(|e| CheckInError::DatabaseError(format!("Failed to load registration: {e}")))?;

        let registration = registration_from_hash(fields)?;

        // Index and hash are written together by the assign script, but a
        // reader between two scripts could see a stale index entry.
        if registration.admission_credential.as_ref() != Some(credential) {
            return Ok(None);
        }

        Ok(Some(registration))
    }

    async fn credential_exists(&self, credential: &AdmissionCredential) -> Result<bool> {
        let mut conn = self.conn_manager.clone();

        conn.exists(Self::credential_key(credential))
            .await
            .map_err(|e| CheckInError::DatabaseError(format!("Failed to probe credential: {e}")))
    }

    async fn assign_credential(
        &self,
        registration_id: RegistrationId,
        credential: &AdmissionCredential,
    ) -> Result<()> {
        let mut conn = self.conn_manager.clone();

        let outcome: i64 = Script::new(ASSIGN_SCRIPT)
            .key(Self::registration_key(registration_id))
            .key(Self::credential_key(credential))
            .arg(registration_id.to_string())
            .arg(credential.as_str())
            .arg(CREDENTIAL_PREFIX)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| CheckInError::DatabaseError(format!("Failed to assign credential: {e}")))?;

        match outcome {
            1 => Ok(()),
            0 => Err(CheckInError::CredentialConflict),
            _ => Err(CheckInError::RegistrationNotFound(registration_id)),
        }
    }

    async fn mark_admitted(
        &self,
        credential: &AdmissionCredential,
        admitted_at: DateTime<Utc>,
        admitted_by: &str,
    ) -> Result<Option<Registration>> {
        self.transition(
            credential,
            CredentialStatus::Active,
            CredentialStatus::Used,
            Some((admitted_at, admitted_by)),
        )
        .await
    }

    async fn revert_admission(
        &self,
        credential: &AdmissionCredential,
    ) -> Result<Option<Registration>> {
        self.transition(credential, CredentialStatus::Used, CredentialStatus::Active, None)
            .await
    }
}
