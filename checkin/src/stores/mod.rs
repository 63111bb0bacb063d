//! Registration store backends.
//!
//! - **`PostgreSQL`** (feature `postgres`) - registrations table with a
//!   unique credential column and conditional updates
//! - **Redis** - registration hashes plus a credential index, mutated by Lua
//!   scripts

#[cfg(feature = "postgres")]
pub mod postgres;
pub mod registration_redis;

// Re-exports
#[cfg(feature = "postgres")]
pub use postgres::PostgresRegistrationStore;
pub use registration_redis::RedisRegistrationStore;
