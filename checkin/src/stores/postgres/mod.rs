//! `PostgreSQL` storage implementations.

pub mod registration;

// Re-exports
pub use registration::PostgresRegistrationStore;
