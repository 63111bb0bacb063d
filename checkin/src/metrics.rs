//! Check-in metrics.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `checkin_admissions_total{outcome}` - Admission attempts by outcome
//!   (admitted, already_admitted, invalid_credential)
//! - `checkin_undo_total{outcome}` - Undo attempts by outcome
//!   (reverted, not_admitted, invalid_credential)
//! - `checkin_credentials_minted_total` - Credentials successfully minted
//! - `checkin_mint_collisions_total` - Candidates discarded as duplicates
//! - `checkin_mint_exhausted_total` - Mints that hit the retry bound

use metrics::{counter, describe_counter};

/// Register metric descriptions. Call once at startup.
pub fn register_checkin_metrics() {
    describe_counter!(
        "checkin_admissions_total",
        "Admission attempts by outcome (admitted, already_admitted, invalid_credential)"
    );
    describe_counter!(
        "checkin_undo_total",
        "Undo attempts by outcome (reverted, not_admitted, invalid_credential)"
    );
    describe_counter!(
        "checkin_credentials_minted_total",
        "Total number of admission credentials minted"
    );
    describe_counter!(
        "checkin_mint_collisions_total",
        "Credential candidates discarded because the value was already taken"
    );
    describe_counter!(
        "checkin_mint_exhausted_total",
        "Mint calls that failed after exhausting the retry bound"
    );

    tracing::info!("Check-in metrics registered");
}

/// Record an admission attempt.
pub fn record_admission(outcome: &'static str) {
    counter!("checkin_admissions_total", "outcome" => outcome).increment(1);
}

/// Record an undo attempt.
pub fn record_undo(outcome: &'static str) {
    counter!("checkin_undo_total", "outcome" => outcome).increment(1);
}

/// Record a successful mint.
pub fn record_credential_minted() {
    counter!("checkin_credentials_minted_total").increment(1);
}

/// Record a discarded duplicate candidate.
pub fn record_mint_collision() {
    counter!("checkin_mint_collisions_total").increment(1);
}

/// Record a mint that ran out of attempts.
pub fn record_mint_exhausted() {
    counter!("checkin_mint_exhausted_total").increment(1);
}
