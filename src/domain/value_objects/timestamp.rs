//! # Timestamps
//!
//! Record timestamps are `chrono::DateTime<Utc>` truncated to microseconds,
//! the resolution PostgreSQL `TIMESTAMPTZ` stores, so a record read back
//! compares equal to the one written.

use chrono::{DateTime, SubsecRound, Utc};

/// Returns the current UTC time at microsecond resolution.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
