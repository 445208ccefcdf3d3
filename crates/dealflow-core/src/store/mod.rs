pub mod deal_store;
pub mod message_store;
pub mod run_store;
pub mod step_result_store;

pub use deal_store::DealStore;
pub use message_store::MessageStore;
pub use run_store::RunStore;
pub use step_result_store::StepResultStore;

use chrono::{DateTime, SecondsFormat, Utc};

/// Timestamps are persisted as RFC 3339 text with millisecond precision.
pub(crate) fn to_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_ts(s: Option<String>) -> DateTime<Utc> {
    s.and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

/// Whether a rusqlite error is a UNIQUE / CHECK constraint violation.
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
