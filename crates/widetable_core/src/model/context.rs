//! Caller-supplied request context.
//!
//! Actor identity and the logical request timestamp are passed explicitly to
//! every store operation; the store never reads the wall clock.

use chrono::{DateTime, SecondsFormat, Utc};

/// Who is acting and at which logical instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub actor_id: String,
    pub request_timestamp: DateTime<Utc>,
}

/// Audit values stamped onto written items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditStamp {
    /// RFC 3339, UTC, second precision.
    pub at: String,
    pub by: String,
}

impl RequestContext {
    pub fn new(actor_id: impl Into<String>, request_timestamp: DateTime<Utc>) -> Self {
        Self {
            actor_id: actor_id.into(),
            request_timestamp,
        }
    }

    /// Returns `true` when the actor identity is usable for auditing.
    pub fn has_actor(&self) -> bool {
        !self.actor_id.trim().is_empty()
    }

    pub fn stamp(&self) -> AuditStamp {
        AuditStamp {
            at: format_timestamp(&self.request_timestamp),
            by: self.actor_id.clone(),
        }
    }
}

/// Formats an instant the way audit attributes are stored (`2024-01-02T03:04:05Z`).
pub fn format_timestamp(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}
