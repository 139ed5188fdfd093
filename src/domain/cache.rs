//! Cache entries and the pending/ready state machine.
//!
//! An entry moves `absent -> pending -> ready`, and a re-submission moves a
//! ready entry back to `pending` until the next successful write. Keys that
//! were never submitted are implicitly absent and have no stored record.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::error::DomainError;

/// Longest key accepted by the compute protocol, in bytes.
pub const MAX_KEY_BYTES: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Absent,
    Pending,
    Ready,
}

impl EntryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Absent => "absent",
            EntryStatus::Pending => "pending",
            EntryStatus::Ready => "ready",
        }
    }

    /// Client-facing hit/miss classification: only `ready` is a hit.
    pub fn is_hit(self) -> bool {
        matches!(self, EntryStatus::Ready)
    }
}

impl TryFrom<&str> for EntryStatus {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "absent" => Ok(EntryStatus::Absent),
            "pending" => Ok(EntryStatus::Pending),
            "ready" => Ok(EntryStatus::Ready),
            _ => Err(()),
        }
    }
}

/// One key's status, value and timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub status: EntryStatus,
    pub value: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub written_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub pending_since: Option<OffsetDateTime>,
}

impl CacheEntry {
    pub fn absent(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            status: EntryStatus::Absent,
            value: None,
            written_at: None,
            pending_since: None,
        }
    }

    /// Apply `mark_pending` to the current entry.
    ///
    /// The value is withdrawn; `written_at` is kept for observability.
    pub fn into_pending(self, now: OffsetDateTime) -> Self {
        Self {
            status: EntryStatus::Pending,
            value: None,
            pending_since: Some(now),
            ..self
        }
    }

    /// Apply `put` to the current entry.
    pub fn into_ready(self, value: String, now: OffsetDateTime) -> Self {
        Self {
            status: EntryStatus::Ready,
            value: Some(value),
            written_at: Some(now),
            pending_since: None,
            ..self
        }
    }

    /// Whether a pending entry has outlived the lease at `now`.
    ///
    /// An entry is expired once `pending_since <= now - lease`; the sweep
    /// purges with the same inclusive cutoff.
    pub fn lease_expired(&self, now: OffsetDateTime, lease: Option<Duration>) -> bool {
        let (EntryStatus::Pending, Some(lease), Some(since)) =
            (self.status, lease, self.pending_since)
        else {
            return false;
        };
        lease_cutoff(now, lease).is_some_and(|cutoff| since <= cutoff)
    }

    /// Entry as observed by clients: an expired pending entry reads as absent.
    pub fn resolve(self, now: OffsetDateTime, lease: Option<Duration>) -> Self {
        if self.lease_expired(now, lease) {
            Self::absent(self.key)
        } else {
            self
        }
    }

    /// Value visible to clients; only ready entries expose one.
    pub fn visible_value(&self) -> Option<&str> {
        match self.status {
            EntryStatus::Ready => self.value.as_deref(),
            _ => None,
        }
    }
}

/// Oldest `pending_since` still inside the lease at `now`.
///
/// `None` when the lease reaches past the representable date range, in which
/// case nothing expires.
pub fn lease_cutoff(now: OffsetDateTime, lease: Duration) -> Option<OffsetDateTime> {
    let lease = time::Duration::try_from(lease).ok()?;
    now.checked_sub(lease)
}

/// Reject keys the stores cannot address.
pub fn validate_key(key: &str) -> Result<(), DomainError> {
    if key.trim().is_empty() {
        return Err(DomainError::validation("key", "must not be blank"));
    }
    if key.len() > MAX_KEY_BYTES {
        return Err(DomainError::validation(
            "key",
            format!("must be at most {MAX_KEY_BYTES} bytes"),
        ));
    }
    if key.chars().any(char::is_control) {
        return Err(DomainError::validation(
            "key",
            "must not contain control characters",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn resubmission_withdraws_ready_value() {
        let now = datetime!(2025-01-01 00:00 UTC);
        let ready = CacheEntry::absent("demo").into_ready("v1".into(), now);
        let pending = ready.into_pending(now);

        assert_eq!(pending.status, EntryStatus::Pending);
        assert_eq!(pending.visible_value(), None);
        assert_eq!(pending.written_at, Some(now));
    }

    #[test]
    fn expired_pending_resolves_to_absent() {
        let since = datetime!(2025-01-01 00:00 UTC);
        let entry = CacheEntry::absent("demo").into_pending(since);
        let lease = Some(Duration::from_secs(60));

        let fresh = entry.clone().resolve(since + Duration::from_secs(59), lease);
        assert_eq!(fresh.status, EntryStatus::Pending);

        let stale = entry.clone().resolve(since + Duration::from_secs(60), lease);
        assert_eq!(stale.status, EntryStatus::Absent);

        let unbounded = entry.resolve(since + Duration::from_secs(86_400), None);
        assert_eq!(unbounded.status, EntryStatus::Pending);
    }

    #[test]
    fn ready_entries_never_expire() {
        let now = datetime!(2025-01-01 00:00 UTC);
        let entry = CacheEntry::absent("demo").into_ready("v".into(), now);
        assert!(!entry.lease_expired(now + Duration::from_secs(3600), Some(Duration::ZERO)));
    }

    #[test]
    fn lease_beyond_the_date_range_never_expires() {
        let since = datetime!(2025-01-01 00:00 UTC);
        let entry = CacheEntry::absent("demo").into_pending(since);
        let huge = Some(Duration::from_secs(u64::MAX / 2));

        let later = since + Duration::from_secs(86_400);
        assert!(!entry.lease_expired(later, huge));
        assert_eq!(entry.resolve(later, huge).status, EntryStatus::Pending);
        assert_eq!(lease_cutoff(later, Duration::from_secs(u64::MAX)), None);
    }

    #[test]
    fn cutoff_boundary_is_inclusive() {
        let now = datetime!(2025-01-01 00:10 UTC);
        let lease = Duration::from_secs(600);
        let cutoff = lease_cutoff(now, lease).expect("cutoff in range");
        assert_eq!(cutoff, datetime!(2025-01-01 00:00 UTC));

        let entry = CacheEntry::absent("demo").into_pending(cutoff);
        assert!(entry.lease_expired(now, Some(lease)));
    }

    #[test]
    fn key_validation_rejects_blank_and_oversized_keys() {
        assert!(validate_key("demo").is_ok());
        assert!(validate_key("  ").is_err());
        assert!(validate_key(&"k".repeat(MAX_KEY_BYTES + 1)).is_err());
        assert!(validate_key("a\nb").is_err());
    }
}
