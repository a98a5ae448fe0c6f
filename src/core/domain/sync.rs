//! Resumable sync bookkeeping.

use chrono::{DateTime, Utc};

/// Cursor and watermark state for one sync scope (events, markets, ...).
/// Drives resumable catalog sync across restarts.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncState {
    pub scope: String,
    pub cursor: Option<String>,
    pub watermark_ts: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub stats: serde_json::Value,
}

impl SyncState {
    #[must_use]
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            cursor: None,
            watermark_ts: None,
            last_success_at: None,
            last_attempt_at: None,
            last_error: None,
            stats: serde_json::json!({}),
        }
    }

    /// Record a successful pass ending at `cursor`.
    pub fn mark_success(&mut self, cursor: Option<String>, now: DateTime<Utc>) {
        self.cursor = cursor;
        self.last_success_at = Some(now);
        self.last_attempt_at = Some(now);
        self.last_error = None;
    }

    /// Record a failed pass; the cursor is left untouched so the next
    /// attempt resumes from the same place.
    pub fn mark_failure(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.last_attempt_at = Some(now);
        self.last_error = Some(error.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_preserves_cursor() {
        let mut state = SyncState::new("markets");
        state.mark_success(Some("abc".into()), Utc::now());
        state.mark_failure("timeout", Utc::now());
        assert_eq!(state.cursor.as_deref(), Some("abc"));
        assert_eq!(state.last_error.as_deref(), Some("timeout"));
    }
}
