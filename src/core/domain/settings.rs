//! Runtime settings and feature switches.

use chrono::{DateTime, Utc};

/// A DB-backed runtime setting. Feature toggles live under `feature.<name>`
/// keys with boolean values.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemSetting {
    pub key: String,
    pub value: serde_json::Value,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SystemSetting {
    #[must_use]
    pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value,
            description: None,
            updated_at: Utc::now(),
        }
    }

    /// Whether this key stores a credential and must be masked on read.
    #[must_use]
    pub fn is_sensitive(&self) -> bool {
        is_sensitive_key(&self.key)
    }

    /// Copy with the value replaced by a mask, for read paths.
    #[must_use]
    pub fn masked(&self) -> Self {
        let mut out = self.clone();
        if out.is_sensitive() {
            out.value = serde_json::Value::String(MASK.to_string());
        }
        out
    }
}

/// Placeholder returned instead of sensitive values.
pub const MASK: &str = "******";

const SENSITIVE_MARKERS: &[&str] = &["secret", "token", "password", "api_key", "private_key"];

/// True when the key matches the sensitive pattern
/// `secret|token|password|api_key|private_key`.
#[must_use]
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_MARKERS.iter().any(|m| lower.contains(m))
}

/// Well-known feature switch keys checked by the pipeline.
pub mod feature {
    pub const CATALOG_SYNC: &str = "feature.catalog_sync";
    pub const LABELER: &str = "feature.labeler";
    pub const STRATEGY_ENGINE: &str = "feature.strategy_engine";
    pub const AUTO_EXECUTOR: &str = "feature.auto_executor";
    pub const CLOB_STREAM: &str = "feature.clob_stream";
    pub const DAILY_STATS: &str = "feature.daily_stats";
    pub const REVIEW_SERVICE: &str = "feature.review_service";
    pub const COLLECTORS_INTERNAL: &str = "feature.collectors_internal";
    pub const COLLECTORS_EXTERNAL: &str = "feature.collectors_external";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensitive_keys_are_detected() {
        assert!(is_sensitive_key("clob.api_key"));
        assert!(is_sensitive_key("exchange.SECRET"));
        assert!(is_sensitive_key("wallet.private_key"));
        assert!(is_sensitive_key("telegram_bot_token"));
        assert!(!is_sensitive_key("feature.strategy_engine"));
    }

    #[test]
    fn masked_replaces_value_only_for_sensitive_keys() {
        let secret = SystemSetting::new("clob.secret", serde_json::json!("hunter2"));
        assert_eq!(secret.masked().value, serde_json::json!(MASK));

        let plain = SystemSetting::new("feature.labeler", serde_json::json!(true));
        assert_eq!(plain.masked().value, serde_json::json!(true));
    }
}
