//! Settings service: DB-backed runtime toggles with an in-process cache.
//!
//! Every read path masks sensitive values (keys matching
//! `secret|token|password|api_key|private_key`); raw values stay inside
//! this module's writers.

use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use tracing::info;

use crate::core::domain::SystemSetting;
use crate::core::store::{Repository, SharedRepository};
use crate::error::Result;

/// Cache entries expire quickly; the store stays the source of truth.
const CACHE_TTL: Duration = Duration::from_secs(5);

pub struct SettingsService {
    repo: SharedRepository,
    cache: DashMap<String, (SystemSetting, Instant)>,
}

impl SettingsService {
    #[must_use]
    pub fn new(repo: SharedRepository) -> Self {
        Self {
            repo,
            cache: DashMap::new(),
        }
    }

    async fn get_raw(&self, key: &str) -> Result<Option<SystemSetting>> {
        if let Some(entry) = self.cache.get(key) {
            let (setting, cached_at) = entry.value();
            if cached_at.elapsed() < CACHE_TTL {
                return Ok(Some(setting.clone()));
            }
        }
        let setting = self.repo.get_setting(key).await?;
        if let Some(setting) = &setting {
            self.cache
                .insert(key.to_string(), (setting.clone(), Instant::now()));
        }
        Ok(setting)
    }

    /// Read one setting; sensitive values come back masked.
    pub async fn get(&self, key: &str) -> Result<Option<SystemSetting>> {
        Ok(self.get_raw(key).await?.map(|s| s.masked()))
    }

    /// List all settings; sensitive values come back masked.
    pub async fn list(&self) -> Result<Vec<SystemSetting>> {
        Ok(self
            .repo
            .list_settings()
            .await?
            .into_iter()
            .map(|s| s.masked())
            .collect())
    }

    /// Write a setting and refresh the cache.
    pub async fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let setting = SystemSetting {
            key: key.to_string(),
            value,
            description: None,
            updated_at: Utc::now(),
        };
        self.repo.upsert_setting(&setting).await?;
        self.cache
            .insert(key.to_string(), (setting.clone(), Instant::now()));
        if setting.is_sensitive() {
            info!(key = %key, "sensitive setting updated");
        } else {
            info!(key = %key, value = %setting.value, "setting updated");
        }
        Ok(())
    }

    /// Check a `feature.<name>` switch, falling back to the component's
    /// default when unset.
    pub async fn feature_enabled(&self, key: &str, default: bool) -> Result<bool> {
        Ok(self
            .get_raw(key)
            .await?
            .and_then(|s| s.value.as_bool())
            .unwrap_or(default))
    }

    /// Drop all cached entries (test and admin seam).
    pub fn invalidate_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{feature, MASK};
    use crate::core::store::{MemoryRepository, Repository};
    use std::sync::Arc;

    fn service(repo: &Arc<MemoryRepository>) -> SettingsService {
        SettingsService::new(Arc::clone(repo) as SharedRepository)
    }

    #[tokio::test]
    async fn feature_switch_defaults_apply_when_unset() {
        let repo = Arc::new(MemoryRepository::new());
        let settings = service(&repo);
        // Strategy engine defaults off, catalog sync defaults on.
        assert!(!settings
            .feature_enabled(feature::STRATEGY_ENGINE, false)
            .await
            .unwrap());
        assert!(settings
            .feature_enabled(feature::CATALOG_SYNC, true)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn feature_switch_reads_stored_value() {
        let repo = Arc::new(MemoryRepository::new());
        let settings = service(&repo);
        settings
            .set(feature::STRATEGY_ENGINE, serde_json::json!(true))
            .await
            .unwrap();
        assert!(settings
            .feature_enabled(feature::STRATEGY_ENGINE, false)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn sensitive_values_are_masked_on_every_read_path() {
        let repo = Arc::new(MemoryRepository::new());
        let settings = service(&repo);
        settings
            .set("clob.api_key", serde_json::json!("sk-live-abc123"))
            .await
            .unwrap();

        let got = settings.get("clob.api_key").await.unwrap().unwrap();
        assert_eq!(got.value, serde_json::json!(MASK));

        let listed = settings.list().await.unwrap();
        let row = listed.iter().find(|s| s.key == "clob.api_key").unwrap();
        assert_eq!(row.value, serde_json::json!(MASK));

        // The store itself still holds the raw value for internal use.
        let raw = repo.get_setting("clob.api_key").await.unwrap().unwrap();
        assert_eq!(raw.value, serde_json::json!("sk-live-abc123"));
    }

    #[tokio::test]
    async fn cache_serves_repeated_reads() {
        let repo = Arc::new(MemoryRepository::new());
        let settings = service(&repo);
        settings.set("engine.tick", serde_json::json!(30)).await.unwrap();

        // Mutate behind the cache; the cached value should win within TTL.
        repo.upsert_setting(&SystemSetting::new(
            "engine.tick",
            serde_json::json!(60),
        ))
        .await
        .unwrap();

        let got = settings.get("engine.tick").await.unwrap().unwrap();
        assert_eq!(got.value, serde_json::json!(30));

        settings.invalidate_cache();
        let got = settings.get("engine.tick").await.unwrap().unwrap();
        assert_eq!(got.value, serde_json::json!(60));
    }
}
