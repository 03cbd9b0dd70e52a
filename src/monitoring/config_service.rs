//! Resolves which download URL and parameters a speed test run should use.
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::db::models::MonitoringTarget;
use crate::db::repositories::UserSpeedTestPreferenceRepository;

use super::error::MonitorError;

/// One entry of the built-in download URL catalog.
#[derive(Debug, Clone, Serialize)]
pub struct SpeedTestUrl {
    pub id: String,
    pub name: String,
    pub url: String,
    pub size_bytes: u64,
    pub provider: String,
    pub enabled: bool,
    pub priority: u32,
}

/// Resolved parameters for a single speed test run. Computed per run,
/// never persisted.
#[derive(Debug, Clone)]
pub struct SpeedTestConfig {
    pub target_address: String,
    pub timeout: Duration,
    pub download_url: String,
    pub speed_test_url_id: Option<String>,
    pub retry_count: u32,
}

pub struct SpeedTestConfigService {
    preferences: Arc<dyn UserSpeedTestPreferenceRepository>,
    catalog: Vec<SpeedTestUrl>,
    /// Server-level URL override; wins over any stored preference.
    override_url: Option<String>,
    default_timeout: Duration,
    retry_count: u32,
}

impl SpeedTestConfigService {
    pub fn new(
        preferences: Arc<dyn UserSpeedTestPreferenceRepository>,
        override_url: Option<String>,
        default_timeout: Duration,
        retry_count: u32,
    ) -> Self {
        Self {
            preferences,
            catalog: default_catalog(),
            override_url,
            default_timeout,
            retry_count,
        }
    }

    pub fn all_urls(&self) -> &[SpeedTestUrl] {
        &self.catalog
    }

    pub fn enabled_urls(&self) -> Vec<&SpeedTestUrl> {
        self.catalog.iter().filter(|u| u.enabled).collect()
    }

    /// Resolution order: server override, then the user's stored
    /// preference, then the highest-priority enabled catalog entry.
    /// A missing or dangling preference falls back silently; only an
    /// unreachable preference store is an error.
    pub async fn resolve_config(
        &self,
        user_id: &str,
        target: &MonitoringTarget,
    ) -> Result<SpeedTestConfig, MonitorError> {
        if let Some(url) = &self.override_url {
            return Ok(self.build(target, url.clone(), None));
        }

        let preference = self
            .preferences
            .get_by_user_id(user_id)
            .await
            .map_err(|e| MonitorError::ConfigResolution(e.to_string()))?;

        if let Some(preference) = preference {
            if let Some(entry) = self
                .catalog
                .iter()
                .find(|u| u.enabled && u.id == preference.speed_test_url_id)
            {
                return Ok(self.build(target, entry.url.clone(), Some(entry.id.clone())));
            }
            warn!(
                user_id = %user_id,
                speed_test_url_id = %preference.speed_test_url_id,
                "stored preference matches no enabled url, using default"
            );
        }

        let default = self.default_url()?;
        Ok(self.build(target, default.url.clone(), Some(default.id.clone())))
    }

    fn default_url(&self) -> Result<&SpeedTestUrl, MonitorError> {
        self.catalog
            .iter()
            .filter(|u| u.enabled)
            .min_by_key(|u| u.priority)
            .ok_or_else(|| MonitorError::ConfigResolution("no enabled speed test url".to_string()))
    }

    fn build(
        &self,
        target: &MonitoringTarget,
        download_url: String,
        speed_test_url_id: Option<String>,
    ) -> SpeedTestConfig {
        SpeedTestConfig {
            target_address: target.address.clone(),
            timeout: self.default_timeout,
            download_url,
            speed_test_url_id,
            retry_count: self.retry_count,
        }
    }
}

fn default_catalog() -> Vec<SpeedTestUrl> {
    vec![
        SpeedTestUrl {
            id: "cachefly-10mb".to_string(),
            name: "CacheFly 10MB".to_string(),
            url: "http://cachefly.cachefly.net/10mb.test".to_string(),
            size_bytes: 10 * 1024 * 1024,
            provider: "CacheFly".to_string(),
            enabled: true,
            priority: 1,
        },
        SpeedTestUrl {
            id: "cachefly-100mb".to_string(),
            name: "CacheFly 100MB".to_string(),
            url: "http://cachefly.cachefly.net/100mb.test".to_string(),
            size_bytes: 100 * 1024 * 1024,
            provider: "CacheFly".to_string(),
            enabled: true,
            priority: 2,
        },
        SpeedTestUrl {
            id: "thinkbroadband-5mb".to_string(),
            name: "ThinkBroadband 5MB".to_string(),
            url: "http://ipv4.download.thinkbroadband.com/5MB.zip".to_string(),
            size_bytes: 5 * 1024 * 1024,
            provider: "ThinkBroadband".to_string(),
            enabled: true,
            priority: 3,
        },
        SpeedTestUrl {
            id: "thinkbroadband-50mb".to_string(),
            name: "ThinkBroadband 50MB".to_string(),
            url: "http://ipv4.download.thinkbroadband.com/50MB.zip".to_string(),
            size_bytes: 50 * 1024 * 1024,
            provider: "ThinkBroadband".to_string(),
            enabled: true,
            priority: 4,
        },
    ]
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::db::memory::InMemoryUserSpeedTestPreferenceRepository;
    use crate::db::models::UserSpeedTestPreference;
    use crate::db::repositories::RepositoryError;

    fn target() -> MonitoringTarget {
        MonitoringTarget {
            id: "t1".to_string(),
            name: "home router".to_string(),
            address: "https://example.com".to_string(),
            owner_id: "u1".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn service(
        preferences: Arc<dyn UserSpeedTestPreferenceRepository>,
        override_url: Option<String>,
    ) -> SpeedTestConfigService {
        SpeedTestConfigService::new(preferences, override_url, Duration::from_secs(10), 2)
    }

    #[tokio::test]
    async fn missing_preference_falls_back_to_default_url() {
        let prefs = Arc::new(InMemoryUserSpeedTestPreferenceRepository::new());
        let config = service(prefs, None)
            .resolve_config("u1", &target())
            .await
            .unwrap();

        assert_eq!(config.download_url, "http://cachefly.cachefly.net/10mb.test");
        assert_eq!(config.speed_test_url_id.as_deref(), Some("cachefly-10mb"));
        assert_eq!(config.target_address, "https://example.com");
    }

    #[tokio::test]
    async fn stored_preference_selects_matching_catalog_entry() {
        let prefs = Arc::new(InMemoryUserSpeedTestPreferenceRepository::new());
        prefs.upsert("u1", "thinkbroadband-5mb").await.unwrap();

        let config = service(prefs, None)
            .resolve_config("u1", &target())
            .await
            .unwrap();

        assert_eq!(
            config.speed_test_url_id.as_deref(),
            Some("thinkbroadband-5mb")
        );
    }

    #[tokio::test]
    async fn dangling_preference_falls_back_to_default_url() {
        let prefs = Arc::new(InMemoryUserSpeedTestPreferenceRepository::new());
        prefs.upsert("u1", "no-such-url").await.unwrap();

        let config = service(prefs, None)
            .resolve_config("u1", &target())
            .await
            .unwrap();

        assert_eq!(config.speed_test_url_id.as_deref(), Some("cachefly-10mb"));
    }

    #[tokio::test]
    async fn server_override_wins_over_preference() {
        let prefs = Arc::new(InMemoryUserSpeedTestPreferenceRepository::new());
        prefs.upsert("u1", "thinkbroadband-5mb").await.unwrap();

        let config = service(prefs, Some("https://speed.example.net/100MB.bin".to_string()))
            .resolve_config("u1", &target())
            .await
            .unwrap();

        assert_eq!(config.download_url, "https://speed.example.net/100MB.bin");
        assert!(config.speed_test_url_id.is_none());
    }

    struct UnreachablePreferenceRepository;

    #[async_trait]
    impl UserSpeedTestPreferenceRepository for UnreachablePreferenceRepository {
        async fn get_by_user_id(
            &self,
            _user_id: &str,
        ) -> Result<Option<UserSpeedTestPreference>, RepositoryError> {
            Err(RepositoryError::NotFound(
                "preference store unreachable".to_string(),
            ))
        }

        async fn upsert(
            &self,
            _user_id: &str,
            _speed_test_url_id: &str,
        ) -> Result<UserSpeedTestPreference, RepositoryError> {
            Err(RepositoryError::NotFound(
                "preference store unreachable".to_string(),
            ))
        }
    }

    #[tokio::test]
    async fn unreachable_preference_store_is_an_error() {
        let result = service(Arc::new(UnreachablePreferenceRepository), None)
            .resolve_config("u1", &target())
            .await;

        assert!(matches!(result, Err(MonitorError::ConfigResolution(_))));
    }
}
