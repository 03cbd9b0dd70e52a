//! In-memory repositories for tests and local development without a database.
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::models::{
    CreateTarget, MonitoringTarget, NewSpeedTestResult, SpeedTestResult, UpdateTarget,
    UserSpeedTestPreference,
};
use super::repositories::{
    RepositoryError, SpeedTestResultRepository, TargetRepository,
    UserSpeedTestPreferenceRepository,
};

#[derive(Default)]
pub struct InMemoryTargetRepository {
    targets: Mutex<Vec<MonitoringTarget>>,
}

impl InMemoryTargetRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TargetRepository for InMemoryTargetRepository {
    async fn create(&self, data: CreateTarget) -> Result<MonitoringTarget, RepositoryError> {
        let now = Utc::now();
        let target = MonitoringTarget {
            id: Uuid::new_v4().to_string(),
            name: data.name,
            address: data.address,
            owner_id: data.owner_id,
            created_at: now,
            updated_at: now,
        };
        self.targets.lock().unwrap().push(target.clone());
        Ok(target)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<MonitoringTarget>, RepositoryError> {
        Ok(self
            .targets
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == id)
            .cloned())
    }

    async fn find_by_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<MonitoringTarget>, RepositoryError> {
        Ok(self
            .targets
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn update(
        &self,
        id: &str,
        data: UpdateTarget,
    ) -> Result<MonitoringTarget, RepositoryError> {
        let mut targets = self.targets.lock().unwrap();
        let target = targets
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| RepositoryError::NotFound(format!("target {id}")))?;
        if let Some(name) = data.name {
            target.name = name;
        }
        if let Some(address) = data.address {
            target.address = address;
        }
        target.updated_at = Utc::now();
        Ok(target.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        let mut targets = self.targets.lock().unwrap();
        let before = targets.len();
        targets.retain(|t| t.id != id);
        if targets.len() == before {
            return Err(RepositoryError::NotFound(format!("target {id}")));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySpeedTestResultRepository {
    results: Mutex<Vec<SpeedTestResult>>,
}

impl InMemorySpeedTestResultRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<SpeedTestResult> {
        self.results.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeedTestResultRepository for InMemorySpeedTestResultRepository {
    async fn create(&self, data: NewSpeedTestResult) -> Result<SpeedTestResult, RepositoryError> {
        let result = SpeedTestResult {
            id: Uuid::new_v4().to_string(),
            target_id: data.target_id,
            timestamp: Utc::now(),
            ping_ms: data.ping_ms,
            jitter_ms: data.jitter_ms,
            download_mbps: data.download_mbps,
            success: data.success,
            error: data.error,
            speed_test_url_id: data.speed_test_url_id,
        };
        self.results.lock().unwrap().push(result.clone());
        Ok(result)
    }

    async fn find_by_target(
        &self,
        target_id: &str,
        limit: i64,
    ) -> Result<Vec<SpeedTestResult>, RepositoryError> {
        let mut results: Vec<SpeedTestResult> = self
            .results
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.target_id == target_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        results.truncate(limit.max(0) as usize);
        Ok(results)
    }
}

#[derive(Default)]
pub struct InMemoryUserSpeedTestPreferenceRepository {
    preferences: Mutex<HashMap<String, UserSpeedTestPreference>>,
}

impl InMemoryUserSpeedTestPreferenceRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserSpeedTestPreferenceRepository for InMemoryUserSpeedTestPreferenceRepository {
    async fn get_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Option<UserSpeedTestPreference>, RepositoryError> {
        Ok(self.preferences.lock().unwrap().get(user_id).cloned())
    }

    async fn upsert(
        &self,
        user_id: &str,
        speed_test_url_id: &str,
    ) -> Result<UserSpeedTestPreference, RepositoryError> {
        let preference = UserSpeedTestPreference {
            user_id: user_id.to_string(),
            speed_test_url_id: speed_test_url_id.to_string(),
            updated_at: Utc::now(),
        };
        self.preferences
            .lock()
            .unwrap()
            .insert(user_id.to_string(), preference.clone());
        Ok(preference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_replaces_existing_preference() {
        let repo = InMemoryUserSpeedTestPreferenceRepository::new();
        repo.upsert("u1", "cachefly-10mb").await.unwrap();
        repo.upsert("u1", "thinkbroadband-5mb").await.unwrap();

        let preference = repo.get_by_user_id("u1").await.unwrap().unwrap();
        assert_eq!(preference.speed_test_url_id, "thinkbroadband-5mb");
    }

    #[tokio::test]
    async fn results_are_returned_newest_first_and_limited() {
        let repo = InMemorySpeedTestResultRepository::new();
        for i in 0..5 {
            repo.create(NewSpeedTestResult {
                target_id: "t1".to_string(),
                ping_ms: Some(f64::from(i)),
                jitter_ms: None,
                download_mbps: None,
                success: true,
                error: None,
                speed_test_url_id: None,
            })
            .await
            .unwrap();
        }

        let results = repo.find_by_target("t1", 3).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0].timestamp >= results[1].timestamp);
        assert!(results[1].timestamp >= results[2].timestamp);
    }
}
