use async_trait::async_trait;
use thiserror::Error;

use super::models::{
    CreateTarget, MonitoringTarget, NewSpeedTestResult, SpeedTestResult, UpdateTarget,
    UserSpeedTestPreference,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0} not found")]
    NotFound(String),
}

#[async_trait]
pub trait TargetRepository: Send + Sync {
    async fn create(&self, data: CreateTarget) -> Result<MonitoringTarget, RepositoryError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<MonitoringTarget>, RepositoryError>;
    async fn find_by_owner(&self, owner_id: &str)
    -> Result<Vec<MonitoringTarget>, RepositoryError>;
    async fn update(
        &self,
        id: &str,
        data: UpdateTarget,
    ) -> Result<MonitoringTarget, RepositoryError>;
    async fn delete(&self, id: &str) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SpeedTestResultRepository: Send + Sync {
    async fn create(&self, data: NewSpeedTestResult) -> Result<SpeedTestResult, RepositoryError>;
    async fn find_by_target(
        &self,
        target_id: &str,
        limit: i64,
    ) -> Result<Vec<SpeedTestResult>, RepositoryError>;
}

#[async_trait]
pub trait UserSpeedTestPreferenceRepository: Send + Sync {
    async fn get_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Option<UserSpeedTestPreference>, RepositoryError>;
    async fn upsert(
        &self,
        user_id: &str,
        speed_test_url_id: &str,
    ) -> Result<UserSpeedTestPreference, RepositoryError>;
}
