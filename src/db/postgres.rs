//! Postgres-backed repositories.
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{
    CreateTarget, MonitoringTarget, NewSpeedTestResult, SpeedTestResult, UpdateTarget,
    UserSpeedTestPreference,
};
use super::repositories::{
    RepositoryError, SpeedTestResultRepository, TargetRepository,
    UserSpeedTestPreferenceRepository,
};

#[derive(Clone)]
pub struct PgTargetRepository {
    pool: PgPool,
}

impl PgTargetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TargetRepository for PgTargetRepository {
    async fn create(&self, data: CreateTarget) -> Result<MonitoringTarget, RepositoryError> {
        let target = sqlx::query_as::<_, MonitoringTarget>(
            "INSERT INTO monitoring_targets (id, name, address, owner_id, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5)
             RETURNING *",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(data.name)
        .bind(data.address)
        .bind(data.owner_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(target)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<MonitoringTarget>, RepositoryError> {
        let target =
            sqlx::query_as::<_, MonitoringTarget>("SELECT * FROM monitoring_targets WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(target)
    }

    async fn find_by_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<MonitoringTarget>, RepositoryError> {
        let targets = sqlx::query_as::<_, MonitoringTarget>(
            "SELECT * FROM monitoring_targets WHERE owner_id = $1 ORDER BY created_at",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(targets)
    }

    async fn update(
        &self,
        id: &str,
        data: UpdateTarget,
    ) -> Result<MonitoringTarget, RepositoryError> {
        let target = sqlx::query_as::<_, MonitoringTarget>(
            "UPDATE monitoring_targets
             SET name = COALESCE($2, name), address = COALESCE($3, address), updated_at = NOW()
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(data.name)
        .bind(data.address)
        .fetch_optional(&self.pool)
        .await?;
        target.ok_or_else(|| RepositoryError::NotFound(format!("target {id}")))
    }

    async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM monitoring_targets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("target {id}")));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgSpeedTestResultRepository {
    pool: PgPool,
}

impl PgSpeedTestResultRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SpeedTestResultRepository for PgSpeedTestResultRepository {
    async fn create(&self, data: NewSpeedTestResult) -> Result<SpeedTestResult, RepositoryError> {
        let result = sqlx::query_as::<_, SpeedTestResult>(
            "INSERT INTO speed_test_results
                 (id, target_id, timestamp, ping_ms, jitter_ms, download_mbps,
                  success, error, speed_test_url_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING *",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(data.target_id)
        .bind(Utc::now())
        .bind(data.ping_ms)
        .bind(data.jitter_ms)
        .bind(data.download_mbps)
        .bind(data.success)
        .bind(data.error)
        .bind(data.speed_test_url_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(result)
    }

    async fn find_by_target(
        &self,
        target_id: &str,
        limit: i64,
    ) -> Result<Vec<SpeedTestResult>, RepositoryError> {
        let results = sqlx::query_as::<_, SpeedTestResult>(
            "SELECT * FROM speed_test_results
             WHERE target_id = $1
             ORDER BY timestamp DESC
             LIMIT $2",
        )
        .bind(target_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(results)
    }
}

#[derive(Clone)]
pub struct PgUserSpeedTestPreferenceRepository {
    pool: PgPool,
}

impl PgUserSpeedTestPreferenceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserSpeedTestPreferenceRepository for PgUserSpeedTestPreferenceRepository {
    async fn get_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Option<UserSpeedTestPreference>, RepositoryError> {
        let preference = sqlx::query_as::<_, UserSpeedTestPreference>(
            "SELECT * FROM user_speed_test_preferences WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(preference)
    }

    async fn upsert(
        &self,
        user_id: &str,
        speed_test_url_id: &str,
    ) -> Result<UserSpeedTestPreference, RepositoryError> {
        let preference = sqlx::query_as::<_, UserSpeedTestPreference>(
            "INSERT INTO user_speed_test_preferences (user_id, speed_test_url_id, updated_at)
             VALUES ($1, $2, NOW())
             ON CONFLICT (user_id)
             DO UPDATE SET speed_test_url_id = EXCLUDED.speed_test_url_id, updated_at = NOW()
             RETURNING *",
        )
        .bind(user_id)
        .bind(speed_test_url_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(preference)
    }
}
