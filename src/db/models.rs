use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A monitored network endpoint (host or URL) with an owner.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MonitoringTarget {
    pub id: String,
    pub name: String,
    pub address: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTarget {
    pub name: String,
    pub address: String,
    pub owner_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTarget {
    pub name: Option<String>,
    pub address: Option<String>,
}

/// One persisted probe outcome. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SpeedTestResult {
    pub id: String,
    pub target_id: String,
    pub timestamp: DateTime<Utc>,
    pub ping_ms: Option<f64>,
    pub jitter_ms: Option<f64>,
    pub download_mbps: Option<f64>,
    pub success: bool,
    pub error: Option<String>,
    /// Which catalog entry produced the download sample, when one was used.
    pub speed_test_url_id: Option<String>,
}

/// Payload for persisting a new probe outcome.
#[derive(Debug, Clone)]
pub struct NewSpeedTestResult {
    pub target_id: String,
    pub ping_ms: Option<f64>,
    pub jitter_ms: Option<f64>,
    pub download_mbps: Option<f64>,
    pub success: bool,
    pub error: Option<String>,
    pub speed_test_url_id: Option<String>,
}

/// A user's stored choice of speed-test download URL.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserSpeedTestPreference {
    pub user_id: String,
    pub speed_test_url_id: String,
    pub updated_at: DateTime<Utc>,
}
