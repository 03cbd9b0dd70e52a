//! Request and response bodies for the HTTP API.
use serde::{Deserialize, Serialize};

use crate::monitoring::scheduler::MonitorStatus;

#[derive(Debug, Deserialize)]
pub struct CreateTargetRequest {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTargetRequest {
    pub name: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StartMonitoringRequest {
    /// Falls back to the server default when omitted.
    pub interval_ms: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePreferenceRequest {
    pub speed_test_url_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ResultsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ActiveMonitorsResponse {
    pub monitors: Vec<MonitorStatus>,
}
