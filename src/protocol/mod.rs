use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    /// False when further pages exist; only the first page is fetched.
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationPayload {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: Option<i64>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub filter_types: Option<Vec<String>>,
    #[serde(default)]
    pub channels: Option<Vec<String>>,
    #[serde(default)]
    pub rate_limit: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body for endpoint create and update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointPayload {
    pub url: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    pub filter_types: Option<Vec<String>>,
    pub channels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,
}

impl EndpointPayload {
    /// Keeps the endpoint as it is except for the filter types.
    pub fn with_filter_types(endpoint: &Endpoint, filter_types: Option<Vec<String>>) -> Self {
        let channels: Vec<String> = endpoint
            .channels
            .iter()
            .flatten()
            .map(|channel| channel.trim())
            .filter(|channel| !channel.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        Self {
            url: endpoint.url.clone(),
            description: endpoint.description.clone(),
            disabled: Some(endpoint.disabled),
            filter_types,
            channels: if channels.is_empty() {
                None
            } else {
                Some(channels)
            },
            rate_limit: endpoint.rate_limit,
        }
    }
}

/// Partial update that only flips the disabled flag.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EndpointStatusPatch {
    pub disabled: bool,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct EndpointStats {
    #[serde(default)]
    pub success: u64,
    #[serde(default)]
    pub pending: u64,
    #[serde(default)]
    pub sending: u64,
    #[serde(default)]
    pub fail: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventType {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub deprecated: bool,
}

/// Body for event-type create and update. A blank description is omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTypePayload {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub event_type: String,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub channels: Option<Vec<String>>,
    #[serde(default)]
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub event_type: String,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub id: String,
    pub msg_id: String,
    pub endpoint_id: String,
    pub url: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub response_status_code: i32,
    #[serde(default)]
    pub response_duration_ms: i64,
    pub status: DeliveryStatus,
    pub trigger_type: TriggerType,
    pub timestamp: DateTime<Utc>,
    /// Only present when listed with `with_msg=true`.
    #[serde(default)]
    pub msg: Option<Message>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Success,
    Pending,
    Failed,
    Sending,
    Unknown(i64),
}

impl DeliveryStatus {
    pub fn label(self) -> &'static str {
        match self {
            DeliveryStatus::Success => "Success",
            DeliveryStatus::Pending => "Pending",
            DeliveryStatus::Failed => "Failed",
            DeliveryStatus::Sending => "Sending",
            DeliveryStatus::Unknown(_) => "Unknown",
        }
    }
}

impl<'de> Deserialize<'de> for DeliveryStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let code = i64::deserialize(deserializer)?;
        let status = match code {
            0 => Self::Success,
            1 => Self::Pending,
            2 => Self::Failed,
            3 => Self::Sending,
            other => Self::Unknown(other),
        };

        Ok(status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerType {
    Scheduled,
    Manual,
    Unknown(i64),
}

impl TriggerType {
    pub fn label(self) -> &'static str {
        match self {
            TriggerType::Scheduled => "Scheduled",
            TriggerType::Manual => "Manual",
            TriggerType::Unknown(_) => "Unknown",
        }
    }
}

impl<'de> Deserialize<'de> for TriggerType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let code = i64::deserialize(deserializer)?;
        Ok(match code {
            0 => Self::Scheduled,
            1 => Self::Manual,
            other => Self::Unknown(other),
        })
    }
}

/// Structured rejection body returned by the service on 4xx/5xx.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

/// Background task handle returned by recover and replay-missing.
#[derive(Debug, Clone, Deserialize)]
pub struct BackgroundTask {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub task: String,
}

impl BackgroundTask {
    pub fn is_running(&self) -> bool {
        self.status == "running"
    }
}
