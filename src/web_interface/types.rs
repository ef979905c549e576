use serde::{de, Deserialize, Deserializer, Serialize};

use crate::storage::types::{Backend, SessionSummary, StoredRecord};

/// API error payload
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl ApiError {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            index: None,
        }
    }

    pub fn at(mut self, index: Option<usize>) -> Self {
        self.index = index;
        self
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub inserted: usize,
}

#[derive(Debug, Serialize)]
pub struct SessionRecordsResponse {
    pub session_id: String,
    pub records: Vec<StoredRecord>,
}

#[derive(Debug, Serialize)]
pub struct SummariesResponse {
    pub items: Vec<SessionSummary>,
    pub total: u64,
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub deleted: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<Backend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_records: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_sessions: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `?offset=&limit=` query string; missing or empty values take the page defaults.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub offset: Option<u64>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub limit: Option<u64>,
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => raw.trim().parse().map(Some).map_err(|e| {
            de::Error::custom(format!("invalid page number {:?}: {}", raw, e))
        }),
        _ => Ok(None),
    }
}
