use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_PAGE_LIMIT: u64 = 50;
pub const MAX_PAGE_LIMIT: u64 = 500;

/// One flattened telemetry entry, as produced by the normalizer.
///
/// Every leaf is optional: fields absent from the upload stay `None` and are stored as NULL.
/// Field order matches the column order of the `session_records` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: Option<String>,
    pub phase: Option<String>,
    pub area: Option<String>,
    pub timestamp: Option<String>,
    pub conversation_speaker: Option<String>,
    pub conversation_text: Option<String>,
    pub hmd_position_x: Option<f64>,
    pub hmd_position_y: Option<f64>,
    pub hmd_position_z: Option<f64>,
    pub hmd_gaze_x: Option<f64>,
    pub hmd_gaze_y: Option<f64>,
    pub hmd_gaze_z: Option<f64>,
    pub hmd_gaze_actor: Option<String>,
    pub hmd_movement_speed: Option<f64>,
    pub controller_r_position_x: Option<f64>,
    pub controller_r_position_y: Option<f64>,
    pub controller_r_position_z: Option<f64>,
    pub controller_l_position_x: Option<f64>,
    pub controller_l_position_y: Option<f64>,
    pub controller_l_position_z: Option<f64>,
    pub controller_r_interacted_actor: Option<String>,
    pub controller_l_interacted_actor: Option<String>,
    pub controller_r_movement_speed: Option<f64>,
    pub controller_l_movement_speed: Option<f64>,
    pub user_emotion: Option<String>,
    pub emotion_window_flag: Option<bool>,
}

/// A `SessionRecord` as read back from storage, with its surrogate key and insertion time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: i64,
    #[serde(flatten)]
    pub record: SessionRecord,
    /// RFC3339 UTC timestamp assigned by the server on insert
    pub created_at: String,
}

/// Offset/limit pair for paginated reads. The limit is always within `1..=MAX_PAGE_LIMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    offset: u64,
    limit: u64,
}

impl PageRequest {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit: limit.clamp(1, MAX_PAGE_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    // SQL binds are signed on both backends
    pub(crate) fn sql_offset(&self) -> i64 {
        i64::try_from(self.offset).unwrap_or(i64::MAX)
    }

    pub(crate) fn sql_limit(&self) -> i64 {
        self.limit as i64
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, DEFAULT_PAGE_LIMIT)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordPage {
    pub records: Vec<StoredRecord>,
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateStats {
    pub total_records: u64,
    pub unique_sessions: u64,
    pub emotion_counts: BTreeMap<String, u64>,
    pub earliest_timestamp: Option<String>,
    pub latest_timestamp: Option<String>,
    pub recent_records_24h: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub records: u64,
    pub first_created: String,
    pub last_created: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummaryPage {
    pub items: Vec<SessionSummary>,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub backend: Backend,
    pub total_records: u64,
    pub total_sessions: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Postgres,
    Sqlite,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Postgres => write!(f, "postgres"),
            Backend::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Converts a SQL `COUNT(*)` result into an unsigned count.
pub(crate) fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn page_request_clamps_limit() {
        assert_eq!(PageRequest::new(0, 0).limit(), 1);
        assert_eq!(PageRequest::new(0, 10_000).limit(), MAX_PAGE_LIMIT);
        assert_eq!(PageRequest::new(7, 20).limit(), 20);
        assert_eq!(PageRequest::new(7, 20).offset(), 7);
        assert_eq!(PageRequest::default().limit(), DEFAULT_PAGE_LIMIT);
    }

    #[test]
    fn page_request_offset_saturates_for_sql() {
        assert_eq!(PageRequest::new(u64::MAX, 1).sql_offset(), i64::MAX);
    }

    #[test]
    fn stored_record_serializes_flat() {
        let stored = StoredRecord {
            id: 4,
            record: SessionRecord {
                session_id: Some("a".into()),
                emotion_window_flag: Some(true),
                ..Default::default()
            },
            created_at: "2025-01-01T00:00:00.000000Z".into(),
        };
        let value = serde_json::to_value(&stored).unwrap();
        assert_eq!(value["id"], json!(4));
        assert_eq!(value["session_id"], json!("a"));
        assert_eq!(value["emotion_window_flag"], json!(true));
        assert_eq!(value["hmd_gaze_actor"], json!(null));
        assert_eq!(value["created_at"], json!("2025-01-01T00:00:00.000000Z"));
        assert!(value.get("record").is_none());
    }

    #[test]
    fn backend_names() {
        assert_eq!(Backend::Postgres.to_string(), "postgres");
        assert_eq!(serde_json::to_value(Backend::Sqlite).unwrap(), json!("sqlite"));
    }
}
