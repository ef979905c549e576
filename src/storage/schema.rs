//! Table layout shared by both database backends.
//!
//! The column list, row mapping and bind order live here so that the PostgreSQL and SQLite
//! implementations only differ in DDL types, placeholder syntax and connection setup.

use chrono::{SecondsFormat, Utc};

use crate::storage::types::{count, SessionRecord, SessionSummary, StoredRecord};

pub const TABLE: &str = "session_records";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Float,
    Flag,
}

/// Telemetry columns in `SessionRecord` field order. `id` and `created_at` are not included.
pub const RECORD_COLUMNS: [(&str, ColumnKind); 26] = [
    ("session_id", ColumnKind::Text),
    ("phase", ColumnKind::Text),
    ("area", ColumnKind::Text),
    ("timestamp", ColumnKind::Text),
    ("conversation_speaker", ColumnKind::Text),
    ("conversation_text", ColumnKind::Text),
    ("hmd_position_x", ColumnKind::Float),
    ("hmd_position_y", ColumnKind::Float),
    ("hmd_position_z", ColumnKind::Float),
    ("hmd_gaze_x", ColumnKind::Float),
    ("hmd_gaze_y", ColumnKind::Float),
    ("hmd_gaze_z", ColumnKind::Float),
    ("hmd_gaze_actor", ColumnKind::Text),
    ("hmd_movement_speed", ColumnKind::Float),
    ("controller_r_position_x", ColumnKind::Float),
    ("controller_r_position_y", ColumnKind::Float),
    ("controller_r_position_z", ColumnKind::Float),
    ("controller_l_position_x", ColumnKind::Float),
    ("controller_l_position_y", ColumnKind::Float),
    ("controller_l_position_z", ColumnKind::Float),
    ("controller_r_interacted_actor", ColumnKind::Text),
    ("controller_l_interacted_actor", ColumnKind::Text),
    ("controller_r_movement_speed", ColumnKind::Float),
    ("controller_l_movement_speed", ColumnKind::Float),
    ("user_emotion", ColumnKind::Text),
    ("emotion_window_flag", ColumnKind::Flag),
];

/// Column definitions that differ between backends.
pub struct Dialect {
    pub id_column: &'static str,
    pub float_type: &'static str,
    pub placeholder: fn(usize) -> String,
    /// Collation suffix for sorted or compared text, so both backends order bytewise.
    pub bytewise: &'static str,
}

fn quoted(name: &str) -> String {
    format!("\"{}\"", name)
}

/// `CREATE TABLE IF NOT EXISTS` statement for the records table.
pub fn create_table(dialect: &Dialect) -> String {
    let mut columns = vec![dialect.id_column.to_string()];
    for (name, kind) in RECORD_COLUMNS {
        let ty = match kind {
            ColumnKind::Text => "TEXT",
            ColumnKind::Float => dialect.float_type,
            ColumnKind::Flag => "BOOLEAN",
        };
        columns.push(format!("{} {}", quoted(name), ty));
    }
    columns.push("created_at TEXT NOT NULL".to_string());
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        TABLE,
        columns.join(",\n    ")
    )
}

pub fn create_session_index() -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS idx_{0}_session_id ON {0} (session_id)",
        TABLE
    )
}

/// Parameterized insert of one record; the last placeholder is `created_at`.
pub fn insert_statement(dialect: &Dialect) -> String {
    let names: Vec<String> = RECORD_COLUMNS.iter().map(|(name, _)| quoted(name)).collect();
    let values: Vec<String> = (1..=RECORD_COLUMNS.len() + 1)
        .map(dialect.placeholder)
        .collect();
    format!(
        "INSERT INTO {} ({}, created_at) VALUES ({})",
        TABLE,
        names.join(", "),
        values.join(", ")
    )
}

/// Column list for `SELECT`s that decode into `RecordRow`.
pub fn select_columns() -> String {
    let names: Vec<String> = RECORD_COLUMNS.iter().map(|(name, _)| quoted(name)).collect();
    format!("id, {}, created_at", names.join(", "))
}

pub const COUNT_RECORDS: &str = "SELECT COUNT(*) FROM session_records";

pub const COUNT_SESSIONS: &str = "SELECT COUNT(DISTINCT session_id) FROM session_records";


pub const EMOTION_COUNTS: &str = "SELECT user_emotion, COUNT(*) FROM session_records \
     WHERE user_emotion IS NOT NULL AND user_emotion <> '' \
     GROUP BY user_emotion";

pub const DELETE_ALL: &str = "DELETE FROM session_records";

pub const PING: &str = "SELECT 1";

/// Lexicographic bounds of the client `timestamp` column.
pub fn timestamp_bounds(dialect: &Dialect) -> String {
    format!(
        r#"SELECT MIN("timestamp"{0}), MAX("timestamp"{0}) FROM {1} WHERE "timestamp" IS NOT NULL"#,
        dialect.bytewise, TABLE
    )
}

/// Page of records in insertion order. Binds: limit, offset.
pub fn select_page(dialect: &Dialect) -> String {
    format!(
        "SELECT {} FROM {} ORDER BY id ASC LIMIT {} OFFSET {}",
        select_columns(),
        TABLE,
        (dialect.placeholder)(1),
        (dialect.placeholder)(2)
    )
}

/// Every record of one session. Binds: session_id.
pub fn select_by_session(dialect: &Dialect) -> String {
    format!(
        "SELECT {} FROM {} WHERE session_id = {} ORDER BY id ASC",
        select_columns(),
        TABLE,
        (dialect.placeholder)(1)
    )
}

/// Rows inserted at or after a `created_at` cutoff. Binds: cutoff.
pub fn count_created_since(dialect: &Dialect) -> String {
    format!(
        "SELECT COUNT(*) FROM {} WHERE created_at >= {}",
        TABLE,
        (dialect.placeholder)(1)
    )
}

/// One row per session, newest first. Binds: limit, offset.
pub fn select_session_summaries(dialect: &Dialect) -> String {
    format!(
        "SELECT session_id, COUNT(*) AS records, \
         MIN(created_at) AS first_created, MAX(created_at) AS last_created \
         FROM {0} WHERE session_id IS NOT NULL \
         GROUP BY session_id \
         ORDER BY MIN(created_at){1} DESC, session_id{1} ASC \
         LIMIT {2} OFFSET {3}",
        TABLE,
        dialect.bytewise,
        (dialect.placeholder)(1),
        (dialect.placeholder)(2)
    )
}

/// Insertion time stamped on every row of a batch.
///
/// Fixed-width UTC so that string comparison orders the values chronologically.
pub fn created_at_now() -> String {
    format_created_at(Utc::now())
}

pub fn format_created_at(at: chrono::DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Binds every telemetry column of a `SessionRecord` plus `created_at`, in `RECORD_COLUMNS` order.
macro_rules! bind_record {
    ($query:expr, $record:expr, $created_at:expr) => {{
        let r = $record;
        $query
            .bind(r.session_id.as_deref())
            .bind(r.phase.as_deref())
            .bind(r.area.as_deref())
            .bind(r.timestamp.as_deref())
            .bind(r.conversation_speaker.as_deref())
            .bind(r.conversation_text.as_deref())
            .bind(r.hmd_position_x)
            .bind(r.hmd_position_y)
            .bind(r.hmd_position_z)
            .bind(r.hmd_gaze_x)
            .bind(r.hmd_gaze_y)
            .bind(r.hmd_gaze_z)
            .bind(r.hmd_gaze_actor.as_deref())
            .bind(r.hmd_movement_speed)
            .bind(r.controller_r_position_x)
            .bind(r.controller_r_position_y)
            .bind(r.controller_r_position_z)
            .bind(r.controller_l_position_x)
            .bind(r.controller_l_position_y)
            .bind(r.controller_l_position_z)
            .bind(r.controller_r_interacted_actor.as_deref())
            .bind(r.controller_l_interacted_actor.as_deref())
            .bind(r.controller_r_movement_speed)
            .bind(r.controller_l_movement_speed)
            .bind(r.user_emotion.as_deref())
            .bind(r.emotion_window_flag)
            .bind($created_at)
    }};
}

pub(crate) use bind_record;

// Internal row mapping to avoid manual try_get
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RecordRow {
    id: i64,
    session_id: Option<String>,
    phase: Option<String>,
    area: Option<String>,
    timestamp: Option<String>,
    conversation_speaker: Option<String>,
    conversation_text: Option<String>,
    hmd_position_x: Option<f64>,
    hmd_position_y: Option<f64>,
    hmd_position_z: Option<f64>,
    hmd_gaze_x: Option<f64>,
    hmd_gaze_y: Option<f64>,
    hmd_gaze_z: Option<f64>,
    hmd_gaze_actor: Option<String>,
    hmd_movement_speed: Option<f64>,
    controller_r_position_x: Option<f64>,
    controller_r_position_y: Option<f64>,
    controller_r_position_z: Option<f64>,
    controller_l_position_x: Option<f64>,
    controller_l_position_y: Option<f64>,
    controller_l_position_z: Option<f64>,
    controller_r_interacted_actor: Option<String>,
    controller_l_interacted_actor: Option<String>,
    controller_r_movement_speed: Option<f64>,
    controller_l_movement_speed: Option<f64>,
    user_emotion: Option<String>,
    emotion_window_flag: Option<bool>,
    created_at: String,
}

impl RecordRow {
    pub(crate) fn into_stored(self) -> StoredRecord {
        StoredRecord {
            id: self.id,
            record: SessionRecord {
                session_id: self.session_id,
                phase: self.phase,
                area: self.area,
                timestamp: self.timestamp,
                conversation_speaker: self.conversation_speaker,
                conversation_text: self.conversation_text,
                hmd_position_x: self.hmd_position_x,
                hmd_position_y: self.hmd_position_y,
                hmd_position_z: self.hmd_position_z,
                hmd_gaze_x: self.hmd_gaze_x,
                hmd_gaze_y: self.hmd_gaze_y,
                hmd_gaze_z: self.hmd_gaze_z,
                hmd_gaze_actor: self.hmd_gaze_actor,
                hmd_movement_speed: self.hmd_movement_speed,
                controller_r_position_x: self.controller_r_position_x,
                controller_r_position_y: self.controller_r_position_y,
                controller_r_position_z: self.controller_r_position_z,
                controller_l_position_x: self.controller_l_position_x,
                controller_l_position_y: self.controller_l_position_y,
                controller_l_position_z: self.controller_l_position_z,
                controller_r_interacted_actor: self.controller_r_interacted_actor,
                controller_l_interacted_actor: self.controller_l_interacted_actor,
                controller_r_movement_speed: self.controller_r_movement_speed,
                controller_l_movement_speed: self.controller_l_movement_speed,
                user_emotion: self.user_emotion,
                emotion_window_flag: self.emotion_window_flag,
            },
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SummaryRow {
    session_id: String,
    records: i64,
    first_created: String,
    last_created: String,
}

impl SummaryRow {
    pub(crate) fn into_summary(self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id,
            records: count(self.records),
            first_created: self.first_created,
            last_created: self.last_created,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn numbered(n: usize) -> String {
        format!("${}", n)
    }

    const TEST_DIALECT: Dialect = Dialect {
        id_column: "id BIGSERIAL PRIMARY KEY",
        float_type: "DOUBLE PRECISION",
        placeholder: numbered,
        bytewise: r#" COLLATE "C""#,
    };

    #[test]
    fn insert_statement_has_one_placeholder_per_column() {
        let sql = insert_statement(&TEST_DIALECT);
        assert!(sql.starts_with("INSERT INTO session_records (\"session_id\", \"phase\""));
        assert!(sql.ends_with("$26, $27)"));
        assert!(!sql.contains("$28"));
    }

    #[test]
    fn create_table_maps_column_kinds() {
        let ddl = create_table(&TEST_DIALECT);
        assert!(ddl.contains("id BIGSERIAL PRIMARY KEY"));
        assert!(ddl.contains("\"timestamp\" TEXT"));
        assert!(ddl.contains("\"hmd_gaze_x\" DOUBLE PRECISION"));
        assert!(ddl.contains("\"emotion_window_flag\" BOOLEAN"));
        assert!(ddl.contains("created_at TEXT NOT NULL"));
    }

    #[test]
    fn select_columns_wraps_record_columns() {
        let columns = select_columns();
        assert!(columns.starts_with("id, \"session_id\""));
        assert!(columns.ends_with("\"emotion_window_flag\", created_at"));
    }

    #[test]
    fn parameterized_queries_use_dialect_placeholders() {
        assert!(select_page(&TEST_DIALECT).ends_with("ORDER BY id ASC LIMIT $1 OFFSET $2"));
        assert!(select_by_session(&TEST_DIALECT).contains("WHERE session_id = $1"));
        assert!(count_created_since(&TEST_DIALECT).ends_with("created_at >= $1"));
        assert!(select_session_summaries(&TEST_DIALECT).ends_with("LIMIT $1 OFFSET $2"));
    }

    #[test]
    fn text_ordering_uses_dialect_collation() {
        let bounds = timestamp_bounds(&TEST_DIALECT);
        assert!(bounds.starts_with(r#"SELECT MIN("timestamp" COLLATE "C"), MAX("#));
        assert!(bounds.contains(r#"MAX("timestamp" COLLATE "C")"#));
        assert!(bounds.ends_with(r#"FROM session_records WHERE "timestamp" IS NOT NULL"#));
        assert!(select_session_summaries(&TEST_DIALECT)
            .contains(r#"ORDER BY MIN(created_at) COLLATE "C" DESC, session_id COLLATE "C" ASC"#));
    }

    #[test]
    fn created_at_is_fixed_width() {
        let early = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let later = early + chrono::Duration::milliseconds(1500);
        assert_eq!(format_created_at(early), "2025-01-02T03:04:05.000000Z");
        assert!(format_created_at(early) < format_created_at(later));
        assert_eq!(format_created_at(later).len(), format_created_at(early).len());
    }
}
