use serde_json::{Map, Value};

use crate::error_handling::types::NormalizeError;
use crate::storage::types::SessionRecord;

type Object = Map<String, Value>;

/// Flattens one uploaded entry into a `SessionRecord`.
///
/// Unknown keys are ignored and every missing or wrongly typed leaf becomes `None`. The only
/// failure is an entry that is not a JSON object.
pub fn normalize(value: &Value) -> Result<SessionRecord, NormalizeError> {
    normalize_at(0, value)
}

/// Normalizes a whole batch, stopping at the first entry that is not an object.
pub fn normalize_batch(values: &[Value]) -> Result<Vec<SessionRecord>, NormalizeError> {
    values
        .iter()
        .enumerate()
        .map(|(index, value)| normalize_at(index, value))
        .collect()
}

fn normalize_at(index: usize, value: &Value) -> Result<SessionRecord, NormalizeError> {
    let root = value.as_object().ok_or(NormalizeError::MalformedRecord {
        index,
        found: json_kind(value),
    })?;
    let root = Some(root);

    let conversation = child(root, "conversation_data");
    let hmd = child(root, "hmd_data");
    let hmd_position = child(hmd, "position");
    let hmd_gaze = child(hmd, "gaze_vector");
    let controller = child(root, "controller_data");
    let r_position = child(controller, "r_position");
    let l_position = child(controller, "l_position");

    Ok(SessionRecord {
        session_id: text(root, "session_id"),
        phase: text(root, "phase"),
        area: text(root, "area"),
        timestamp: text(root, "timestamp"),
        conversation_speaker: text(conversation, "speaker"),
        conversation_text: text(conversation, "text"),
        hmd_position_x: number(hmd_position, "x"),
        hmd_position_y: number(hmd_position, "y"),
        hmd_position_z: number(hmd_position, "z"),
        hmd_gaze_x: number(hmd_gaze, "x"),
        hmd_gaze_y: number(hmd_gaze, "y"),
        hmd_gaze_z: number(hmd_gaze, "z"),
        hmd_gaze_actor: text(hmd, "gaze_actor"),
        hmd_movement_speed: number(hmd, "movement_speed"),
        controller_r_position_x: number(r_position, "x"),
        controller_r_position_y: number(r_position, "y"),
        controller_r_position_z: number(r_position, "z"),
        controller_l_position_x: number(l_position, "x"),
        controller_l_position_y: number(l_position, "y"),
        controller_l_position_z: number(l_position, "z"),
        controller_r_interacted_actor: text(controller, "r_interacted_actor"),
        controller_l_interacted_actor: text(controller, "l_interacted_actor"),
        controller_r_movement_speed: number(controller, "r_movement_speed"),
        controller_l_movement_speed: number(controller, "l_movement_speed"),
        user_emotion: text(root, "user_emotion"),
        emotion_window_flag: flag(root, "emotion_window_flag"),
    })
}

// A nested container that is missing or not an object counts as absent.
fn child<'a>(parent: Option<&'a Object>, key: &str) -> Option<&'a Object> {
    parent?.get(key)?.as_object()
}

fn text(parent: Option<&Object>, key: &str) -> Option<String> {
    parent?.get(key)?.as_str().map(str::to_owned)
}

fn number(parent: Option<&Object>, key: &str) -> Option<f64> {
    parent?.get(key)?.as_f64()
}

fn flag(parent: Option<&Object>, key: &str) -> Option<bool> {
    parent?.get(key)?.as_bool()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
