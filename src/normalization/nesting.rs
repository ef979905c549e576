use serde_json::{json, Value};

use crate::storage::types::SessionRecord;

/// Rebuilds the nested upload shape from a flat record.
///
/// Every known key is present; columns holding NULL come back as JSON `null`.
pub fn nest(record: &SessionRecord) -> Value {
    json!({
        "session_id": record.session_id,
        "phase": record.phase,
        "area": record.area,
        "timestamp": record.timestamp,
        "conversation_data": {
            "speaker": record.conversation_speaker,
            "text": record.conversation_text,
        },
        "hmd_data": {
            "position": {
                "x": record.hmd_position_x,
                "y": record.hmd_position_y,
                "z": record.hmd_position_z,
            },
            "gaze_vector": {
                "x": record.hmd_gaze_x,
                "y": record.hmd_gaze_y,
                "z": record.hmd_gaze_z,
            },
            "gaze_actor": record.hmd_gaze_actor,
            "movement_speed": record.hmd_movement_speed,
        },
        "controller_data": {
            "r_position": {
                "x": record.controller_r_position_x,
                "y": record.controller_r_position_y,
                "z": record.controller_r_position_z,
            },
            "l_position": {
                "x": record.controller_l_position_x,
                "y": record.controller_l_position_y,
                "z": record.controller_l_position_z,
            },
            "r_interacted_actor": record.controller_r_interacted_actor,
            "l_interacted_actor": record.controller_l_interacted_actor,
            "r_movement_speed": record.controller_r_movement_speed,
            "l_movement_speed": record.controller_l_movement_speed,
        },
        "user_emotion": record.user_emotion,
        "emotion_window_flag": record.emotion_window_flag,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalization::normalize;

    #[test]
    fn restores_a_complete_upload() {
        let upload = json!({
            "session_id": "s",
            "phase": "intro",
            "area": "lobby",
            "timestamp": "2025-06-01T10:00:00",
            "conversation_data": {"speaker": "user", "text": "hi"},
            "hmd_data": {
                "position": {"x": 1.5, "y": 2.0, "z": 0.5},
                "gaze_vector": {"x": 0.0, "y": 0.0, "z": 1.0},
                "gaze_actor": "door",
                "movement_speed": 0.5
            },
            "controller_data": {
                "r_position": {"x": 1.0, "y": 1.5, "z": 0.0},
                "l_position": {"x": -1.0, "y": 1.5, "z": 0.0},
                "r_interacted_actor": "button_1",
                "l_interacted_actor": "button_2",
                "r_movement_speed": 0.3,
                "l_movement_speed": 0.2
            },
            "user_emotion": "happy",
            "emotion_window_flag": true
        });
        assert_eq!(nest(&normalize(&upload).unwrap()), upload);
    }

    #[test]
    fn missing_leaves_come_back_null() {
        let sparse = json!({"session_id": "s", "hmd_data": {"gaze_actor": "door"}});
        let nested = nest(&normalize(&sparse).unwrap());
        assert_eq!(nested["session_id"], json!("s"));
        assert_eq!(nested["hmd_data"]["gaze_actor"], json!("door"));
        assert_eq!(nested["hmd_data"]["position"], json!({"x": null, "y": null, "z": null}));
        assert_eq!(nested["conversation_data"]["speaker"], Value::Null);
        assert_eq!(nested["emotion_window_flag"], Value::Null);
    }
}
