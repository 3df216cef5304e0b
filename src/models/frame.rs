use serde::{Deserialize, Serialize};

/// Commands mark the action being performed, both on inbound and outbound
/// frames. Wire values are short tags to keep frames small.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    #[serde(rename = "R_C_J")]
    RoomCreateJoin,
    #[serde(rename = "R_C_J_AU")]
    RoomCreateJoinAuthorize,
    #[serde(rename = "R_C")]
    RoomCreate,
    #[serde(rename = "R_J")]
    RoomJoin,
    #[serde(rename = "R_CH_D")]
    RoomChangeDescription,
    #[serde(rename = "R_CH_UN")]
    RoomChangeUserName,
    #[serde(rename = "R_M_CH")]
    RoomMembersChanged,

    #[serde(rename = "TM")]
    TextMessage,
    #[serde(rename = "TM_E")]
    TextMessageEdit,
    #[serde(rename = "TM_D")]
    TextMessageDelete,
    #[serde(rename = "TM_S_R")]
    TextMessageSupportOrReject,
    #[serde(rename = "ALL_TM")]
    AllTextMessages,

    #[serde(rename = "DM")]
    UserDrawingMessage,

    #[serde(rename = "ER")]
    Error,
    #[serde(rename = "RP")]
    RequestProcessed,

    #[serde(rename = "N_M_LIMIT_A")]
    NotifyMessagesLimitApproaching,
    #[serde(rename = "N_M_LIMIT_R")]
    NotifyMessagesLimitReached,
}

/// First frame sent by a client right after the upgrade.
#[derive(Debug, Default, Deserialize)]
pub struct InitFrame {
    #[serde(rename = "p", default)]
    pub platform: Option<String>,
}

/// Room credentials as they appear inside inbound frames.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RoomCreds {
    #[serde(rename = "n", default)]
    pub name: String,
    #[serde(rename = "p", default)]
    pub password: String,
}

/// Message payload of an inbound frame. Only the fields relevant to the
/// frame's command are populated by clients.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct InRoomMessage {
    #[serde(rename = "id", default)]
    pub id: i64,
    #[serde(rename = "t", default)]
    pub text: String,
    #[serde(rename = "rU", default)]
    pub reply_to_user_id: Option<String>,
    #[serde(rename = "rM", default)]
    pub reply_to_message_id: Option<i64>,
}

/// One inbound protocol frame (one JSON object per WebSocket message).
#[derive(Debug, Default, Deserialize)]
pub struct InMessageFrame {
    #[serde(rename = "c", default)]
    pub command: Option<Command>,
    #[serde(rename = "rq", default)]
    pub request_id: Option<String>,
    #[serde(rename = "m", default)]
    pub message: InRoomMessage,

    #[serde(rename = "r", default)]
    pub room: RoomCreds,
    #[serde(rename = "uN", default)]
    pub user_name: String,

    // for supporting/rejecting a message
    #[serde(rename = "srM", default)]
    pub support_or_reject: bool,
    // for keep-alive frames
    #[serde(rename = "kA", default)]
    pub keep_alive_beacon: String,
}

/// Message DTO for outbound frames. Every field is optional so that frames
/// carry only what their command actually changed.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RoomMessageDto {
    #[serde(rename = "id", skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "t", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "sC", skip_serializing_if = "Option::is_none")]
    pub supported_count: Option<i32>,
    #[serde(rename = "rC", skip_serializing_if = "Option::is_none")]
    pub rejected_count: Option<i32>,
    #[serde(rename = "lE", skip_serializing_if = "Option::is_none")]
    pub last_edited_at: Option<i64>,
    #[serde(rename = "lV", skip_serializing_if = "Option::is_none")]
    pub last_voted_at: Option<i64>,
    #[serde(rename = "rU", skip_serializing_if = "Option::is_none")]
    pub reply_to_user_id: Option<String>,
    #[serde(rename = "rM", skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<i64>,
    #[serde(rename = "uId", skip_serializing_if = "Option::is_none")]
    pub user_in_room_id: Option<String>,
    #[serde(rename = "cAt", skip_serializing_if = "Option::is_none")]
    pub created_at_sec: Option<i64>,
}

/// Room member entry for members-changed frames.
#[derive(Debug, Clone, Serialize)]
pub struct RoomUserDto {
    #[serde(rename = "uId")]
    pub user_in_room_id: String,
    #[serde(rename = "n")]
    pub user_name: String,
    #[serde(rename = "an")]
    pub is_anon_name: bool,
    #[serde(rename = "o")]
    pub is_online_in_room: bool,
}

/// One outbound protocol frame.
#[derive(Debug, Clone, Serialize)]
pub struct OutMessageFrame {
    #[serde(rename = "c")]
    pub command: Command,
    #[serde(rename = "rq", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(rename = "pd", skip_serializing_if = "Option::is_none")]
    pub processing_details: Option<String>,
    #[serde(rename = "m", skip_serializing_if = "Option::is_none")]
    pub message: Option<Vec<RoomMessageDto>>,

    // current room context
    #[serde(rename = "rId", skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(rename = "uId", skip_serializing_if = "Option::is_none")]
    pub user_in_room_id: Option<String>,
    #[serde(rename = "rCuId", skip_serializing_if = "Option::is_none")]
    pub room_creator_user_in_room_id: Option<String>,
    #[serde(rename = "cAt", skip_serializing_if = "Option::is_none")]
    pub created_at_nano: Option<i64>,

    // all-time users list
    #[serde(rename = "rU", skip_serializing_if = "Option::is_none")]
    pub all_room_users: Option<Vec<RoomUserDto>>,

    #[serde(rename = "bN", skip_serializing_if = "Option::is_none")]
    pub current_build_number: Option<String>,
    #[serde(rename = "sS", skip_serializing_if = "Option::is_none")]
    pub server_status: Option<String>,
}

impl OutMessageFrame {
    /// Empty frame for the given command; callers fill in relevant fields.
    pub fn new(command: Command) -> Self {
        OutMessageFrame {
            command,
            request_id: None,
            processing_details: None,
            message: None,
            room_id: None,
            user_in_room_id: None,
            room_creator_user_in_room_id: None,
            created_at_nano: None,
            all_room_users: None,
            current_build_number: None,
            server_status: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_frame_parses_with_missing_fields() {
        let frame: InMessageFrame = serde_json::from_str(r#"{"kA":"OK"}"#).unwrap();
        assert!(frame.command.is_none());
        assert_eq!(frame.keep_alive_beacon, "OK");
        assert_eq!(frame.message.id, 0);
    }

    #[test]
    fn inbound_command_frame_parses() {
        let frame: InMessageFrame = serde_json::from_str(
            r#"{"c":"TM","rq":"req-1","m":{"t":"hello"},"r":{"n":"lobby","p":""}}"#,
        )
        .unwrap();
        assert_eq!(frame.command, Some(Command::TextMessage));
        assert_eq!(frame.request_id.as_deref(), Some("req-1"));
        assert_eq!(frame.message.text, "hello");
        assert_eq!(frame.room.name, "lobby");
    }

    #[test]
    fn outbound_frame_omits_empty_fields() {
        let frame = OutMessageFrame::new(Command::RequestProcessed);
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"c":"RP"}"#);
    }

    #[test]
    fn outbound_message_dto_keeps_only_populated_fields() {
        let frame = OutMessageFrame {
            message: Some(vec![RoomMessageDto {
                id: Some(7),
                ..Default::default()
            }]),
            ..OutMessageFrame::new(Command::TextMessageDelete)
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"c":"TM_D","m":[{"id":7}]}"#);
    }
}
