use serde::Serialize;

/// Stable protocol error sent back to clients inside the processing details
/// of an error frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WsError {
    pub code: u16,
    pub name: &'static str,
    pub text: &'static str,
}

impl WsError {
    pub const SERVER_ERROR: WsError = WsError {
        code: 101,
        name: "SERVER_ERROR",
        text: "server error",
    };
    pub const CONNECTION_ERROR: WsError = WsError {
        code: 102,
        name: "CONNECTION_ERROR",
        text: "connection error",
    };
    pub const INVALID_INPUT: WsError = WsError {
        code: 103,
        name: "INVALID_INPUT",
        text: "invalid client input",
    };

    pub const ROOM_EXISTS: WsError = WsError {
        code: 201,
        name: "ROOM_EXISTS",
        text: "room with this name already exists",
    };
    pub const ROOM_NOT_FOUND: WsError = WsError {
        code: 202,
        name: "ROOM_NOT_FOUND",
        text: "room not found",
    };
    pub const ROOM_WRONG_PASSWORD: WsError = WsError {
        code: 203,
        name: "ROOM_WRONG_PASSWORD",
        text: "wrong room password",
    };
    pub const USER_NAME_TAKEN: WsError = WsError {
        code: 204,
        name: "USER_NAME_TAKEN",
        text: "user name is already taken in this room",
    };
    pub const USER_NAME_BAD_LENGTH: WsError = WsError {
        code: 205,
        name: "USER_NAME_BAD_LENGTH",
        text: "user name must be between 1 and 80 characters",
    };
    pub const NOT_AUTHORIZED: WsError = WsError {
        code: 206,
        name: "NOT_AUTHORIZED",
        text: "not authorized for this action",
    };
    pub const MESSAGE_TOO_LARGE: WsError = WsError {
        code: 207,
        name: "MESSAGE_TOO_LARGE",
        text: "message is too large",
    };
    pub const ROOM_IS_FULL: WsError = WsError {
        code: 208,
        name: "ROOM_IS_FULL",
        text: "room is full",
    };
    pub const DUPLICATE_SESSION: WsError = WsError {
        code: 209,
        name: "DUPLICATE_SESSION",
        text: "another socket of this session joined the room",
    };

    pub const ROOM_NAME_BAD_LENGTH: WsError = WsError {
        code: 301,
        name: "ROOM_NAME_BAD_LENGTH",
        text: "room name must be between 3 and 100 characters",
    };
    pub const ROOM_NAME_FORBIDDEN: WsError = WsError {
        code: 302,
        name: "ROOM_NAME_FORBIDDEN",
        text: "this room name is not allowed",
    };
    pub const ROOM_NAME_BAD_CHARS: WsError = WsError {
        code: 303,
        name: "ROOM_NAME_BAD_CHARS",
        text: "room name contains forbidden characters",
    };
    pub const ROOM_DESCRIPTION_BAD_LENGTH: WsError = WsError {
        code: 304,
        name: "ROOM_DESCRIPTION_BAD_LENGTH",
        text: "room description is too long",
    };

    /// Rendering used inside processing details of error frames.
    pub fn details(&self) -> String {
        format!("{}:{}:{}", self.code, self.name, self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn details_carry_code_name_and_text() {
        let d = WsError::ROOM_NOT_FOUND.details();
        assert_eq!(d, "202:ROOM_NOT_FOUND:room not found");
    }
}
