use serde::Serialize;

/// Room row in the admin listing.
#[derive(Debug, Clone, Serialize)]
pub struct RoomCtrlInfo {
    pub id: String,
    pub name: String,
    pub has_password: bool,
    pub users_total: usize,
    pub users_online: usize,
    pub messages: usize,
    pub created_at: String,
    pub last_active_at: String,
}

/// Admin listing payload.
#[derive(Debug, Serialize)]
pub struct RoomsCtrlResponse {
    pub rooms_count: usize,
    pub users_online: usize,
    pub rooms: Vec<RoomCtrlInfo>,
}

/// Result of an admin command.
#[derive(Debug, Serialize)]
pub struct CtrlCommandResponse {
    pub command: String,
    pub result: String,
}
