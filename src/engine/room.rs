use crate::engine::session::SocketSession;
use crate::engine::{
    now_secs, EXTERNAL_TECH_SESSION_ID, EXTERNAL_TECH_USER_NAME, MESSAGES_HARD_LIMIT,
};
use crate::models::error::WsError;
use crate::models::frame::{RoomMessageDto, RoomUserDto};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A chat room: immutable identity plus all mutable state behind one lock.
///
/// Code holding both the registry lock and a room lock must acquire the
/// registry first.
pub struct Room {
    /// Generated identity; goes on the wire, while the name keys the registry.
    pub id: String,
    pub name: String,
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub state: Mutex<RoomState>,
}

/// A user known to a room, keyed by browser session. Users stay authorized
/// after disconnecting so they can rejoin a password-protected room without
/// re-entering the password.
#[derive(Debug, Clone)]
pub struct RoomUser {
    pub session_id: String,
    pub user_in_room_id: String,
    pub user_name: String,
    pub is_anon_name: bool,
}

#[derive(Debug, Clone)]
pub struct RoomMessage {
    pub id: i64,
    pub text: String,
    pub user_in_room_id: String,
    pub created_at_sec: i64,
    pub last_edited_at: i64,
    pub last_voted_at: i64,
    pub reply_to_user_id: Option<String>,
    pub reply_to_message_id: Option<i64>,
    pub supported_by: HashSet<String>,
    pub rejected_by: HashSet<String>,
}

impl RoomMessage {
    pub fn to_dto(&self) -> RoomMessageDto {
        RoomMessageDto {
            id: Some(self.id),
            text: Some(self.text.clone()),
            supported_count: Some(self.supported_by.len() as i32),
            rejected_count: Some(self.rejected_by.len() as i32),
            last_edited_at: Some(self.last_edited_at),
            last_voted_at: Some(self.last_voted_at),
            reply_to_user_id: self.reply_to_user_id.clone(),
            reply_to_message_id: self.reply_to_message_id,
            user_in_room_id: Some(self.user_in_room_id.clone()),
            created_at_sec: Some(self.created_at_sec),
        }
    }
}

pub struct RoomState {
    pub is_deleted: bool,
    pub description: String,
    pub creator_user_in_room_id: String,
    /// Unix seconds; bumped by every command touching the room.
    pub last_active_at: i64,
    next_message_id: i64,
    /// By session id.
    pub authorized_users: HashMap<String, RoomUser>,
    /// By socket id; only live connections.
    pub active_sockets: HashMap<String, Arc<SocketSession>>,
    /// Ordered by message id, so iteration yields chronological order.
    pub messages: BTreeMap<i64, RoomMessage>,
}

impl Room {
    /// Build a room with its external technical user pre-registered. The
    /// creator is added by the join flow.
    pub fn new(name: String, password_hash: Option<String>) -> Arc<Room> {
        Self::new_at(name, password_hash, Utc::now())
    }

    pub(crate) fn new_at(
        name: String,
        password_hash: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Arc<Room> {
        let mut authorized_users = HashMap::new();
        authorized_users.insert(
            EXTERNAL_TECH_SESSION_ID.to_string(),
            RoomUser {
                session_id: EXTERNAL_TECH_SESSION_ID.to_string(),
                user_in_room_id: uuid::Uuid::new_v4().to_string(),
                user_name: EXTERNAL_TECH_USER_NAME.to_string(),
                is_anon_name: true,
            },
        );
        Arc::new(Room {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            password_hash,
            created_at,
            state: Mutex::new(RoomState {
                is_deleted: false,
                description: String::new(),
                creator_user_in_room_id: String::new(),
                last_active_at: now_secs(),
                next_message_id: 1,
                authorized_users,
                active_sockets: HashMap::new(),
                messages: BTreeMap::new(),
            }),
        })
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Detach a socket without touching its authorization. Used by the writer
    /// task and the housekeeper when a connection turns out to be dead.
    pub async fn remove_socket(&self, socket_id: &str) {
        let mut state = self.state.lock().await;
        state.active_sockets.remove(socket_id);
    }
}

impl RoomState {
    pub fn touch(&mut self) {
        self.last_active_at = now_secs();
    }

    /// Authorized users excluding the external technical one.
    pub fn member_count(&self) -> usize {
        self.authorized_users.len().saturating_sub(1)
    }

    /// Guards shared by every room-scoped command. Callers keep the room
    /// lock across the following mutation, so a concurrent deletion cannot
    /// slip in between check and write.
    pub fn command_user(&self, session: &SocketSession) -> Result<RoomUser, WsError> {
        if self.is_deleted {
            return Err(WsError::ROOM_NOT_FOUND);
        }
        let Some(user) = self.authorized_users.get(&session.session_id) else {
            return Err(WsError::NOT_AUTHORIZED);
        };
        if !self.active_sockets.contains_key(&session.socket_id) {
            return Err(WsError::CONNECTION_ERROR);
        }
        Ok(user.clone())
    }

    pub fn external_tech_user_id(&self) -> Option<String> {
        self.authorized_users
            .get(EXTERNAL_TECH_SESSION_ID)
            .map(|u| u.user_in_room_id.clone())
    }

    /// Append a message with the next id. Returns a full DTO of the stored
    /// message.
    pub fn add_message(
        &mut self,
        user_in_room_id: &str,
        text: String,
        reply_to_user_id: Option<String>,
        reply_to_message_id: Option<i64>,
    ) -> RoomMessageDto {
        let id = self.next_message_id;
        self.next_message_id += 1;
        let msg = RoomMessage {
            id,
            text,
            user_in_room_id: user_in_room_id.to_string(),
            created_at_sec: now_secs(),
            last_edited_at: 0,
            last_voted_at: 0,
            reply_to_user_id,
            reply_to_message_id,
            supported_by: HashSet::new(),
            rejected_by: HashSet::new(),
        };
        let dto = msg.to_dto();
        self.messages.insert(id, msg);
        dto
    }

    /// Drop the oldest half of the backlog once the hard limit is hit.
    /// Returns the lowest surviving message id when a shrink happened.
    pub fn shrink_if_over_limit(&mut self) -> Option<i64> {
        if self.messages.len() < MESSAGES_HARD_LIMIT {
            return None;
        }
        let keep = MESSAGES_HARD_LIMIT / 2;
        let cut_from = *self.messages.keys().rev().nth(keep - 1)?;
        self.messages = self.messages.split_off(&cut_from);
        Some(cut_from)
    }

    /// Rewrite a message's text and reply target. The broadcast DTO carries
    /// only the fields the edit touched.
    pub fn edit_message(
        &mut self,
        id: i64,
        user_in_room_id: &str,
        text: String,
        reply_to_user_id: Option<String>,
        reply_to_message_id: Option<i64>,
    ) -> EditOutcome {
        match self.messages.get_mut(&id) {
            None => EditOutcome::Missing,
            Some(msg) if msg.user_in_room_id != user_in_room_id => EditOutcome::NotAuthor,
            Some(msg) => {
                msg.text = text;
                msg.reply_to_user_id = reply_to_user_id;
                msg.reply_to_message_id = reply_to_message_id;
                msg.last_edited_at = now_secs();
                EditOutcome::Done(RoomMessageDto {
                    id: Some(msg.id),
                    text: Some(msg.text.clone()),
                    last_edited_at: Some(msg.last_edited_at),
                    reply_to_user_id: msg.reply_to_user_id.clone(),
                    reply_to_message_id: msg.reply_to_message_id,
                    ..Default::default()
                })
            }
        }
    }

    pub fn delete_message(&mut self, id: i64, user_in_room_id: &str) -> EditOutcome {
        match self.messages.get(&id) {
            None => EditOutcome::Missing,
            Some(msg) if msg.user_in_room_id != user_in_room_id => EditOutcome::NotAuthor,
            Some(_) => {
                self.messages.remove(&id);
                EditOutcome::Done(RoomMessageDto {
                    id: Some(id),
                    ..Default::default()
                })
            }
        }
    }

    /// Toggle a support or reject vote. Voting one way clears the opposite
    /// vote. Authors may not vote on their own messages unless they created
    /// the room.
    pub fn toggle_vote(&mut self, id: i64, voter_user_id: &str, support: bool) -> EditOutcome {
        let creator = self.creator_user_in_room_id.clone();
        match self.messages.get_mut(&id) {
            None => EditOutcome::Missing,
            Some(msg) => {
                if msg.user_in_room_id == voter_user_id && voter_user_id != creator {
                    return EditOutcome::NotAuthor;
                }
                let (target, opposite) = if support {
                    (&mut msg.supported_by, &mut msg.rejected_by)
                } else {
                    (&mut msg.rejected_by, &mut msg.supported_by)
                };
                if !target.remove(voter_user_id) {
                    target.insert(voter_user_id.to_string());
                }
                opposite.remove(voter_user_id);
                msg.last_voted_at = now_secs();
                EditOutcome::Done(RoomMessageDto {
                    id: Some(msg.id),
                    supported_count: Some(msg.supported_by.len() as i32),
                    rejected_count: Some(msg.rejected_by.len() as i32),
                    ..Default::default()
                })
            }
        }
    }

    /// Sessions with at least one live socket.
    pub fn online_session_ids(&self) -> HashSet<String> {
        self.active_sockets
            .values()
            .map(|s| s.session_id.clone())
            .collect()
    }

    pub fn find_socket_by_session(&self, session_id: &str) -> Option<Arc<SocketSession>> {
        self.active_sockets
            .values()
            .find(|s| s.session_id == session_id)
            .cloned()
    }

    pub fn socket_snapshot(&self) -> Vec<Arc<SocketSession>> {
        self.active_sockets.values().cloned().collect()
    }

    pub fn socket_id_set(&self) -> HashSet<String> {
        self.active_sockets.keys().cloned().collect()
    }

    /// All known users, online flag derived from live sockets, sorted by name
    /// for stable listings. The external technical user is not listed.
    pub fn user_dtos(&self) -> Vec<RoomUserDto> {
        let online = self.online_session_ids();
        let mut users: Vec<RoomUserDto> = self
            .authorized_users
            .values()
            .filter(|u| u.session_id != EXTERNAL_TECH_SESSION_ID)
            .map(|u| RoomUserDto {
                user_in_room_id: u.user_in_room_id.clone(),
                user_name: u.user_name.clone(),
                is_anon_name: u.is_anon_name,
                is_online_in_room: online.contains(&u.session_id),
            })
            .collect();
        users.sort_by(|a, b| a.user_name.cmp(&b.user_name));
        users
    }

    pub fn messages_sorted_dtos(&self) -> Vec<RoomMessageDto> {
        self.messages.values().map(RoomMessage::to_dto).collect()
    }

    pub fn user_name_for(&self, user_in_room_id: &str) -> Option<String> {
        self.authorized_users
            .values()
            .find(|u| u.user_in_room_id == user_in_room_id)
            .map(|u| u.user_name.clone())
    }

    pub fn online_count(&self) -> usize {
        self.online_session_ids().len()
    }
}

/// Outcome of a message mutation.
pub enum EditOutcome {
    Done(RoomMessageDto),
    Missing,
    NotAuthor,
}
