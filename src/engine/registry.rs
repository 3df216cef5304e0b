use crate::engine::room::Room;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const ROOM_NAME_MIN: usize = 3;
pub const ROOM_NAME_MAX: usize = 100;
pub const ROOM_PASSWORD_MAX: usize = 100;

/// Non-alphanumeric characters acceptable in a room name.
const ROOM_NAME_SPECIAL_CHARS: &[char] = &[
    '!', '@', '$', '*', '(', ')', '_', '-', ',', '.', '~', '[', ']', ' ',
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomValidationError {
    NameBadLength,
    NameForbidden,
    NameBadChars,
    PasswordTooLong,
}

/// Check a room name/password pair before any lock is taken. The name is
/// expected to be already percent-decoded and lowercased.
pub fn validate_room_creds(
    name: &str,
    password: &str,
    forbidden_names: &[String],
) -> Result<(), RoomValidationError> {
    let len = name.chars().count();
    if !(ROOM_NAME_MIN..=ROOM_NAME_MAX).contains(&len) {
        return Err(RoomValidationError::NameBadLength);
    }
    if forbidden_names.iter().any(|f| f == name) {
        return Err(RoomValidationError::NameForbidden);
    }
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || ROOM_NAME_SPECIAL_CHARS.contains(&c))
    {
        return Err(RoomValidationError::NameBadChars);
    }
    if password.chars().count() > ROOM_PASSWORD_MAX {
        return Err(RoomValidationError::PasswordTooLong);
    }
    Ok(())
}

/// All live rooms, keyed by lowercased room name.
///
/// Lock ordering: when a room lock is also needed, take the registry lock
/// first and release it before awaiting on anything slow.
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, Arc<Room>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        RoomRegistry {
            rooms: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, name: &str) -> Option<Arc<Room>> {
        self.rooms.lock().await.get(name).cloned()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.rooms.lock().await.contains_key(name)
    }

    /// Insert unless the name is already occupied; returns the winner either
    /// way, plus whether the given room was the one inserted.
    pub async fn insert_if_vacant(&self, room: Arc<Room>) -> (Arc<Room>, bool) {
        let mut rooms = self.rooms.lock().await;
        match rooms.get(&room.name) {
            Some(existing) => (Arc::clone(existing), false),
            None => {
                rooms.insert(room.name.clone(), Arc::clone(&room));
                (room, true)
            }
        }
    }

    pub async fn remove(&self, name: &str) -> Option<Arc<Room>> {
        self.rooms.lock().await.remove(name)
    }

    pub async fn snapshot(&self) -> Vec<Arc<Room>> {
        self.rooms.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.rooms.lock().await.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_length_is_checked_in_chars() {
        assert_eq!(
            validate_room_creds("ab", "", &[]).unwrap_err(),
            RoomValidationError::NameBadLength
        );
        assert!(validate_room_creds("abc", "", &[]).is_ok());
        assert!(validate_room_creds(&"я".repeat(100), "", &[]).is_ok());
        assert_eq!(
            validate_room_creds(&"a".repeat(101), "", &[]).unwrap_err(),
            RoomValidationError::NameBadLength
        );
    }

    #[test]
    fn special_chars_are_limited() {
        assert!(validate_room_creds("dev room [2]!", "", &[]).is_ok());
        assert_eq!(
            validate_room_creds("room#1", "", &[]).unwrap_err(),
            RoomValidationError::NameBadChars
        );
        assert_eq!(
            validate_room_creds("room/1", "", &[]).unwrap_err(),
            RoomValidationError::NameBadChars
        );
    }

    #[test]
    fn forbidden_names_are_blocked() {
        let forbidden = vec!["admin".to_string()];
        assert_eq!(
            validate_room_creds("admin", "", &forbidden).unwrap_err(),
            RoomValidationError::NameForbidden
        );
        assert!(validate_room_creds("admin2", "", &forbidden).is_ok());
    }

    #[test]
    fn password_length_is_capped() {
        assert!(validate_room_creds("abc", &"p".repeat(100), &[]).is_ok());
        assert_eq!(
            validate_room_creds("abc", &"p".repeat(101), &[]).unwrap_err(),
            RoomValidationError::PasswordTooLong
        );
    }

    #[tokio::test]
    async fn insert_is_first_wins() {
        let registry = RoomRegistry::new();
        let a = Room::new("lobby".to_string(), None);
        let b = Room::new("lobby".to_string(), None);
        let (winner, inserted) = registry.insert_if_vacant(Arc::clone(&a)).await;
        assert!(inserted);
        assert!(Arc::ptr_eq(&winner, &a));
        let (winner, inserted) = registry.insert_if_vacant(b).await;
        assert!(!inserted);
        assert!(Arc::ptr_eq(&winner, &a));
        assert_eq!(registry.len().await, 1);
    }
}
