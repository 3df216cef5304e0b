use crate::engine::room::RoomState;
use rand::seq::IndexedRandom;
use std::collections::HashSet;

pub const USER_NAME_MIN: usize = 1;
pub const USER_NAME_MAX: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameError {
    BadLength,
    Taken,
}

/// Pool the allocator draws from for users who join without a name.
static ANON_NAMES: &[&str] = &[
    "Amber Fox",
    "Azure Heron",
    "Bold Badger",
    "Brave Otter",
    "Bright Falcon",
    "Bronze Ibis",
    "Calm Lynx",
    "Candid Mole",
    "Clever Raven",
    "Cobalt Crane",
    "Coral Finch",
    "Crimson Hawk",
    "Curious Stoat",
    "Daring Swift",
    "Dusty Wren",
    "Eager Beaver",
    "Emerald Toad",
    "Fleet Gazelle",
    "Frosty Hare",
    "Gentle Bison",
    "Gilded Carp",
    "Glad Magpie",
    "Golden Tanuki",
    "Gray Wolf",
    "Hardy Marmot",
    "Hazel Doe",
    "Humble Shrew",
    "Icy Petrel",
    "Ivory Egret",
    "Jade Gecko",
    "Jolly Puffin",
    "Keen Osprey",
    "Kind Alpaca",
    "Lively Trout",
    "Lone Elk",
    "Lucky Cricket",
    "Mellow Koala",
    "Merry Lark",
    "Mighty Yak",
    "Misty Owl",
    "Nimble Ferret",
    "Noble Stag",
    "Olive Newt",
    "Opal Moth",
    "Pale Falconet",
    "Patient Heron",
    "Pearl Dove",
    "Plucky Robin",
    "Polite Panda",
    "Proud Eagle",
    "Quick Mink",
    "Quiet Tapir",
    "Rapid Swiftlet",
    "Rosy Starling",
    "Ruby Kite",
    "Rustic Boar",
    "Sable Marten",
    "Sage Tortoise",
    "Scarlet Macaw",
    "Shy Capybara",
    "Silent Moose",
    "Silver Seal",
    "Sleek Otter",
    "Sly Weasel",
    "Snowy Plover",
    "Solar Iguana",
    "Spry Squirrel",
    "Steady Donkey",
    "Stout Walrus",
    "Sunny Budgie",
    "Swift Cheetah",
    "Teal Mallard",
    "Tidy Hedgehog",
    "Tiny Hummingbird",
    "Topaz Skink",
    "Tranquil Swan",
    "Umber Bat",
    "Velvet Rabbit",
    "Vivid Parrot",
    "Wandering Tern",
    "Warm Quokka",
    "Wary Jackal",
    "Wild Mustang",
    "Wise Turtle",
    "Witty Jay",
    "Zesty Lemur",
];

pub fn validate_user_name(name: &str) -> Result<(), NameError> {
    let len = name.chars().count();
    if !(USER_NAME_MIN..=USER_NAME_MAX).contains(&len) {
        return Err(NameError::BadLength);
    }
    Ok(())
}

fn taken_names(state: &RoomState) -> HashSet<String> {
    state
        .authorized_users
        .values()
        .map(|u| u.user_name.to_lowercase())
        .collect()
}

/// Resolve the name for a joining user. A provided name must be valid and
/// free (case-insensitive); an empty name draws a random free anonymous name,
/// falling back to a uuid-derived one when the pool is exhausted. The bool in
/// the result marks an allocator-assigned name.
pub fn validate_or_pick_name(
    provided: &str,
    state: &RoomState,
) -> Result<(String, bool), NameError> {
    let provided = provided.trim();
    let taken = taken_names(state);
    if !provided.is_empty() {
        validate_user_name(provided)?;
        if taken.contains(&provided.to_lowercase()) {
            return Err(NameError::Taken);
        }
        return Ok((provided.to_string(), false));
    }
    let free: Vec<&&str> = ANON_NAMES
        .iter()
        .filter(|n| !taken.contains(&n.to_lowercase()))
        .collect();
    let picked = free
        .choose(&mut rand::rng())
        .map(|n| n.to_string())
        .unwrap_or_else(|| format!("user-{}", uuid::Uuid::new_v4()));
    Ok((picked, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::room::Room;

    #[tokio::test]
    async fn provided_name_is_kept() {
        let room = Room::new("lobby".to_string(), None);
        let state = room.state.lock().await;
        let (name, anon) = validate_or_pick_name("  Ada  ", &state).unwrap();
        assert_eq!(name, "Ada");
        assert!(!anon);
    }

    #[tokio::test]
    async fn taken_name_is_rejected_case_insensitively() {
        let room = Room::new("lobby".to_string(), None);
        let mut state = room.state.lock().await;
        state.authorized_users.insert(
            "s1".to_string(),
            crate::engine::room::RoomUser {
                session_id: "s1".to_string(),
                user_in_room_id: "u1".to_string(),
                user_name: "Ada".to_string(),
                is_anon_name: false,
            },
        );
        assert_eq!(
            validate_or_pick_name("ada", &state).unwrap_err(),
            NameError::Taken
        );
    }

    #[tokio::test]
    async fn empty_name_draws_from_pool() {
        let room = Room::new("lobby".to_string(), None);
        let state = room.state.lock().await;
        let (name, anon) = validate_or_pick_name("", &state).unwrap();
        assert!(anon);
        assert!(ANON_NAMES.contains(&name.as_str()));
    }

    #[test]
    fn length_bounds_are_enforced() {
        assert_eq!(validate_user_name("").unwrap_err(), NameError::BadLength);
        assert!(validate_user_name(&"x".repeat(80)).is_ok());
        assert_eq!(
            validate_user_name(&"x".repeat(81)).unwrap_err(),
            NameError::BadLength
        );
    }
}
