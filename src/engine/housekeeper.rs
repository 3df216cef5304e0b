use crate::engine::broadcast::write_members_changed;
use crate::engine::room::Room;
use crate::engine::session::SocketSession;
use crate::engine::{
    now_secs, EMPTY_ROOM_TTL, HOUSEKEEPER_INTERVAL, INACTIVE_ROOM_TTL, WRITE_TIMEOUT,
};
use crate::state::SharedState;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

/// Per-room background task. Pings attached sockets, prunes the dead ones
/// and eventually retires the room itself. Started when the room is created,
/// ends when the room is deleted or the server shuts down.
pub fn start_housekeeper(room: Arc<Room>, state: SharedState) {
    tokio::spawn(async move {
        debug!(room = %room.name, "housekeeper started");
        loop {
            tokio::time::sleep(HOUSEKEEPER_INTERVAL).await;
            if state.housekeepers_stopped() {
                return;
            }
            if run_tick(&room, &state).await {
                info!(room = %room.name, "room retired");
                return;
            }
        }
    });
}

/// One housekeeping pass. Returns true once the room is gone.
async fn run_tick(room: &Arc<Room>, state: &SharedState) -> bool {
    let (deleted, sockets, last_active) = {
        let room_state = room.state.lock().await;
        (
            room_state.is_deleted,
            room_state.socket_snapshot(),
            room_state.last_active_at,
        )
    };
    if deleted {
        return true;
    }

    let idle = now_secs().saturating_sub(last_active);
    let age = now_secs().saturating_sub(room.created_at.timestamp());
    if sockets.is_empty() {
        // An empty room survives until it is both old enough and inactive
        // long enough; authorizations and history are kept in the meantime.
        if age > EMPTY_ROOM_TTL.as_secs() as i64
            && idle > INACTIVE_ROOM_TTL.as_secs() as i64
        {
            return try_delete_room(room, state).await;
        }
        return false;
    }

    let dead_ids = probe_sockets(&sockets).await;
    if dead_ids.len() == sockets.len() && idle > INACTIVE_ROOM_TTL.as_secs() as i64 {
        for socket in &sockets {
            socket.terminate().await;
        }
        return try_delete_room(room, state).await;
    }
    prune_sockets(room, dead_ids).await;
    false
}

/// Ping every socket concurrently; collect the ids of the ones that are
/// already dead or fail the ping.
async fn probe_sockets(sockets: &[Arc<SocketSession>]) -> Vec<String> {
    let probes = sockets.iter().map(|socket| async move {
        if socket.is_dead() {
            return Some(socket.socket_id.clone());
        }
        match timeout(WRITE_TIMEOUT, socket.transport.send_ping()).await {
            Ok(Ok(())) => None,
            _ => {
                socket.terminate().await;
                Some(socket.socket_id.clone())
            }
        }
    });
    join_all(probes).await.into_iter().flatten().collect()
}

/// Drop dead sockets from the active set. Authorization is untouched, cut
/// sessions can rejoin without a password.
async fn prune_sockets(room: &Arc<Room>, dead_ids: Vec<String>) {
    if dead_ids.is_empty() {
        return;
    }
    let mut room_state = room.state.lock().await;
    let mut changed = false;
    for id in &dead_ids {
        changed |= room_state.active_sockets.remove(id).is_some();
    }
    if changed {
        debug!(room = %room.name, pruned = dead_ids.len(), "pruned dead sockets");
        write_members_changed(&room_state, None);
    }
}

/// Optimistic room deletion: snapshot the socket set, give in-flight joins a
/// moment, then delete only if the set is unchanged. The registry lock and
/// the room lock are never held together.
async fn try_delete_room(room: &Arc<Room>, state: &SharedState) -> bool {
    let before = { room.state.lock().await.socket_id_set() };
    tokio::time::sleep(Duration::from_millis(50)).await;
    {
        let mut room_state = room.state.lock().await;
        if room_state.is_deleted {
            return true;
        }
        if room_state.socket_id_set() != before {
            return false;
        }
        room_state.is_deleted = true;
    }
    state.registry.remove(&room.name).await;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::transport::testing::RecordingTransport;
    use crate::state::AppState;

    fn test_state() -> SharedState {
        AppState::new(Config::default())
    }

    #[tokio::test]
    async fn idle_empty_room_is_retired() {
        let state = test_state();
        let stale = chrono::Utc::now() - chrono::Duration::seconds(EMPTY_ROOM_TTL.as_secs() as i64 + 10);
        let room = Room::new_at("lobby".to_string(), None, stale);
        let (room, inserted) = state.registry.insert_if_vacant(room).await;
        assert!(inserted);
        {
            let mut room_state = room.state.lock().await;
            room_state.last_active_at = now_secs() - INACTIVE_ROOM_TTL.as_secs() as i64 - 1;
        }
        assert!(run_tick(&room, &state).await);
        assert!(room.state.lock().await.is_deleted);
        assert!(state.registry.get("lobby").await.is_none());
    }

    #[tokio::test]
    async fn empty_room_within_inactivity_ttl_survives() {
        let state = test_state();
        let stale = chrono::Utc::now() - chrono::Duration::seconds(EMPTY_ROOM_TTL.as_secs() as i64 + 10);
        let room = Room::new_at("lobby".to_string(), None, stale);
        let (room, _) = state.registry.insert_if_vacant(room).await;
        {
            // empty past its empty TTL, but active within the last hour
            let mut room_state = room.state.lock().await;
            room_state.last_active_at = now_secs() - 3600;
        }
        assert!(!run_tick(&room, &state).await);
        assert!(state.registry.get("lobby").await.is_some());
    }

    #[tokio::test]
    async fn fresh_empty_room_survives() {
        let state = test_state();
        let room = Room::new("lobby".to_string(), None);
        let (room, _) = state.registry.insert_if_vacant(room).await;
        assert!(!run_tick(&room, &state).await);
        assert!(state.registry.get("lobby").await.is_some());
    }

    #[tokio::test]
    async fn concurrent_join_aborts_deletion() {
        let state = test_state();
        let room = Room::new("lobby".to_string(), None);
        let (room, _) = state.registry.insert_if_vacant(room).await;
        // a socket lands between the snapshot and the re-check
        let racer = {
            let room = Arc::clone(&room);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                let transport = Arc::new(RecordingTransport::default());
                let session = SocketSession::new("s1".to_string(), transport);
                room.state
                    .lock()
                    .await
                    .active_sockets
                    .insert(session.socket_id.clone(), session);
            })
        };
        let deleted = try_delete_room(&room, &state).await;
        racer.await.unwrap();
        assert!(!deleted);
        assert!(!room.state.lock().await.is_deleted);
        assert!(state.registry.get("lobby").await.is_some());
    }

    #[tokio::test]
    async fn dead_sockets_are_pruned_but_stay_authorized() {
        let state = test_state();
        let room = Room::new("lobby".to_string(), None);
        let (room, _) = state.registry.insert_if_vacant(room).await;

        let live_transport = Arc::new(RecordingTransport::default());
        let live = SocketSession::new("s-live".to_string(), live_transport.clone());
        let broken_transport = Arc::new(RecordingTransport::default());
        broken_transport
            .fail_sends
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let broken = SocketSession::new("s-broken".to_string(), broken_transport);
        {
            let mut room_state = room.state.lock().await;
            room_state
                .active_sockets
                .insert(live.socket_id.clone(), Arc::clone(&live));
            room_state
                .active_sockets
                .insert(broken.socket_id.clone(), Arc::clone(&broken));
            room_state.authorized_users.insert(
                "s-broken".to_string(),
                crate::engine::room::RoomUser {
                    session_id: "s-broken".to_string(),
                    user_in_room_id: "u-broken".to_string(),
                    user_name: "Ada".to_string(),
                    is_anon_name: false,
                },
            );
        }

        assert!(!run_tick(&room, &state).await);
        let room_state = room.state.lock().await;
        assert!(room_state.active_sockets.contains_key(&live.socket_id));
        assert!(!room_state.active_sockets.contains_key(&broken.socket_id));
        assert!(room_state.authorized_users.contains_key("s-broken"));
        assert!(broken.is_dead());
        assert_eq!(
            live_transport.pings.load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }
}
