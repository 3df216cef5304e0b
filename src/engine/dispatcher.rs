use crate::engine::broadcast::{
    write_after_join_frames, write_description_changed, write_error, write_error_forced,
    write_members_changed, write_message_frame, write_notification, write_request_processed,
    write_room_authorized,
};
use crate::engine::names::{validate_or_pick_name, NameError};
use crate::engine::password::{hash_password, verify_password};
use crate::engine::registry::{validate_room_creds, RoomValidationError};
use crate::engine::room::{EditOutcome, Room, RoomUser};
use crate::engine::session::SocketSession;
use crate::engine::transport::WsTransport;
use crate::engine::{
    READ_TIMEOUT, ROOM_CAPACITY, MAX_DESCRIPTION_LEN, MAX_MESSAGE_LEN,
    MESSAGES_APPROACH_BREAKPOINTS,
};
use crate::models::error::WsError;
use crate::models::frame::{Command, InMessageFrame, InitFrame};
use crate::state::{ServerStatus, SharedState};
use axum::extract::ws::{Message, WebSocket};
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Drive one WebSocket connection: read the init frame, start the writer
/// task, then loop over inbound command frames until the peer goes away.
pub async fn run_session(socket: WebSocket, session_id: String, state: SharedState) {
    let (sink, mut receiver) = socket.split();
    let transport = Arc::new(WsTransport::new(sink));
    let session = SocketSession::new(session_id, transport);

    // The first frame only announces the client platform.
    match timeout(READ_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => {
            let init: InitFrame = serde_json::from_str(&text).unwrap_or_default();
            info!(
                socket_id = %session.socket_id,
                platform = init.platform.as_deref().unwrap_or("unknown"),
                "socket connected"
            );
        }
        _ => {
            session.terminate().await;
            return;
        }
    }

    let writer = session.spawn_writer();

    loop {
        let next = match timeout(READ_TIMEOUT, receiver.next()).await {
            Ok(next) => next,
            Err(_) => {
                debug!(socket_id = %session.socket_id, "read timeout, dropping socket");
                break;
            }
        };
        match next {
            Some(Ok(Message::Text(text))) => {
                let frame: InMessageFrame = match serde_json::from_str(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        debug!(socket_id = %session.socket_id, "unparseable frame: {e}");
                        write_error(&session, WsError::INVALID_INPUT, None);
                        break;
                    }
                };
                session.touch_keep_alive();
                if frame.keep_alive_beacon == "OK" {
                    continue;
                }
                dispatch(&state, &session, frame).await;
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                if frame_too_large(&e) {
                    write_error_forced(&session, WsError::MESSAGE_TOO_LARGE).await;
                } else {
                    debug!(socket_id = %session.socket_id, "read failed: {e}");
                    write_error_forced(&session, WsError::CONNECTION_ERROR).await;
                }
                break;
            }
        }
    }

    session.terminate().await;
    detach_from_room(&session).await;
    let _ = writer.await;
    debug!(socket_id = %session.socket_id, "socket finished");
}

/// An oversized inbound frame surfaces as a capacity error of the websocket
/// stream, wrapped by the axum error.
fn frame_too_large(e: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(e);
    while let Some(err) = source {
        if matches!(
            err.downcast_ref::<tokio_tungstenite::tungstenite::Error>(),
            Some(tokio_tungstenite::tungstenite::Error::Capacity(_))
        ) {
            return true;
        }
        source = err.source();
    }
    false
}

/// Drop the socket from its room and tell the remaining members.
async fn detach_from_room(session: &SocketSession) {
    if let Some(room) = session.related_room() {
        let mut room_state = room.state.lock().await;
        if room_state.active_sockets.remove(&session.socket_id).is_some() {
            room_state.touch();
            write_members_changed(&room_state, None);
        }
    }
}

async fn dispatch(state: &SharedState, session: &Arc<SocketSession>, frame: InMessageFrame) {
    let Some(command) = frame.command else {
        write_error(session, WsError::INVALID_INPUT, frame.request_id);
        return;
    };
    match command {
        Command::RoomCreateJoin
        | Command::RoomCreateJoinAuthorize
        | Command::RoomCreate
        | Command::RoomJoin => handle_room_entry(state, session, command, frame).await,
        Command::RoomChangeUserName => handle_change_user_name(session, frame).await,
        Command::RoomChangeDescription => handle_change_description(state, session, frame).await,
        Command::TextMessage | Command::UserDrawingMessage => {
            handle_text_message(session, command, frame).await
        }
        Command::TextMessageEdit => handle_edit_message(session, frame).await,
        Command::TextMessageDelete => handle_delete_message(session, frame).await,
        Command::TextMessageSupportOrReject => handle_support_or_reject(session, frame).await,
        _ => {
            // server-to-client commands are not accepted inbound
            write_error(session, WsError::INVALID_INPUT, frame.request_id);
        }
    }
}

fn room_entry_error(e: RoomValidationError) -> WsError {
    match e {
        RoomValidationError::NameBadLength => WsError::ROOM_NAME_BAD_LENGTH,
        RoomValidationError::NameForbidden => WsError::ROOM_NAME_FORBIDDEN,
        RoomValidationError::NameBadChars => WsError::ROOM_NAME_BAD_CHARS,
        RoomValidationError::PasswordTooLong => WsError::INVALID_INPUT,
    }
}

/// Normalize a client-supplied room name: percent-decoded, trimmed,
/// lowercased.
pub fn normalize_room_name(raw: &str) -> String {
    let decoded = urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| raw.to_string());
    decoded.trim().to_lowercase()
}

async fn handle_room_entry(
    state: &SharedState,
    session: &Arc<SocketSession>,
    command: Command,
    frame: InMessageFrame,
) {
    let name = normalize_room_name(&frame.room.name);
    let password = frame.room.password.clone();
    if let Err(e) = validate_room_creds(&name, &password, &state.config.forbidden_room_names()) {
        write_error(session, room_entry_error(e), frame.request_id);
        return;
    }

    let existing = state.registry.get(&name).await;
    let (room, created) = match (command, existing) {
        (Command::RoomCreate, Some(_)) => {
            write_error(session, WsError::ROOM_EXISTS, frame.request_id);
            return;
        }
        (Command::RoomJoin, None) => {
            write_error(session, WsError::ROOM_NOT_FOUND, frame.request_id);
            return;
        }
        (_, Some(room)) => (room, false),
        (_, None) => {
            // Hash outside all locks, then let the registry arbitrate the
            // race: losing the insert turns this into a plain join.
            let hash = hash_password(&password);
            let fresh = Room::new(name.clone(), hash);
            let (winner, inserted) = state.registry.insert_if_vacant(fresh).await;
            if inserted {
                crate::engine::housekeeper::start_housekeeper(
                    Arc::clone(&winner),
                    Arc::clone(state),
                );
            }
            (winner, inserted)
        }
    };

    log_into_room(state, session, &room, created, command, frame).await;
}

/// Admit a session into a room: password gate, capacity gate, user identity,
/// duplicate-socket eviction, then the full join frame sequence.
async fn log_into_room(
    state: &SharedState,
    session: &Arc<SocketSession>,
    room: &Arc<Room>,
    created: bool,
    command: Command,
    frame: InMessageFrame,
) {
    // Password verification is slow, keep it outside the room lock. Whether
    // it even applies depends on authorization state checked below.
    let password_ok = match &room.password_hash {
        Some(hash) => verify_password(&frame.room.password, hash),
        None => true,
    };
    let authorize_only = command == Command::RoomCreateJoinAuthorize;

    let mut room_state = room.state.lock().await;
    if room_state.is_deleted {
        write_error(session, WsError::ROOM_NOT_FOUND, frame.request_id);
        return;
    }
    room_state.touch();

    // The cap is on live participants, not on everyone ever authorized.
    if room_state.online_count() >= ROOM_CAPACITY {
        write_error(session, WsError::ROOM_IS_FULL, frame.request_id);
        return;
    }

    let known_user = room_state.authorized_users.get(&session.session_id).cloned();
    // A returning session skips the password unless it volunteers one, in
    // which case a wrong guess is still a wrong guess.
    let must_check = known_user.is_none() || !frame.room.password.is_empty();
    if room.has_password() && must_check && !password_ok {
        write_error(session, WsError::ROOM_WRONG_PASSWORD, frame.request_id);
        return;
    }

    let user = match known_user {
        Some(mut user) => {
            let wanted = frame.user_name.trim();
            if !wanted.is_empty() && wanted != user.user_name {
                match validate_or_pick_name(&frame.user_name, &room_state) {
                    Ok((user_name, is_anon_name)) => {
                        user.user_name = user_name;
                        user.is_anon_name = is_anon_name;
                        room_state
                            .authorized_users
                            .insert(session.session_id.clone(), user.clone());
                    }
                    Err(NameError::Taken) => {
                        write_error(session, WsError::USER_NAME_TAKEN, frame.request_id);
                        return;
                    }
                    Err(NameError::BadLength) => {
                        write_error(session, WsError::USER_NAME_BAD_LENGTH, frame.request_id);
                        return;
                    }
                }
            }
            user
        }
        None => {
            let (user_name, is_anon_name) =
                match validate_or_pick_name(&frame.user_name, &room_state) {
                    Ok(picked) => picked,
                    Err(NameError::Taken) => {
                        write_error(session, WsError::USER_NAME_TAKEN, frame.request_id);
                        return;
                    }
                    Err(NameError::BadLength) => {
                        write_error(session, WsError::USER_NAME_BAD_LENGTH, frame.request_id);
                        return;
                    }
                };
            let user = RoomUser {
                session_id: session.session_id.clone(),
                user_in_room_id: uuid::Uuid::new_v4().to_string(),
                user_name,
                is_anon_name,
            };
            room_state
                .authorized_users
                .insert(session.session_id.clone(), user.clone());
            user
        }
    };

    if created && room_state.creator_user_in_room_id.is_empty() {
        room_state.creator_user_in_room_id = user.user_in_room_id.clone();
    }

    if authorize_only {
        write_room_authorized(
            session,
            room,
            &user.user_in_room_id,
            frame.request_id,
            format!("authorized;password={}", room.has_password()),
        );
        return;
    }

    // One live socket per session and room: the older one gets told why it
    // is being dropped, then evicted.
    if let Some(old) = room_state.find_socket_by_session(&session.session_id) {
        if old.socket_id != session.socket_id {
            warn!(socket_id = %old.socket_id, room = %room.name, "evicting duplicate session socket");
            write_error_forced(&old, WsError::DUPLICATE_SESSION).await;
            old.terminate().await;
            room_state.active_sockets.remove(&old.socket_id);
        }
    }

    room_state
        .active_sockets
        .insert(session.socket_id.clone(), Arc::clone(session));
    session.set_related_room(room);

    let details = format!(
        "{};password={}",
        if created { "room_created" } else { "room_joined" },
        room.has_password()
    );
    let status = state.server_status();
    write_after_join_frames(
        room,
        &room_state,
        session,
        &user.user_in_room_id,
        frame.request_id,
        details,
        status.as_str(),
        &state.config.build_number,
    );
    info!(room = %room.name, user = %user.user_name, created, "user joined room");
}

/// The related room, or an error frame already written. Guards that depend
/// on room state run via [`RoomState::command_user`] under the caller's lock
/// hold, so nothing can be deleted or deauthorized in between.
fn related_room(session: &Arc<SocketSession>, request_id: &Option<String>) -> Option<Arc<Room>> {
    let Some(room) = session.related_room() else {
        write_error(session, WsError::ROOM_NOT_FOUND, request_id.clone());
        return None;
    };
    Some(room)
}

async fn handle_change_user_name(session: &Arc<SocketSession>, frame: InMessageFrame) {
    let Some(room) = related_room(session, &frame.request_id) else {
        return;
    };
    let mut room_state = room.state.lock().await;
    room_state.touch();
    let user = match room_state.command_user(session) {
        Ok(user) => user,
        Err(e) => {
            write_error(session, e, frame.request_id);
            return;
        }
    };
    let (new_name, is_anon_name) = match validate_or_pick_name(&frame.user_name, &room_state) {
        Ok(picked) => picked,
        Err(NameError::Taken) => {
            write_error(session, WsError::USER_NAME_TAKEN, frame.request_id);
            return;
        }
        Err(NameError::BadLength) => {
            write_error(session, WsError::USER_NAME_BAD_LENGTH, frame.request_id);
            return;
        }
    };
    if let Some(stored) = room_state.authorized_users.get_mut(&session.session_id) {
        stored.user_name = new_name.clone();
        stored.is_anon_name = is_anon_name;
    }
    debug!(room = %room.name, old = %user.user_name, new = %new_name, "user renamed");
    write_request_processed(session, frame.request_id, None);
    write_members_changed(&room_state, None);
}

async fn handle_change_description(
    state: &SharedState,
    session: &Arc<SocketSession>,
    frame: InMessageFrame,
) {
    let Some(room) = related_room(session, &frame.request_id) else {
        return;
    };
    let description = frame.message.text;
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        write_error(session, WsError::ROOM_DESCRIPTION_BAD_LENGTH, frame.request_id);
        return;
    }
    let mut room_state = room.state.lock().await;
    room_state.touch();
    let user = match room_state.command_user(session) {
        Ok(user) => user,
        Err(e) => {
            write_error(session, e, frame.request_id);
            return;
        }
    };
    if user.user_in_room_id != room_state.creator_user_in_room_id {
        write_error(session, WsError::NOT_AUTHORIZED, frame.request_id);
        return;
    }
    room_state.description = description;
    write_request_processed(session, frame.request_id, None);
    write_description_changed(
        &room_state,
        state.server_status().as_str(),
        &state.config.build_number,
    );
}

async fn handle_text_message(session: &Arc<SocketSession>, command: Command, frame: InMessageFrame) {
    let Some(room) = related_room(session, &frame.request_id) else {
        return;
    };
    let text = frame.message.text;
    if text.trim().is_empty() {
        write_error(session, WsError::INVALID_INPUT, frame.request_id);
        return;
    }
    if text.chars().count() > MAX_MESSAGE_LEN {
        write_error(session, WsError::MESSAGE_TOO_LARGE, frame.request_id);
        return;
    }
    let mut room_state = room.state.lock().await;
    room_state.touch();
    let user = match room_state.command_user(session) {
        Ok(user) => user,
        Err(e) => {
            write_error(session, e, frame.request_id);
            return;
        }
    };
    let dto = room_state.add_message(
        &user.user_in_room_id,
        text,
        frame.message.reply_to_user_id,
        frame.message.reply_to_message_id,
    );
    write_message_frame(&room_state, command, dto);

    let backlog = room_state.messages.len();
    if MESSAGES_APPROACH_BREAKPOINTS.contains(&backlog) {
        write_notification(
            &room_state,
            Command::NotifyMessagesLimitApproaching,
            backlog.to_string(),
        );
    }
    if let Some(lowest_kept) = room_state.shrink_if_over_limit() {
        write_notification(
            &room_state,
            Command::NotifyMessagesLimitReached,
            lowest_kept.to_string(),
        );
    }
    write_request_processed(session, frame.request_id, None);
}

async fn handle_edit_message(session: &Arc<SocketSession>, frame: InMessageFrame) {
    let Some(room) = related_room(session, &frame.request_id) else {
        return;
    };
    let text = frame.message.text;
    if text.chars().count() > MAX_MESSAGE_LEN {
        write_error(session, WsError::MESSAGE_TOO_LARGE, frame.request_id);
        return;
    }
    let mut room_state = room.state.lock().await;
    room_state.touch();
    let user = match room_state.command_user(session) {
        Ok(user) => user,
        Err(e) => {
            write_error(session, e, frame.request_id);
            return;
        }
    };
    match room_state.edit_message(
        frame.message.id,
        &user.user_in_room_id,
        text,
        frame.message.reply_to_user_id,
        frame.message.reply_to_message_id,
    ) {
        EditOutcome::Done(dto) => {
            write_message_frame(&room_state, Command::TextMessageEdit, dto);
            write_request_processed(session, frame.request_id, None);
        }
        // already gone, nothing to sync
        EditOutcome::Missing => write_request_processed(session, frame.request_id, None),
        EditOutcome::NotAuthor => write_error(session, WsError::INVALID_INPUT, frame.request_id),
    }
}

async fn handle_delete_message(session: &Arc<SocketSession>, frame: InMessageFrame) {
    let Some(room) = related_room(session, &frame.request_id) else {
        return;
    };
    let mut room_state = room.state.lock().await;
    room_state.touch();
    let user = match room_state.command_user(session) {
        Ok(user) => user,
        Err(e) => {
            write_error(session, e, frame.request_id);
            return;
        }
    };
    match room_state.delete_message(frame.message.id, &user.user_in_room_id) {
        EditOutcome::Done(dto) => {
            write_message_frame(&room_state, Command::TextMessageDelete, dto);
            write_request_processed(session, frame.request_id, None);
        }
        EditOutcome::Missing => write_request_processed(session, frame.request_id, None),
        EditOutcome::NotAuthor => write_error(session, WsError::INVALID_INPUT, frame.request_id),
    }
}

async fn handle_support_or_reject(session: &Arc<SocketSession>, frame: InMessageFrame) {
    let Some(room) = related_room(session, &frame.request_id) else {
        return;
    };
    let mut room_state = room.state.lock().await;
    room_state.touch();
    let user = match room_state.command_user(session) {
        Ok(user) => user,
        Err(e) => {
            write_error(session, e, frame.request_id);
            return;
        }
    };
    match room_state.toggle_vote(frame.message.id, &user.user_in_room_id, frame.support_or_reject) {
        EditOutcome::Done(dto) => {
            write_message_frame(&room_state, Command::TextMessageSupportOrReject, dto);
            write_request_processed(session, frame.request_id, None);
        }
        EditOutcome::Missing => write_request_processed(session, frame.request_id, None),
        // a silent ack, voting on your own message just does nothing
        EditOutcome::NotAuthor => write_request_processed(session, frame.request_id, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::transport::testing::RecordingTransport;
    use crate::models::frame::{InRoomMessage, RoomCreds};
    use crate::state::AppState;

    fn app() -> SharedState {
        AppState::new(Config::default())
    }

    fn socket(session_id: &str) -> (Arc<SocketSession>, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        (
            SocketSession::new(session_id.to_string(), transport.clone()),
            transport,
        )
    }

    fn entry_frame(name: &str, password: &str, user_name: &str, rq: &str) -> InMessageFrame {
        InMessageFrame {
            request_id: Some(rq.to_string()),
            room: RoomCreds {
                name: name.to_string(),
                password: password.to_string(),
            },
            user_name: user_name.to_string(),
            ..Default::default()
        }
    }

    fn text_frame(text: &str, rq: &str) -> InMessageFrame {
        InMessageFrame {
            request_id: Some(rq.to_string()),
            message: InRoomMessage {
                text: text.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Join a room and drain the four after-join frames.
    async fn join(state: &SharedState, session: &Arc<SocketSession>, room: &str, rq: &str) {
        handle_room_entry(
            state,
            session,
            Command::RoomCreateJoin,
            entry_frame(room, "", "", rq),
        )
        .await;
        for _ in 0..4 {
            session.queue.pop().await.unwrap();
        }
    }

    #[test]
    fn room_names_are_decoded_trimmed_and_lowercased() {
        assert_eq!(normalize_room_name("My%20Room "), "my room");
        assert_eq!(normalize_room_name("LOBBY"), "lobby");
    }

    #[tokio::test]
    async fn create_then_second_create_is_rejected() {
        let state = app();
        let (first, _) = socket("s1");
        handle_room_entry(
            &state,
            &first,
            Command::RoomCreate,
            entry_frame("lobby", "", "Ada", "rq1"),
        )
        .await;
        assert!(state.registry.contains("lobby").await);
        let ack = first.queue.pop().await.unwrap();
        assert!(ack.contains("room_created"));
        assert!(ack.contains("rq1"));

        let (second, _) = socket("s2");
        handle_room_entry(
            &state,
            &second,
            Command::RoomCreate,
            entry_frame("lobby", "", "Bob", "rq2"),
        )
        .await;
        let err = second.queue.pop().await.unwrap();
        assert!(err.contains("201:ROOM_EXISTS"));
    }

    #[tokio::test]
    async fn join_of_missing_room_is_rejected() {
        let state = app();
        let (session, _) = socket("s1");
        handle_room_entry(
            &state,
            &session,
            Command::RoomJoin,
            entry_frame("nowhere", "", "Ada", "rq1"),
        )
        .await;
        let err = session.queue.pop().await.unwrap();
        assert!(err.contains("202:ROOM_NOT_FOUND"));
    }

    #[tokio::test]
    async fn wrong_password_is_rejected_for_new_sessions() {
        let state = app();
        let (owner, _) = socket("s1");
        handle_room_entry(
            &state,
            &owner,
            Command::RoomCreateJoin,
            entry_frame("vault", "hunter2", "Ada", "rq1"),
        )
        .await;
        assert!(owner.queue.pop().await.unwrap().contains("room_created"));

        let (intruder, _) = socket("s2");
        handle_room_entry(
            &state,
            &intruder,
            Command::RoomCreateJoin,
            entry_frame("vault", "wrong", "Bob", "rq2"),
        )
        .await;
        let err = intruder.queue.pop().await.unwrap();
        assert!(err.contains("203:ROOM_WRONG_PASSWORD"));
    }

    #[tokio::test]
    async fn rejoining_session_evicts_its_older_socket() {
        let state = app();
        let (old, old_transport) = socket("same-session");
        handle_room_entry(
            &state,
            &old,
            Command::RoomCreateJoin,
            entry_frame("lobby", "", "Ada", "rq1"),
        )
        .await;

        let (fresh, _) = socket("same-session");
        handle_room_entry(
            &state,
            &fresh,
            Command::RoomCreateJoin,
            entry_frame("lobby", "", "", "rq2"),
        )
        .await;

        assert!(old.is_dead());
        let forced = old_transport.sent_frames();
        assert!(forced.iter().any(|f| f.contains("209:DUPLICATE_SESSION")));

        let room = state.registry.get("lobby").await.unwrap();
        let room_state = room.state.lock().await;
        assert_eq!(room_state.active_sockets.len(), 1);
        assert!(room_state.active_sockets.contains_key(&fresh.socket_id));
        // one user record, both sockets belonged to the same session
        assert_eq!(room_state.member_count(), 1);
    }

    #[tokio::test]
    async fn authorize_only_does_not_attach_the_socket() {
        let state = app();
        let (session, _) = socket("s1");
        handle_room_entry(
            &state,
            &session,
            Command::RoomCreateJoinAuthorize,
            entry_frame("lobby", "", "Ada", "rq1"),
        )
        .await;
        let ack = session.queue.pop().await.unwrap();
        assert!(ack.contains("authorized"));

        let room = state.registry.get("lobby").await.unwrap();
        // the pre-flight ack already names the room and the user
        assert!(ack.contains(&format!(r#""rId":"{}""#, room.id)));
        assert!(ack.contains(r#""uId":"#));
        let room_state = room.state.lock().await;
        assert!(room_state.active_sockets.is_empty());
        assert!(room_state.authorized_users.contains_key("s1"));
    }

    #[tokio::test]
    async fn capacity_counts_live_sockets_not_past_authorizations() {
        let state = app();
        for i in 0..ROOM_CAPACITY {
            let (session, _) = socket(&format!("s{i}"));
            handle_room_entry(
                &state,
                &session,
                Command::RoomCreateJoinAuthorize,
                entry_frame("lobby", "", "", "rq"),
            )
            .await;
        }
        let room = state.registry.get("lobby").await.unwrap();
        assert_eq!(room.state.lock().await.member_count(), ROOM_CAPACITY);

        // everyone is offline, so a fresh session still fits
        let (fresh, _) = socket("s-fresh");
        handle_room_entry(
            &state,
            &fresh,
            Command::RoomCreateJoin,
            entry_frame("lobby", "", "", "rq-f"),
        )
        .await;
        let ack = fresh.queue.pop().await.unwrap();
        assert!(ack.contains("room_joined"));
    }

    #[tokio::test]
    async fn join_is_refused_once_live_sockets_hit_the_cap() {
        let state = app();
        let (owner, _) = socket("s-owner");
        join(&state, &owner, "lobby", "rq1").await;

        let room = state.registry.get("lobby").await.unwrap();
        {
            let mut room_state = room.state.lock().await;
            for i in 0..ROOM_CAPACITY {
                let (session, _) = socket(&format!("s{i}"));
                room_state
                    .active_sockets
                    .insert(session.socket_id.clone(), session);
            }
        }

        let (late, _) = socket("s-late");
        handle_room_entry(
            &state,
            &late,
            Command::RoomCreateJoin,
            entry_frame("lobby", "", "", "rq-l"),
        )
        .await;
        let err = late.queue.pop().await.unwrap();
        assert!(err.contains("208:ROOM_IS_FULL"));
    }

    #[tokio::test]
    async fn authorized_session_with_wrong_password_is_rejected() {
        let state = app();
        let (owner, _) = socket("s1");
        handle_room_entry(
            &state,
            &owner,
            Command::RoomCreateJoin,
            entry_frame("vault", "hunter2", "Ada", "rq1"),
        )
        .await;
        for _ in 0..4 {
            owner.queue.pop().await.unwrap();
        }

        handle_room_entry(
            &state,
            &owner,
            Command::RoomCreateJoin,
            entry_frame("vault", "wrong", "", "rq2"),
        )
        .await;
        let err = owner.queue.pop().await.unwrap();
        assert!(err.contains("203:ROOM_WRONG_PASSWORD"));

        // no password at all rides the stored authorization
        handle_room_entry(
            &state,
            &owner,
            Command::RoomCreateJoin,
            entry_frame("vault", "", "", "rq3"),
        )
        .await;
        let ack = owner.queue.pop().await.unwrap();
        assert!(ack.contains("room_joined"));
    }

    #[tokio::test]
    async fn rejoining_with_a_new_name_applies_it() {
        let state = app();
        let (session, _) = socket("s1");
        handle_room_entry(
            &state,
            &session,
            Command::RoomCreateJoin,
            entry_frame("lobby", "", "Ada", "rq1"),
        )
        .await;
        handle_room_entry(
            &state,
            &session,
            Command::RoomCreateJoin,
            entry_frame("lobby", "", "Grace", "rq2"),
        )
        .await;
        let room = state.registry.get("lobby").await.unwrap();
        let room_state = room.state.lock().await;
        assert_eq!(room_state.authorized_users["s1"].user_name, "Grace");
        assert!(!room_state.authorized_users["s1"].is_anon_name);
    }

    #[tokio::test]
    async fn message_broadcast_is_ackless_and_issuer_gets_rp() {
        let state = app();
        let (sender, _) = socket("s1");
        join(&state, &sender, "lobby", "rq-j").await;

        handle_text_message(&sender, Command::TextMessage, text_frame("hello", "rq-m")).await;
        let broadcast = sender.queue.pop().await.unwrap();
        assert!(broadcast.contains(r#""c":"TM""#));
        assert!(broadcast.contains("hello"));
        assert!(!broadcast.contains("rq-m"));
        let ack = sender.queue.pop().await.unwrap();
        assert!(ack.contains(r#""c":"RP""#));
        assert!(ack.contains("rq-m"));
    }

    #[tokio::test]
    async fn foreign_delete_is_invalid_input_and_self_vote_is_silently_acked() {
        let state = app();
        let (owner, _) = socket("s1");
        join(&state, &owner, "lobby", "rq-j1").await;
        handle_text_message(&owner, Command::TextMessage, text_frame("owners", "rq-m1")).await;

        let (other, _) = socket("s2");
        join(&state, &other, "lobby", "rq-j2").await;

        let mut delete = text_frame("", "rq-d");
        delete.message.id = 1;
        handle_delete_message(&other, delete).await;
        let err = other.queue.pop().await.unwrap();
        assert!(err.contains("103:INVALID_INPUT"));

        handle_text_message(&other, Command::TextMessage, text_frame("theirs", "rq-m2")).await;
        other.queue.pop().await.unwrap(); // the broadcast
        other.queue.pop().await.unwrap(); // the ack

        // voting on your own message: plain ack, no broadcast
        let mut vote = text_frame("", "rq-v");
        vote.message.id = 2;
        vote.support_or_reject = true;
        handle_support_or_reject(&other, vote).await;
        let ack = other.queue.pop().await.unwrap();
        assert!(ack.contains(r#""c":"RP""#));
        assert!(ack.contains("rq-v"));
        other.queue.close();
        assert!(other.queue.pop().await.is_none());
    }

    #[tokio::test]
    async fn commands_against_a_deleted_room_are_refused() {
        let state = app();
        let (session, _) = socket("s1");
        join(&state, &session, "lobby", "rq1").await;
        let room = state.registry.get("lobby").await.unwrap();
        room.state.lock().await.is_deleted = true;

        handle_text_message(&session, Command::TextMessage, text_frame("late", "rq-m")).await;
        let err = session.queue.pop().await.unwrap();
        assert!(err.contains("202:ROOM_NOT_FOUND"));
        assert!(room.state.lock().await.messages.is_empty());
    }

    #[test]
    fn oversized_frame_errors_are_recognized() {
        use tokio_tungstenite::tungstenite::error::{CapacityError, Error as StreamError};
        let too_big = axum::Error::new(StreamError::Capacity(CapacityError::MessageTooLong {
            size: 60_000,
            max_size: 50_000,
        }));
        assert!(frame_too_large(&too_big));
        let other = axum::Error::new(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"));
        assert!(!frame_too_large(&other));
    }
}

/// Flip the server status and tell every room about it.
pub async fn broadcast_server_status(state: &SharedState, status: ServerStatus) {
    state.set_server_status(status);
    let rooms = state.registry.snapshot().await;
    info!(status = status.as_str(), rooms = rooms.len(), "broadcasting server status");
    for room in rooms {
        let room_state = room.state.lock().await;
        write_description_changed(&room_state, status.as_str(), &state.config.build_number);
    }
}
