use crate::engine::room::{Room, RoomState};
use crate::engine::session::SocketSession;
use crate::engine::FORCED_WRITE_TIMEOUT;
use crate::models::error::WsError;
use crate::models::frame::{Command, OutMessageFrame, RoomMessageDto};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::error;

/// Serialize an outbound frame once so a broadcast shares one allocation
/// across all receiving queues.
pub fn encode_frame(frame: &OutMessageFrame) -> Option<Arc<String>> {
    match serde_json::to_string(frame) {
        Ok(json) => Some(Arc::new(json)),
        Err(e) => {
            error!(command = ?frame.command, "failed to encode outbound frame: {e}");
            None
        }
    }
}

/// Fan a frame out to every live socket in the room. Queue pushes never
/// block, so calling this under the room lock is fine.
pub fn write_frame_to_members(state: &RoomState, frame: &OutMessageFrame, skip_socket_id: Option<&str>) {
    let Some(encoded) = encode_frame(frame) else {
        return;
    };
    for socket in state.active_sockets.values() {
        if Some(socket.socket_id.as_str()) == skip_socket_id {
            continue;
        }
        socket.put_frame(Arc::clone(&encoded));
    }
}

/// Tell the room who is in it now.
pub fn write_members_changed(state: &RoomState, skip_socket_id: Option<&str>) {
    let frame = OutMessageFrame {
        all_room_users: Some(state.user_dtos()),
        ..OutMessageFrame::new(Command::RoomMembersChanged)
    };
    write_frame_to_members(state, &frame, skip_socket_id);
}

/// Broadcast the room description together with the current server status
/// and build, so clients refresh their header in one frame.
pub fn write_description_changed(state: &RoomState, server_status: &str, build: &str) {
    let frame = description_frame(state, server_status, build);
    write_frame_to_members(state, &frame, None);
}

fn description_frame(state: &RoomState, server_status: &str, build: &str) -> OutMessageFrame {
    OutMessageFrame {
        processing_details: Some(state.description.clone()),
        room_creator_user_in_room_id: Some(state.creator_user_in_room_id.clone()),
        server_status: Some(server_status.to_string()),
        current_build_number: Some(build.to_string()),
        ..OutMessageFrame::new(Command::RoomChangeDescription)
    }
}

/// Room-wide notice, e.g. that the backlog limit is near or was hit.
pub fn write_notification(state: &RoomState, command: Command, detail: String) {
    let frame = OutMessageFrame {
        processing_details: Some(detail),
        ..OutMessageFrame::new(command)
    };
    write_frame_to_members(state, &frame, None);
}

pub fn write_error(session: &SocketSession, err: WsError, request_id: Option<String>) {
    let frame = OutMessageFrame {
        request_id,
        processing_details: Some(err.details()),
        ..OutMessageFrame::new(Command::Error)
    };
    if let Some(encoded) = encode_frame(&frame) {
        session.put_frame(encoded);
    }
}

/// Synchronous error write that bypasses the delivery queue. Used right
/// before force-evicting a socket, when its writer task is about to stop.
pub async fn write_error_forced(session: &SocketSession, err: WsError) {
    let frame = OutMessageFrame {
        processing_details: Some(err.details()),
        ..OutMessageFrame::new(Command::Error)
    };
    if let Some(encoded) = encode_frame(&frame) {
        let _ = timeout(FORCED_WRITE_TIMEOUT, session.transport.send_text(&encoded)).await;
    }
}

pub fn write_request_processed(session: &SocketSession, request_id: Option<String>, details: Option<String>) {
    let frame = OutMessageFrame {
        request_id,
        processing_details: details,
        ..OutMessageFrame::new(Command::RequestProcessed)
    };
    if let Some(encoded) = encode_frame(&frame) {
        session.put_frame(encoded);
    }
}

/// Everything a freshly joined socket needs to render the room: the join
/// acknowledgement with its identity, the member list, the whole backlog and
/// the description. The rest of the room gets a members-changed frame.
#[allow(clippy::too_many_arguments)]
pub fn write_after_join_frames(
    room: &Room,
    state: &RoomState,
    session: &SocketSession,
    user_in_room_id: &str,
    request_id: Option<String>,
    details: String,
    server_status: &str,
    build: &str,
) {
    let ack = OutMessageFrame {
        request_id,
        processing_details: Some(details),
        room_id: Some(room.id.clone()),
        user_in_room_id: Some(user_in_room_id.to_string()),
        room_creator_user_in_room_id: Some(state.creator_user_in_room_id.clone()),
        created_at_nano: Some(room_started_at_nanos(room)),
        server_status: Some(server_status.to_string()),
        current_build_number: Some(build.to_string()),
        ..OutMessageFrame::new(Command::RequestProcessed)
    };
    let members = OutMessageFrame {
        all_room_users: Some(state.user_dtos()),
        ..OutMessageFrame::new(Command::RoomMembersChanged)
    };
    let backlog = OutMessageFrame {
        message: Some(state.messages_sorted_dtos()),
        ..OutMessageFrame::new(Command::AllTextMessages)
    };
    for frame in [&ack, &members, &backlog, &description_frame(state, server_status, build)] {
        if let Some(encoded) = encode_frame(frame) {
            session.put_frame(encoded);
        }
    }
    write_members_changed(state, Some(&session.socket_id));
}

fn room_started_at_nanos(room: &Room) -> i64 {
    room.created_at.timestamp_nanos_opt().unwrap_or_default()
}

/// Pre-flight authorization ack: the room's identity and the caller's user
/// id, without attaching the socket.
pub fn write_room_authorized(
    session: &SocketSession,
    room: &Room,
    user_in_room_id: &str,
    request_id: Option<String>,
    details: String,
) {
    let frame = OutMessageFrame {
        request_id,
        processing_details: Some(details),
        room_id: Some(room.id.clone()),
        user_in_room_id: Some(user_in_room_id.to_string()),
        created_at_nano: Some(room_started_at_nanos(room)),
        ..OutMessageFrame::new(Command::RequestProcessed)
    };
    if let Some(encoded) = encode_frame(&frame) {
        session.put_frame(encoded);
    }
}

/// Forward a message mutation to the whole room. The issuer gets its own
/// acknowledgement separately, so the broadcast carries no request id.
pub fn write_message_frame(state: &RoomState, command: Command, dto: RoomMessageDto) {
    let frame = OutMessageFrame {
        message: Some(vec![dto]),
        ..OutMessageFrame::new(command)
    };
    write_frame_to_members(state, &frame, None);
}
