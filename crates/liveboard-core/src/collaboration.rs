//! Bridge between a [`Board`] and a room relay.
//!
//! The session never blocks: local edits are committed optimistically and
//! picked up by [`CollaborationSession::take_outgoing`], which the host calls
//! whenever it can write to the transport.

use crate::board::Board;
use crate::sync::{ClientMessage, ServerMessage, SyncError, SyncEvent, decode_payload, encode_payload};
use loro::VersionVector;

/// Connection to one room.
#[derive(Debug, Default)]
pub struct CollaborationSession {
    /// Room requested by the host, kept across reconnects.
    room: Option<String>,
    /// Whether the relay confirmed the join.
    joined: bool,
    /// Store version last handed to the relay.
    exported: VersionVector,
    /// Pending outgoing messages (JSON strings).
    outgoing: Vec<String>,
}

impl CollaborationSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    /// Whether the relay confirmed the join and updates are flowing.
    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// Request to join a room. Queues the join message.
    pub fn join(&mut self, room: &str) {
        self.room = Some(room.to_string());
        self.joined = false;
        self.queue(&ClientMessage::Join { room: room.to_string() });
    }

    /// Re-send the join for the current room after the transport came back.
    pub fn rejoin(&mut self) {
        if let Some(room) = self.room.clone() {
            self.join(&room);
        }
    }

    /// Leave the room. Local state is kept.
    pub fn leave(&mut self, board: &mut Board) {
        if self.room.take().is_some() {
            self.queue(&ClientMessage::Leave);
        }
        self.joined = false;
        board.presence_mut().set_connection_id(None);
        board.presence_mut().clear_others();
    }

    /// The transport dropped. Local edits stay valid and are reconciled by
    /// the snapshot in the next `joined`.
    pub fn disconnected(&mut self, board: &mut Board) {
        if self.joined {
            log::info!("Disconnected from room {}", self.room.as_deref().unwrap_or_default());
        }
        self.joined = false;
        self.outgoing.clear();
        board.presence_mut().set_connection_id(None);
        board.presence_mut().clear_others();
    }

    fn queue(&mut self, msg: &ClientMessage) {
        match serde_json::to_string(msg) {
            Ok(json) => self.outgoing.push(json),
            Err(err) => log::error!("Failed to encode message: {err}"),
        }
    }

    /// Take pending outgoing messages, including one store update with
    /// everything committed since the last call and the latest presence.
    pub fn take_outgoing(&mut self, board: &mut Board) -> Vec<String> {
        if self.joined {
            self.queue_store_updates(board);
            if let Some(state) = board.presence_mut().take_update() {
                self.queue(&ClientMessage::Presence { state });
            }
        }
        std::mem::take(&mut self.outgoing)
    }

    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    fn queue_store_updates(&mut self, board: &Board) {
        let version = board.store().version();
        if version == self.exported {
            return;
        }
        match board.store().export_updates(&self.exported) {
            Ok(bytes) => {
                self.queue(&ClientMessage::Sync {
                    data: encode_payload(&bytes),
                });
                self.exported = version;
            }
            Err(err) => log::error!("Failed to export updates: {err}"),
        }
    }

    // --- Incoming Message Handling ---

    /// Handle an incoming relay message.
    /// Returns a SyncEvent describing what happened, or `None` if the
    /// message was dropped.
    pub fn handle_message(&mut self, json: &str, board: &mut Board) -> Option<SyncEvent> {
        match self.apply_message(json, board) {
            Ok(event) => Some(event),
            Err(err) => {
                log::warn!("Dropping relay message: {err}");
                None
            }
        }
    }

    fn apply_message(&mut self, json: &str, board: &mut Board) -> Result<SyncEvent, SyncError> {
        let msg: ServerMessage = serde_json::from_str(json)?;

        match msg {
            ServerMessage::Joined {
                room,
                connection_id,
                peers,
                snapshot,
            } => {
                let resynced = match snapshot {
                    Some(data) => {
                        // Unconfirmed local edits are discarded in favor of the room state.
                        // Repairs of the snapshot are ours to send.
                        self.exported = board.store_mut().replace_with_snapshot(&decode_payload(&data)?)?;
                        true
                    }
                    None => {
                        // New room: everything local is news to the relay.
                        self.exported = VersionVector::default();
                        false
                    }
                };
                board.prune_selection();

                let presence = board.presence_mut();
                presence.clear_others();
                presence.set_connection_id(Some(connection_id));
                for peer in &peers {
                    presence.observe(peer.connection_id, peer.presence.clone());
                }
                presence.mark_dirty();

                self.room = Some(room.clone());
                self.joined = true;
                log::info!("Joined room {room} as connection {connection_id} with {} peer(s)", peers.len());

                Ok(SyncEvent::JoinedRoom {
                    room,
                    connection_id,
                    peer_count: peers.len(),
                    resynced,
                })
            }
            ServerMessage::PeerJoined { connection_id } => {
                board.presence_mut().connect(connection_id);
                Ok(SyncEvent::PeerJoined { connection_id })
            }
            ServerMessage::PeerLeft { connection_id } => {
                board.presence_mut().disconnect(connection_id);
                Ok(SyncEvent::PeerLeft { connection_id })
            }
            ServerMessage::Sync { from, data } => {
                let bytes = decode_payload(&data)?;
                board.store_mut().import(&bytes)?;
                board.prune_selection();
                Ok(SyncEvent::SyncReceived { from })
            }
            ServerMessage::Presence { from, state } => {
                board.presence_mut().observe(from, state);
                Ok(SyncEvent::PresenceReceived { from })
            }
            ServerMessage::Error { message } => {
                log::warn!("Relay error: {message}");
                Ok(SyncEvent::Error { message })
            }
        }
    }
}
