//! Relay wire protocol.
//!
//! Messages are JSON objects tagged by `type`. Store updates travel as
//! base64-encoded Loro bytes; presence travels as plain JSON.

use crate::presence::{ConnectionId, Presence};
use crate::store::StoreError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Messages sent to the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room
    Join { room: String },
    /// Leave current room
    Leave,
    /// Store updates (base64 encoded Loro bytes)
    Sync { data: String },
    /// Latest local presence
    Presence { state: Presence },
}

/// A connection already in the room when joining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerState {
    pub connection_id: ConnectionId,
    #[serde(default)]
    pub presence: Presence,
}

/// Messages received from the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirm room join with the room's current state
    Joined {
        room: String,
        connection_id: ConnectionId,
        #[serde(default)]
        peers: Vec<PeerState>,
        /// Snapshot of the room's store, absent for a new room
        #[serde(default, skip_serializing_if = "Option::is_none")]
        snapshot: Option<String>,
    },
    PeerJoined { connection_id: ConnectionId },
    PeerLeft { connection_id: ConnectionId },
    /// Store updates from another connection
    Sync { from: ConnectionId, data: String },
    /// Presence from another connection
    Presence { from: ConnectionId, state: Presence },
    Error { message: String },
}

/// What an incoming message did to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    JoinedRoom {
        room: String,
        connection_id: ConnectionId,
        peer_count: usize,
        resynced: bool,
    },
    PeerJoined { connection_id: ConnectionId },
    PeerLeft { connection_id: ConnectionId },
    SyncReceived { from: ConnectionId },
    PresenceReceived { from: ConnectionId },
    Error { message: String },
}

/// Sync errors.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Failed to apply update: {0}")]
    Store(#[from] StoreError),
}

pub fn encode_payload(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_payload(data: &str) -> Result<Vec<u8>, SyncError> {
    Ok(STANDARD.decode(data)?)
}
