//! In-process room relay.
//!
//! Assigns connection ids, fans `sync` and `presence` messages out to the
//! other connections in the same room, and keeps a merged copy of each
//! room's store so late joiners receive a complete snapshot.

use liveboard_core::presence::{ConnectionId, Presence};
use liveboard_core::store::LayerStore;
use liveboard_core::sync::{ClientMessage, PeerState, ServerMessage, decode_payload, encode_payload};
use liveboard_core::BoardConfig;
use std::collections::{BTreeMap, HashMap};

/// Room state
struct Room {
    /// Connected peers with their latest presence
    peers: BTreeMap<ConnectionId, Presence>,
    /// Merged store for new joiners
    store: LayerStore,
    /// Whether any update was merged into `store`
    synced: bool,
}

impl Room {
    fn new(config: &BoardConfig) -> Self {
        Self {
            peers: BTreeMap::new(),
            store: LayerStore::new(config),
            synced: false,
        }
    }
}

#[derive(Default)]
struct Connection {
    room: Option<String>,
    inbox: Vec<String>,
}

pub struct Relay {
    config: BoardConfig,
    rooms: HashMap<String, Room>,
    connections: BTreeMap<ConnectionId, Connection>,
    next_connection_id: ConnectionId,
}

impl Relay {
    pub fn new(config: BoardConfig) -> Self {
        Self {
            config,
            rooms: HashMap::new(),
            connections: BTreeMap::new(),
            next_connection_id: 1,
        }
    }

    /// Open a transport. The id doubles as the connection id handed out on join.
    pub fn connect(&mut self) -> ConnectionId {
        let id = self.next_connection_id;
        self.next_connection_id += 1;
        self.connections.insert(id, Connection::default());
        log::info!("New connection: {id}");
        id
    }

    /// Close a transport, leaving its room.
    pub fn disconnect(&mut self, id: ConnectionId) {
        self.leave_room(id);
        self.connections.remove(&id);
        log::info!("Connection {id} closed");
    }

    #[cfg(test)]
    pub fn room_len(&self, room: &str) -> usize {
        self.rooms.get(room).map_or(0, |r| r.peers.len())
    }

    /// Drain the messages queued for a connection.
    pub fn take_inbox(&mut self, id: ConnectionId) -> Vec<String> {
        self.connections
            .get_mut(&id)
            .map(|c| std::mem::take(&mut c.inbox))
            .unwrap_or_default()
    }

    fn send(&mut self, to: ConnectionId, msg: &ServerMessage) {
        let Some(connection) = self.connections.get_mut(&to) else {
            return;
        };
        match serde_json::to_string(msg) {
            Ok(json) => connection.inbox.push(json),
            Err(err) => log::error!("Failed to encode message for {to}: {err}"),
        }
    }

    /// Send to every connection in `room` except `from`.
    fn broadcast(&mut self, room: &str, from: ConnectionId, msg: &ServerMessage) {
        let targets: Vec<ConnectionId> = self
            .rooms
            .get(room)
            .map(|r| r.peers.keys().copied().filter(|&id| id != from).collect())
            .unwrap_or_default();
        for id in targets {
            self.send(id, msg);
        }
    }

    /// Handle one JSON message from a client.
    pub fn receive(&mut self, from: ConnectionId, json: &str) {
        if !self.connections.contains_key(&from) {
            log::warn!("Message from unknown connection {from}");
            return;
        }
        let msg = match serde_json::from_str::<ClientMessage>(json) {
            Ok(msg) => msg,
            Err(err) => {
                log::warn!("Invalid message from {from}: {err}");
                self.send(
                    from,
                    &ServerMessage::Error {
                        message: format!("Invalid message: {err}"),
                    },
                );
                return;
            }
        };

        match msg {
            ClientMessage::Join { room } => self.join_room(from, room),
            ClientMessage::Leave => self.leave_room(from),
            ClientMessage::Sync { data } => self.sync(from, data),
            ClientMessage::Presence { state } => {
                let Some(room) = self.room_of(from) else {
                    return;
                };
                if let Some(peer) = self.rooms.get_mut(&room).and_then(|r| r.peers.get_mut(&from)) {
                    *peer = state.clone();
                }
                self.broadcast(&room, from, &ServerMessage::Presence { from, state });
            }
        }
    }

    fn room_of(&self, id: ConnectionId) -> Option<String> {
        self.connections.get(&id).and_then(|c| c.room.clone())
    }

    fn join_room(&mut self, id: ConnectionId, room_id: String) {
        // Leave current room if any
        self.leave_room(id);

        let room = self
            .rooms
            .entry(room_id.clone())
            .or_insert_with(|| Room::new(&self.config));
        let peers = room
            .peers
            .iter()
            .map(|(&connection_id, presence)| PeerState {
                connection_id,
                presence: presence.clone(),
            })
            .collect();
        let snapshot = if !room.synced {
            None
        } else {
            match room.store.export_snapshot() {
                Ok(bytes) => Some(encode_payload(&bytes)),
                Err(err) => {
                    log::error!("Failed to export snapshot of room {room_id}: {err}");
                    None
                }
            }
        };
        room.peers.insert(id, Presence::default());
        if let Some(connection) = self.connections.get_mut(&id) {
            connection.room = Some(room_id.clone());
        }

        self.send(
            id,
            &ServerMessage::Joined {
                room: room_id.clone(),
                connection_id: id,
                peers,
                snapshot,
            },
        );
        self.broadcast(&room_id, id, &ServerMessage::PeerJoined { connection_id: id });
        log::info!("Connection {id} joined room {room_id}");
    }

    fn leave_room(&mut self, id: ConnectionId) {
        let Some(room_id) = self.connections.get_mut(&id).and_then(|c| c.room.take()) else {
            return;
        };
        self.broadcast(&room_id, id, &ServerMessage::PeerLeft { connection_id: id });
        if let Some(room) = self.rooms.get_mut(&room_id) {
            room.peers.remove(&id);
            // Clean up empty rooms
            if room.peers.is_empty() {
                self.rooms.remove(&room_id);
                log::info!("Room {room_id} closed");
            }
        }
        log::info!("Connection {id} left room {room_id}");
    }

    fn sync(&mut self, from: ConnectionId, data: String) {
        let Some(room_id) = self.room_of(from) else {
            log::warn!("Sync from {from} outside a room");
            return;
        };
        let merged = decode_payload(&data).and_then(|bytes| {
            let room = self.rooms.get_mut(&room_id);
            match room {
                Some(room) => {
                    // Peers repair merges themselves; the relay only forwards.
                    room.store.import_raw(&bytes)?;
                    room.synced = true;
                    Ok(())
                }
                None => Ok(()),
            }
        });
        if let Err(err) = merged {
            log::warn!("Rejecting sync from {from}: {err}");
            self.send(
                from,
                &ServerMessage::Error {
                    message: err.to_string(),
                },
            );
            return;
        }
        self.broadcast(&room_id, from, &ServerMessage::Sync { from, data });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ServerMessage {
        serde_json::from_str(json).expect("Failed to parse server message")
    }

    fn send(relay: &mut Relay, from: ConnectionId, msg: &ClientMessage) {
        let json = serde_json::to_string(msg).expect("Failed to encode");
        relay.receive(from, &json);
    }

    #[test]
    fn test_join_assigns_connection_id() {
        let mut relay = Relay::new(BoardConfig::default());
        let a = relay.connect();
        send(&mut relay, a, &ClientMessage::Join { room: "r".into() });

        let inbox = relay.take_inbox(a);
        assert_eq!(inbox.len(), 1);
        assert_eq!(
            parse(&inbox[0]),
            ServerMessage::Joined {
                room: "r".into(),
                connection_id: a,
                peers: Vec::new(),
                snapshot: None,
            }
        );
        assert_eq!(relay.room_len("r"), 1);
    }

    #[test]
    fn test_presence_fans_out_to_others_only() {
        let mut relay = Relay::new(BoardConfig::default());
        let a = relay.connect();
        let b = relay.connect();
        send(&mut relay, a, &ClientMessage::Join { room: "r".into() });
        send(&mut relay, b, &ClientMessage::Join { room: "r".into() });
        relay.take_inbox(a);
        relay.take_inbox(b);

        send(
            &mut relay,
            a,
            &ClientMessage::Presence {
                state: Presence::default(),
            },
        );
        assert!(relay.take_inbox(a).is_empty());
        let inbox = relay.take_inbox(b);
        assert_eq!(
            parse(&inbox[0]),
            ServerMessage::Presence {
                from: a,
                state: Presence::default(),
            }
        );
    }

    #[test]
    fn test_late_joiner_gets_snapshot_and_peers() {
        let mut relay = Relay::new(BoardConfig::default());
        let a = relay.connect();
        send(&mut relay, a, &ClientMessage::Join { room: "r".into() });

        let mut store = LayerStore::new(&BoardConfig::default());
        store
            .insert_layer(
                liveboard_core::LayerKind::Rectangle,
                kurbo::Point::new(1.0, 2.0),
                liveboard_core::Rgb::black(),
            )
            .expect("Failed to insert");
        let data = encode_payload(&store.export_snapshot().expect("Failed to export"));
        send(&mut relay, a, &ClientMessage::Sync { data });

        let b = relay.connect();
        send(&mut relay, b, &ClientMessage::Join { room: "r".into() });
        let inbox = relay.take_inbox(b);
        let ServerMessage::Joined { peers, snapshot, .. } = parse(&inbox[0]) else {
            panic!("Expected joined");
        };
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].connection_id, a);

        let bytes = decode_payload(&snapshot.expect("Expected a snapshot")).expect("Failed to decode");
        let copy = LayerStore::from_snapshot(&bytes, &BoardConfig::default()).expect("Failed to import");
        assert_eq!(copy.layers(), store.layers());
    }

    #[test]
    fn test_disconnect_notifies_room() {
        let mut relay = Relay::new(BoardConfig::default());
        let a = relay.connect();
        let b = relay.connect();
        send(&mut relay, a, &ClientMessage::Join { room: "r".into() });
        send(&mut relay, b, &ClientMessage::Join { room: "r".into() });
        relay.take_inbox(a);

        relay.disconnect(b);
        let inbox = relay.take_inbox(a);
        assert_eq!(parse(&inbox[0]), ServerMessage::PeerLeft { connection_id: b });
        relay.disconnect(a);
        assert_eq!(relay.room_len("r"), 0);
    }

    #[test]
    fn test_invalid_message_gets_error() {
        let mut relay = Relay::new(BoardConfig::default());
        let a = relay.connect();
        relay.receive(a, "{\"type\":\"bogus\"}");
        let inbox = relay.take_inbox(a);
        assert!(matches!(parse(&inbox[0]), ServerMessage::Error { .. }));
    }
}
