//! Ephemeral per-connection presence: cursor, selection and pencil draft.
//!
//! Presence is never part of the shared document. Only the latest value per
//! connection matters, so the outgoing side keeps a single dirty flag instead
//! of a queue: however many local updates happen between two flushes, one
//! broadcast carries the newest state.

use crate::layer::{LayerId, Rgb};
use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier the relay assigns to each connected participant.
pub type ConnectionId = u64;

/// Display colors handed out to connections.
pub const PALETTE: [Rgb; 5] = [
    Rgb::new(0xdc, 0x26, 0x26),
    Rgb::new(0xd9, 0x77, 0x06),
    Rgb::new(0x05, 0x96, 0x69),
    Rgb::new(0x7c, 0x3a, 0xed),
    Rgb::new(0xdb, 0x27, 0x77),
];

/// Stable display color for a connection.
///
/// Every peer computes the same color for the same id without negotiation.
pub fn connection_color(connection_id: ConnectionId) -> Rgb {
    PALETTE[(connection_id % PALETTE.len() as u64) as usize]
}

/// Presence state of one connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Presence {
    /// Cursor position in canvas space; absent when the pointer left the canvas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Point>,
    /// Selected layer ids.
    #[serde(default)]
    pub selection: Vec<LayerId>,
    /// Points of a stroke being drawn, in canvas space.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pencil_draft: Option<Vec<Point>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pencil_color: Option<Rgb>,
}

/// The latest presence observed for another connection.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerPresence {
    pub connection_id: ConnectionId,
    pub presence: Presence,
    pub color: Rgb,
    /// Monotonic observation stamp; larger means seen more recently.
    pub seen: u64,
}

/// Changes to the set of other connections, in observation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceEvent {
    Joined(ConnectionId),
    Updated(ConnectionId),
    Left(ConnectionId),
}

/// Local presence plus everything observed from peers.
#[derive(Debug, Default)]
pub struct PresenceChannel {
    connection_id: Option<ConnectionId>,
    local: Presence,
    dirty: bool,
    others: HashMap<ConnectionId, PeerPresence>,
    clock: u64,
    events: Vec<PresenceEvent>,
}

impl PresenceChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id assigned by the relay, if connected.
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection_id
    }

    pub fn set_connection_id(&mut self, connection_id: Option<ConnectionId>) {
        self.connection_id = connection_id;
    }

    /// Display color of this connection.
    pub fn color(&self) -> Option<Rgb> {
        self.connection_id.map(connection_color)
    }

    // --- Local state ---

    pub fn local(&self) -> &Presence {
        &self.local
    }

    pub fn selection(&self) -> &[LayerId] {
        &self.local.selection
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.local.selection.iter().any(|s| s == id)
    }

    pub fn set_cursor(&mut self, cursor: Option<Point>) {
        if self.local.cursor != cursor {
            self.local.cursor = cursor;
            self.dirty = true;
        }
    }

    pub fn set_selection(&mut self, selection: Vec<LayerId>) {
        if self.local.selection != selection {
            self.local.selection = selection;
            self.dirty = true;
        }
    }

    pub fn set_pencil_draft(&mut self, draft: Option<Vec<Point>>, color: Option<Rgb>) {
        if self.local.pencil_draft != draft || self.local.pencil_color != color {
            self.local.pencil_draft = draft;
            self.local.pencil_color = color;
            self.dirty = true;
        }
    }

    /// Take the local state if it changed since the last call.
    pub fn take_update(&mut self) -> Option<Presence> {
        if self.dirty {
            self.dirty = false;
            Some(self.local.clone())
        } else {
            None
        }
    }

    /// Force the next `take_update` to rebroadcast, e.g. after reconnecting.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    // --- Remote state ---

    /// A peer connected with empty presence.
    pub fn connect(&mut self, connection_id: ConnectionId) {
        if Some(connection_id) == self.connection_id {
            return;
        }
        self.clock += 1;
        let seen = self.clock;
        let mut joined = false;
        self.others.entry(connection_id).or_insert_with(|| {
            joined = true;
            PeerPresence {
                connection_id,
                presence: Presence::default(),
                color: connection_color(connection_id),
                seen,
            }
        });
        if joined {
            self.events.push(PresenceEvent::Joined(connection_id));
        }
    }

    /// Record the latest presence broadcast by a peer.
    pub fn observe(&mut self, connection_id: ConnectionId, presence: Presence) {
        if Some(connection_id) == self.connection_id {
            log::debug!("Ignoring echoed presence for own connection {connection_id}");
            return;
        }
        if !self.others.contains_key(&connection_id) {
            self.connect(connection_id);
        }
        self.clock += 1;
        if let Some(peer) = self.others.get_mut(&connection_id) {
            peer.presence = presence;
            peer.seen = self.clock;
        }
        self.events.push(PresenceEvent::Updated(connection_id));
    }

    pub fn disconnect(&mut self, connection_id: ConnectionId) {
        if self.others.remove(&connection_id).is_some() {
            self.events.push(PresenceEvent::Left(connection_id));
        }
    }

    /// Forget every peer, e.g. before resynchronizing after a reconnect.
    pub fn clear_others(&mut self) {
        let mut ids: Vec<ConnectionId> = self.others.keys().copied().collect();
        ids.sort_unstable();
        self.others.clear();
        self.events.extend(ids.into_iter().map(PresenceEvent::Left));
    }

    pub fn other(&self, connection_id: ConnectionId) -> Option<&PeerPresence> {
        self.others.get(&connection_id)
    }

    /// Other connections, least recently observed first.
    pub fn others(&self) -> Vec<&PeerPresence> {
        let mut others: Vec<&PeerPresence> = self.others.values().collect();
        others.sort_by_key(|peer| peer.seen);
        others
    }

    /// Drain the events observed since the last call.
    pub fn take_events(&mut self) -> Vec<PresenceEvent> {
        std::mem::take(&mut self.events)
    }

    /// Highlight color for each layer selected by another connection.
    pub fn selection_colors(&self) -> HashMap<LayerId, Rgb> {
        selection_colors(self.others.values())
    }
}

/// Map each remotely selected layer to the color of the connection that was
/// observed selecting it most recently.
///
/// Two peers selecting the same layer make the result depend on arrival
/// order; the map is a rendering hint and may flicker.
pub fn selection_colors<'a>(peers: impl IntoIterator<Item = &'a PeerPresence>) -> HashMap<LayerId, Rgb> {
    let mut peers: Vec<&PeerPresence> = peers.into_iter().collect();
    peers.sort_by_key(|peer| peer.seen);

    let mut colors = HashMap::new();
    for peer in peers {
        for layer_id in &peer.presence.selection {
            colors.insert(layer_id.clone(), peer.color);
        }
    }
    colors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selecting(ids: &[&str]) -> Presence {
        Presence {
            selection: ids.iter().map(|s| s.to_string()).collect(),
            ..Presence::default()
        }
    }

    #[test]
    fn test_connection_color_is_stable() {
        assert_eq!(connection_color(7), connection_color(7));
        assert_eq!(connection_color(0), PALETTE[0]);
        assert_eq!(connection_color(6), PALETTE[1]);
    }

    #[test]
    fn test_updates_are_coalesced() {
        let mut channel = PresenceChannel::new();
        channel.set_cursor(Some(Point::new(1.0, 1.0)));
        channel.set_cursor(Some(Point::new(2.0, 2.0)));
        channel.set_cursor(Some(Point::new(3.0, 3.0)));

        let update = channel.take_update().expect("Expected an update");
        assert_eq!(update.cursor, Some(Point::new(3.0, 3.0)));
        assert!(channel.take_update().is_none());
    }

    #[test]
    fn test_unchanged_state_is_not_rebroadcast() {
        let mut channel = PresenceChannel::new();
        channel.set_selection(Vec::new());
        assert!(channel.take_update().is_none());
    }

    #[test]
    fn test_last_observed_selection_wins() {
        let mut channel = PresenceChannel::new();
        channel.observe(1, selecting(&["layer"]));
        channel.observe(2, selecting(&["layer"]));

        let colors = channel.selection_colors();
        assert_eq!(colors.get("layer"), Some(&connection_color(2)));

        channel.observe(1, selecting(&["layer"]));
        assert_eq!(channel.selection_colors().get("layer"), Some(&connection_color(1)));
    }

    #[test]
    fn test_disjoint_selections_get_distinct_colors() {
        let mut channel = PresenceChannel::new();
        channel.observe(1, selecting(&["a"]));
        channel.observe(2, selecting(&["b"]));

        let colors = channel.selection_colors();
        assert_eq!(colors.len(), 2);
        assert_ne!(colors["a"], colors["b"]);
    }

    #[test]
    fn test_own_connection_is_not_a_peer() {
        let mut channel = PresenceChannel::new();
        channel.set_connection_id(Some(4));
        channel.observe(4, selecting(&["a"]));
        channel.connect(4);
        assert!(channel.others().is_empty());
        assert!(channel.take_events().is_empty());
    }

    #[test]
    fn test_event_stream() {
        let mut channel = PresenceChannel::new();
        channel.connect(1);
        channel.observe(1, Presence::default());
        channel.disconnect(1);
        channel.disconnect(1);

        assert_eq!(
            channel.take_events(),
            vec![PresenceEvent::Joined(1), PresenceEvent::Updated(1), PresenceEvent::Left(1)]
        );
        assert!(channel.take_events().is_empty());
        assert!(channel.other(1).is_none());
    }

    #[test]
    fn test_clear_others_on_reconnect() {
        let mut channel = PresenceChannel::new();
        channel.observe(2, selecting(&["a"]));
        channel.observe(1, selecting(&["b"]));
        channel.take_events();

        channel.clear_others();
        assert!(channel.others().is_empty());
        assert_eq!(channel.take_events(), vec![PresenceEvent::Left(1), PresenceEvent::Left(2)]);
    }
}
