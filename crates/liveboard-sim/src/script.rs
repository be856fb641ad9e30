//! Scripted multi-peer sessions.
//!
//! A script names the peers sharing one room and lists the steps each of
//! them performs. Messages only move between peers on `flush`, so a script
//! can interleave edits to reproduce concurrent scenarios.

use crate::relay::Relay;
use liveboard_core::input::{Command, Modifiers, PointerEvent, Tool};
use liveboard_core::presence::ConnectionId;
use liveboard_core::selection::ResizeHandle;
use liveboard_core::{Board, BoardConfig, CollaborationSession, RenderFrame};
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Upper bound on relay round trips per flush.
const MAX_FLUSH_ROUNDS: usize = 16;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Invalid script: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Step {step} names unknown peer {peer:?}")]
    UnknownPeer { step: usize, peer: String },
    #[error("Step {step} needs a peer")]
    MissingPeer { step: usize },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    #[serde(default = "default_room")]
    pub room: String,
    pub peers: Vec<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

fn default_room() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    /// Acting peer; not needed for `flush`.
    #[serde(default)]
    pub peer: Option<String>,
    pub action: Action,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Pointer { event: PointerEvent },
    Tool { tool: Tool },
    Command { command: Command },
    Key {
        key: String,
        #[serde(default)]
        modifiers: Modifiers,
    },
    ResizeHandle { handle: ResizeHandle },
    /// Drop the peer's transport.
    Disconnect,
    /// Reopen the transport and rejoin the room.
    Reconnect,
    /// Deliver queued messages until the relay is quiet.
    Flush,
}

impl Script {
    pub fn from_json(json: &str) -> Result<Self, ScriptError> {
        Ok(serde_json::from_str(json)?)
    }
}

struct Peer {
    session: CollaborationSession,
    board: Board,
    transport: Option<ConnectionId>,
}

/// Runs a script against one relay.
pub struct Simulation {
    room: String,
    relay: Relay,
    peers: BTreeMap<String, Peer>,
}

impl Simulation {
    /// Create every peer and queue its join.
    pub fn new(script: &Script, config: &BoardConfig) -> Self {
        let mut relay = Relay::new(config.clone());
        let peers = script
            .peers
            .iter()
            .map(|name| {
                let mut session = CollaborationSession::new();
                session.join(&script.room);
                let peer = Peer {
                    session,
                    board: Board::new(config.clone()),
                    transport: Some(relay.connect()),
                };
                (name.clone(), peer)
            })
            .collect();
        Self {
            room: script.room.clone(),
            relay,
            peers,
        }
    }

    #[cfg(test)]
    pub fn board(&self, name: &str) -> Option<&Board> {
        self.peers.get(name).map(|p| &p.board)
    }

    /// Execute every step, then flush once more so all peers converge.
    pub fn run(&mut self, steps: &[Step]) -> Result<(), ScriptError> {
        self.flush();
        for (index, step) in steps.iter().enumerate() {
            self.step(index, step)?;
        }
        self.flush();
        Ok(())
    }

    fn step(&mut self, index: usize, step: &Step) -> Result<(), ScriptError> {
        if let Action::Flush = step.action {
            self.flush();
            return Ok(());
        }
        let name = step.peer.as_deref().ok_or(ScriptError::MissingPeer { step: index })?;
        let peer = self.peers.get_mut(name).ok_or_else(|| ScriptError::UnknownPeer {
            step: index,
            peer: name.to_string(),
        })?;
        log::debug!("Step {index}: {name} {:?}", step.action);

        match &step.action {
            Action::Pointer { event } => peer.board.handle_pointer(event.clone()),
            Action::Tool { tool } => peer.board.select_tool(*tool),
            Action::Command { command } => peer.board.command(*command),
            Action::Key { key, modifiers } => {
                if !peer.board.key_down(key, *modifiers) {
                    log::warn!("Step {index}: key {key:?} is not bound");
                }
            }
            Action::ResizeHandle { handle } => peer.board.resize_handle_down(*handle),
            Action::Disconnect => {
                if let Some(id) = peer.transport.take() {
                    self.relay.disconnect(id);
                }
                peer.session.disconnected(&mut peer.board);
            }
            Action::Reconnect => {
                if peer.transport.is_none() {
                    peer.transport = Some(self.relay.connect());
                }
                if peer.session.room().is_some() {
                    peer.session.rejoin();
                } else {
                    peer.session.join(&self.room);
                }
            }
            Action::Flush => {}
        }
        Ok(())
    }

    /// Move messages between peers and the relay until nothing is in flight.
    pub fn flush(&mut self) {
        for _ in 0..MAX_FLUSH_ROUNDS {
            let mut moved = 0;
            for peer in self.peers.values_mut() {
                let Some(id) = peer.transport else {
                    continue;
                };
                for json in peer.session.take_outgoing(&mut peer.board) {
                    self.relay.receive(id, &json);
                    moved += 1;
                }
            }
            for peer in self.peers.values_mut() {
                let Some(id) = peer.transport else {
                    continue;
                };
                for json in self.relay.take_inbox(id) {
                    peer.session.handle_message(&json, &mut peer.board);
                    moved += 1;
                }
            }
            if moved == 0 {
                return;
            }
        }
        log::warn!("Relay still busy after {MAX_FLUSH_ROUNDS} rounds");
    }

    /// Final render frame of every peer, by name.
    pub fn frames(&self) -> BTreeMap<String, RenderFrame> {
        self.peers
            .iter()
            .map(|(name, peer)| (name.clone(), peer.board.frame()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_PEERS: &str = r#"{
        "room": "demo",
        "peers": ["alice", "bob"],
        "steps": [
            { "peer": "alice", "action": { "type": "tool", "tool": "rectangle" } },
            { "peer": "alice", "action": { "type": "pointer", "event": { "kind": "down", "position": { "x": 10.0, "y": 10.0 } } } },
            { "peer": "alice", "action": { "type": "pointer", "event": { "kind": "up", "position": { "x": 10.0, "y": 10.0 } } } },
            { "action": { "type": "flush" } },
            { "peer": "bob", "action": { "type": "pointer", "event": { "kind": "move", "position": { "x": 300.0, "y": 40.0 } } } }
        ]
    }"#;

    fn run(json: &str) -> Simulation {
        let script = Script::from_json(json).expect("Failed to parse script");
        let mut sim = Simulation::new(&script, &BoardConfig::default());
        sim.run(&script.steps).expect("Failed to run script");
        sim
    }

    #[test]
    fn test_peers_converge() {
        let sim = run(TWO_PEERS);
        let frames = sim.frames();
        let alice = &frames["alice"];
        let bob = &frames["bob"];

        assert_eq!(alice.layers.len(), 1);
        assert_eq!(alice.layers[0].layer, bob.layers[0].layer);
        assert_eq!(alice.selection.len(), 1);
        // Bob sees Alice's selection highlighted and Alice sees Bob's cursor.
        assert!(bob.layers[0].highlight.is_some());
        assert_eq!(alice.cursors.len(), 1);
        assert_eq!(alice.cursors[0].position, kurbo::Point::new(300.0, 40.0));
    }

    #[test]
    fn test_unknown_peer_is_an_error() {
        let script = Script::from_json(
            r#"{ "peers": ["a"], "steps": [ { "peer": "z", "action": { "type": "flush" } }, { "peer": "z", "action": { "type": "disconnect" } } ] }"#,
        )
        .expect("Failed to parse script");
        let mut sim = Simulation::new(&script, &BoardConfig::default());
        let err = sim.run(&script.steps).unwrap_err();
        assert!(matches!(err, ScriptError::UnknownPeer { step: 1, .. }));
    }

    #[test]
    fn test_reconnect_resyncs() {
        let sim = run(
            r#"{
            "peers": ["alice", "bob"],
            "steps": [
                { "peer": "bob", "action": { "type": "disconnect" } },
                { "peer": "alice", "action": { "type": "tool", "tool": "note" } },
                { "peer": "alice", "action": { "type": "pointer", "event": { "kind": "up", "position": { "x": 0.0, "y": 0.0 } } } },
                { "action": { "type": "flush" } },
                { "peer": "bob", "action": { "type": "reconnect" } }
            ]
        }"#,
        );
        let bob = sim.board("bob").expect("Missing bob");
        assert_eq!(bob.store().len(), 1);
        assert_eq!(bob.presence().others().len(), 1);
    }

    fn act(sim: &mut Simulation, peer: &str, action: Action) {
        let step = Step {
            peer: Some(peer.to_string()),
            action,
        };
        sim.step(0, &step).expect("Failed to run step");
    }

    fn place(sim: &mut Simulation, peer: &str, tool: Tool, x: f64, y: f64) {
        act(sim, peer, Action::Tool { tool });
        act(
            sim,
            peer,
            Action::Pointer {
                event: PointerEvent::Up {
                    position: kurbo::Point::new(x, y),
                },
            },
        );
    }

    fn click(sim: &mut Simulation, peer: &str, target: &str) {
        let position = kurbo::Point::new(5.0, 5.0);
        act(
            sim,
            peer,
            Action::Pointer {
                event: PointerEvent::Down {
                    position,
                    target: Some(target.to_string()),
                    modifiers: Modifiers::NONE,
                },
            },
        );
        act(sim, peer, Action::Pointer { event: PointerEvent::Up { position } });
    }

    #[test]
    fn test_late_joiner_converges_after_concurrent_reorders() {
        let script = Script::from_json(r#"{ "peers": ["alice", "bob", "carol"] }"#).expect("Failed to parse script");
        let mut sim = Simulation::new(&script, &BoardConfig::default());
        act(&mut sim, "carol", Action::Disconnect);
        sim.flush();

        place(&mut sim, "alice", Tool::Rectangle, 0.0, 0.0);
        place(&mut sim, "bob", Tool::Rectangle, 100.0, 100.0);
        sim.flush();

        let bottom = sim.board("alice").expect("Missing alice").store().layer_ids()[0].clone();
        click(&mut sim, "alice", &bottom);
        act(&mut sim, "alice", Action::Command { command: Command::BringToFront });
        click(&mut sim, "bob", &bottom);
        act(&mut sim, "bob", Action::Command { command: Command::SendToBack });
        act(&mut sim, "bob", Action::Command { command: Command::BringToFront });
        sim.flush();

        act(&mut sim, "carol", Action::Reconnect);
        sim.flush();
        place(&mut sim, "carol", Tool::Note, 50.0, 50.0);
        sim.flush();

        let carol = sim.board("carol").expect("Missing carol").store().layer_ids();
        assert_eq!(carol.len(), 3);
        for name in ["alice", "bob"] {
            let ids = sim.board(name).expect("Missing peer").store().layer_ids();
            assert_eq!(ids, carol, "{name} diverged");
        }
    }
}
