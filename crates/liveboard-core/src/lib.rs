//! Liveboard Core Library
//!
//! Interaction and collaborative mutation engine for a shared infinite
//! canvas: a Loro-backed layer store, per-connection presence, undo history
//! and the pointer state machine that ties them together.

pub mod board;
pub mod camera;
pub mod collaboration;
pub mod config;
pub mod history;
pub mod input;
pub mod layer;
pub mod presence;
pub mod selection;
pub mod store;
pub mod sync;

pub use board::{Board, CanvasState, RenderFrame};
pub use camera::{Camera, to_canvas_point};
pub use collaboration::CollaborationSession;
pub use config::{BoardConfig, ConfigError};
pub use history::{History, RecordHistory};
pub use input::{Command, Modifiers, PointerEvent, Tool};
pub use layer::{Bounds, Layer, LayerId, LayerKind, Rgb};
pub use presence::{ConnectionId, Presence, PresenceChannel, connection_color, selection_colors};
pub use selection::{ResizeHandle, resize_bounds};
pub use store::{LayerStore, StoreError};
pub use sync::{ClientMessage, ServerMessage, SyncError, SyncEvent};
