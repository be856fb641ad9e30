//! Interaction state machine for one participant's view of a board.
//!
//! A [`Board`] owns the local replica of the layer store, the presence
//! channel, the undo history and the camera. Pointer events and commands
//! drive [`CanvasState`] transitions; every shared write goes through
//! [`Board::commit`], and [`Board::frame`] exposes what to draw.

use crate::camera::{Camera, to_canvas_point};
use crate::config::BoardConfig;
use crate::history::{History, HistoryChange, RecordHistory};
use crate::input::{Command, Modifiers, PointerEvent, Tool, command_for_key};
use crate::layer::{Bounds, Layer, LayerId, LayerKind, Rgb};
use crate::presence::{ConnectionId, PresenceChannel};
use crate::selection::{Handle, ResizeHandle, get_handles, resize_bounds};
use crate::store::{Change, LayerStore, Mutation};
use kurbo::{Point, Vec2};
use serde::Serialize;

/// Current interaction mode. Exactly one is active at a time.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CanvasState {
    #[default]
    None,
    /// An insert tool is armed; the next pointer-up places a layer.
    Inserting { kind: LayerKind },
    /// Dragging the selection. `current` is the last pointer position.
    Translating { current: Point },
    /// Dragging a resize handle of the first selected layer.
    Resizing { initial_bounds: Bounds, handle: ResizeHandle },
    /// Pencil tool; `draft` holds the stroke while the pointer is down.
    Pencil {
        #[serde(skip_serializing_if = "Option::is_none")]
        draft: Option<Vec<Point>>,
    },
    /// Pressed on empty canvas. `current` is set once the pointer moved far
    /// enough to draw a marquee.
    SelectionNet { origin: Point, current: Option<Point> },
}

impl CanvasState {
    /// Whether a pointer gesture is in progress.
    pub fn is_gesture(&self) -> bool {
        matches!(
            self,
            CanvasState::Translating { .. }
                | CanvasState::Resizing { .. }
                | CanvasState::SelectionNet { .. }
                | CanvasState::Pencil { draft: Some(_) }
        )
    }
}

/// A layer prepared for drawing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerView {
    #[serde(flatten)]
    pub layer: Layer,
    /// Color of the other connection selecting this layer, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight: Option<Rgb>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CursorView {
    pub connection_id: ConnectionId,
    pub position: Point,
    pub color: Rgb,
}

/// An in-progress pencil stroke. `connection_id` is `None` for the local one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DraftView {
    pub connection_id: Option<ConnectionId>,
    pub points: Vec<Point>,
    pub color: Rgb,
}

/// Everything a renderer needs for one frame, in canvas coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderFrame {
    pub camera: Camera,
    pub mode: CanvasState,
    pub layers: Vec<LayerView>,
    pub selection: Vec<LayerId>,
    pub selection_bounds: Option<Bounds>,
    pub handles: Vec<Handle>,
    pub cursors: Vec<CursorView>,
    pub pencil_drafts: Vec<DraftView>,
    pub selection_net: Option<Bounds>,
    pub can_undo: bool,
    pub can_redo: bool,
}

/// One participant's board.
pub struct Board {
    config: BoardConfig,
    store: LayerStore,
    presence: PresenceChannel,
    history: History,
    camera: Camera,
    state: CanvasState,
    last_used_color: Rgb,
    /// Client position of the canvas element's top-left corner.
    container_origin: Point,
}

impl Board {
    pub fn new(config: BoardConfig) -> Self {
        Self {
            store: LayerStore::new(&config),
            presence: PresenceChannel::new(),
            history: History::new(config.max_undo_steps),
            camera: Camera::new(),
            state: CanvasState::None,
            last_used_color: config.initial_fill,
            container_origin: Point::ZERO,
            config,
        }
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn store(&self) -> &LayerStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut LayerStore {
        &mut self.store
    }

    pub fn presence(&self) -> &PresenceChannel {
        &self.presence
    }

    pub fn presence_mut(&mut self) -> &mut PresenceChannel {
        &mut self.presence
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn state(&self) -> &CanvasState {
        &self.state
    }

    pub fn last_used_color(&self) -> Rgb {
        self.last_used_color
    }

    pub fn selection(&self) -> &[LayerId] {
        self.presence.selection()
    }

    pub fn set_container_origin(&mut self, origin: Point) {
        self.container_origin = origin;
    }

    fn canvas_point(&self, client: Point) -> Point {
        to_canvas_point(client, self.container_origin, &self.camera)
    }

    // --- Commits ---

    /// Apply mutations to the shared store as one transaction and record
    /// the resulting changes. Store failures are logged and yield no changes.
    pub fn commit(&mut self, mutations: &[Mutation], record: RecordHistory) -> Vec<Change> {
        if mutations.is_empty() {
            return Vec::new();
        }
        match self.store.apply(mutations) {
            Ok(changes) => {
                self.history.record(changes.iter().cloned(), record);
                changes
            }
            Err(err) => {
                log::error!("Failed to commit {} mutation(s): {err}", mutations.len());
                Vec::new()
            }
        }
    }

    /// Replace the local selection, optionally as an undo step.
    fn select(&mut self, selection: Vec<LayerId>, record: RecordHistory) {
        let before = self.presence.selection().to_vec();
        if before == selection {
            return;
        }
        self.presence.set_selection(selection.clone());
        self.history.record(
            [HistoryChange::Selection {
                before,
                after: selection,
            }],
            record,
        );
    }

    /// Drop selected ids whose layers no longer exist, e.g. after a merge.
    pub fn prune_selection(&mut self) {
        let live: Vec<LayerId> = self
            .presence
            .selection()
            .iter()
            .filter(|id| self.store.contains(id))
            .cloned()
            .collect();
        if live.len() != self.presence.selection().len() {
            self.presence.set_selection(live);
        }
    }

    // --- Tools and commands ---

    pub fn select_tool(&mut self, tool: Tool) {
        let next = match tool {
            Tool::Select => CanvasState::None,
            Tool::Pencil => CanvasState::Pencil { draft: None },
            _ => match tool.layer_kind() {
                // Choosing the armed insert tool again disarms it.
                Some(kind) if self.state == (CanvasState::Inserting { kind }) => CanvasState::None,
                Some(kind) => CanvasState::Inserting { kind },
                None => CanvasState::None,
            },
        };
        self.end_gesture();
        self.state = next;
    }

    pub fn command(&mut self, command: Command) {
        match command {
            Command::SelectTool { tool } => self.select_tool(tool),
            Command::Undo => {
                self.undo();
            }
            Command::Redo => {
                self.redo();
            }
            Command::Cancel => {
                self.end_gesture();
                self.state = CanvasState::None;
            }
            Command::DeleteSelection => self.delete_selection(),
            Command::SetFill { color } => self.set_fill(color),
            Command::BringToFront => self.bring_to_front(),
            Command::SendToBack => self.send_to_back(),
        }
    }

    /// Handle a key press. Returns true if it was bound to a command.
    pub fn key_down(&mut self, key: &str, modifiers: Modifiers) -> bool {
        match command_for_key(key, modifiers) {
            Some(command) => {
                self.command(command);
                true
            }
            None => false,
        }
    }

    fn delete_selection(&mut self) {
        if self.state.is_gesture() {
            log::debug!("Ignoring delete during a gesture");
            return;
        }
        let mutations: Vec<Mutation> = self
            .selection()
            .iter()
            .map(|id| Mutation::Delete { id: id.clone() })
            .collect();
        if mutations.is_empty() {
            return;
        }
        self.history.pause();
        self.commit(&mutations, RecordHistory::Yes);
        self.select(Vec::new(), RecordHistory::Yes);
        self.history.resume();
    }

    /// Use `color` for new layers and repaint the selection with it.
    fn set_fill(&mut self, color: Rgb) {
        self.last_used_color = color;
        let mutations: Vec<Mutation> = self
            .selection()
            .iter()
            .map(|id| Mutation::UpdateFill {
                id: id.clone(),
                fill: color,
            })
            .collect();
        self.commit(&mutations, RecordHistory::Yes);
    }

    /// Selected ids in z-order, back to front.
    fn selection_in_z_order(&self) -> Vec<LayerId> {
        self.store
            .layer_ids()
            .into_iter()
            .filter(|id| self.presence.is_selected(id))
            .collect()
    }

    fn bring_to_front(&mut self) {
        let selected = self.selection_in_z_order();
        let top = self.store.layer_ids().len().saturating_sub(1);
        let mutations: Vec<Mutation> = selected
            .into_iter()
            .rev()
            .enumerate()
            .map(|(i, id)| Mutation::Reorder {
                id,
                index: top.saturating_sub(i),
            })
            .collect();
        self.commit(&mutations, RecordHistory::Yes);
    }

    fn send_to_back(&mut self) {
        let mutations: Vec<Mutation> = self
            .selection_in_z_order()
            .into_iter()
            .enumerate()
            .map(|(index, id)| Mutation::Reorder { id, index })
            .collect();
        self.commit(&mutations, RecordHistory::Yes);
    }

    // --- History ---

    pub fn undo(&mut self) -> bool {
        self.history.undo(&mut self.store, &mut self.presence)
    }

    pub fn redo(&mut self) -> bool {
        self.history.redo(&mut self.store, &mut self.presence)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // --- Pointer input ---

    pub fn handle_pointer(&mut self, event: PointerEvent) {
        match event {
            PointerEvent::Down {
                position,
                target,
                modifiers,
            } => self.pointer_down(position, target.as_deref(), modifiers),
            PointerEvent::Move { position } => self.pointer_move(position),
            PointerEvent::Up { position } => self.pointer_up(position),
            PointerEvent::Leave => self.pointer_leave(),
            PointerEvent::Wheel { delta } => self.wheel(delta),
        }
    }

    /// Pointer pressed at a client position, optionally over a layer.
    pub fn pointer_down(&mut self, position: Point, target: Option<&str>, modifiers: Modifiers) {
        let point = self.canvas_point(position);
        match &self.state {
            CanvasState::Inserting { .. } => {}
            CanvasState::Pencil { draft: None } => {
                self.state = CanvasState::Pencil {
                    draft: Some(vec![point]),
                };
                self.presence
                    .set_pencil_draft(Some(vec![point]), Some(self.last_used_color));
            }
            CanvasState::None => match target {
                Some(id) if self.store.contains(id) => self.layer_pointer_down(id, point, modifiers),
                Some(id) => log::debug!("Ignoring pointer-down on missing layer {id}"),
                None => {
                    self.state = CanvasState::SelectionNet {
                        origin: point,
                        current: None,
                    };
                }
            },
            state => log::debug!("Ignoring pointer-down during {state:?}"),
        }
    }

    fn layer_pointer_down(&mut self, id: &str, point: Point, modifiers: Modifiers) {
        self.history.pause();
        if !self.presence.is_selected(id) {
            let selection = if modifiers.shift {
                let mut selection = self.selection().to_vec();
                selection.push(id.to_string());
                selection
            } else {
                vec![id.to_string()]
            };
            self.select(selection, RecordHistory::Yes);
        }
        self.state = CanvasState::Translating { current: point };
    }

    /// Pointer pressed on one of the selection's resize handles.
    pub fn resize_handle_down(&mut self, handle: ResizeHandle) {
        if self.state.is_gesture() {
            log::debug!("Ignoring resize handle during {:?}", self.state);
            return;
        }
        let Some(initial_bounds) = self
            .selection()
            .first()
            .and_then(|id| self.store.layer(id))
            .map(|layer| layer.bounds)
        else {
            log::debug!("Ignoring resize handle with empty selection");
            return;
        };
        self.history.pause();
        self.state = CanvasState::Resizing { initial_bounds, handle };
    }

    pub fn pointer_move(&mut self, position: Point) {
        let point = self.canvas_point(position);
        self.presence.set_cursor(Some(point));

        match &mut self.state {
            CanvasState::Translating { current } => {
                let delta = point - *current;
                *current = point;
                self.translate_selection(delta);
            }
            CanvasState::Resizing { initial_bounds, handle } => {
                let bounds = resize_bounds(initial_bounds, *handle, point);
                if let Some(id) = self.presence.selection().first().cloned() {
                    self.commit(&[Mutation::UpdateBounds { id, bounds }], RecordHistory::Yes);
                }
            }
            CanvasState::Pencil { draft: Some(points) } => {
                let far_enough = points
                    .last()
                    .is_none_or(|last| last.distance(point) >= self.config.pencil_min_distance);
                if far_enough {
                    points.push(point);
                    let draft = points.clone();
                    self.presence
                        .set_pencil_draft(Some(draft), Some(self.last_used_color));
                }
            }
            CanvasState::SelectionNet { origin, current } => {
                let origin = *origin;
                if current.is_none() && origin.distance(point) < self.config.selection_net_threshold {
                    return;
                }
                *current = Some(point);
                self.update_net_selection(origin, point);
            }
            CanvasState::None | CanvasState::Inserting { .. } | CanvasState::Pencil { draft: None } => {}
        }
    }

    fn translate_selection(&mut self, delta: Vec2) {
        if delta == Vec2::ZERO {
            return;
        }
        let mutations: Vec<Mutation> = self
            .selection()
            .iter()
            .filter_map(|id| self.store.layer(id))
            .map(|layer| Mutation::UpdateBounds {
                bounds: layer.bounds.translate(delta),
                id: layer.id,
            })
            .collect();
        self.commit(&mutations, RecordHistory::Yes);
    }

    /// Select every layer intersecting the marquee. Presence only.
    fn update_net_selection(&mut self, origin: Point, current: Point) {
        let Some(net) = Bounds::from_points(&[origin, current]) else {
            return;
        };
        let selection = self
            .store
            .layers()
            .into_iter()
            .filter(|layer| layer.bounds.intersects(&net))
            .map(|layer| layer.id)
            .collect();
        self.presence.set_selection(selection);
    }

    pub fn pointer_up(&mut self, position: Point) {
        let point = self.canvas_point(position);
        match std::mem::take(&mut self.state) {
            CanvasState::Inserting { kind } => {
                self.insert_layer(kind, point);
            }
            CanvasState::Pencil { draft } => {
                if let Some(points) = draft {
                    self.finish_stroke(&points);
                }
                self.state = CanvasState::Pencil { draft: None };
            }
            CanvasState::SelectionNet { current: None, .. } => {
                self.select(Vec::new(), RecordHistory::Yes);
            }
            CanvasState::SelectionNet { current: Some(_), .. } => {}
            CanvasState::Translating { .. } | CanvasState::Resizing { .. } => {
                self.history.resume();
            }
            CanvasState::None => {}
        }
    }

    /// Pointer left the canvas: hide the cursor and end any drag.
    pub fn pointer_leave(&mut self) {
        self.presence.set_cursor(None);
        self.end_gesture();
    }

    pub fn wheel(&mut self, delta: Vec2) {
        self.camera.pan(delta);
    }

    /// Terminate the active gesture, keeping armed tools.
    fn end_gesture(&mut self) {
        match std::mem::take(&mut self.state) {
            CanvasState::Translating { .. } | CanvasState::Resizing { .. } => {
                self.history.resume();
            }
            CanvasState::Pencil { draft } => {
                if draft.is_some() {
                    self.presence.set_pencil_draft(None, None);
                }
                self.state = CanvasState::Pencil { draft: None };
            }
            CanvasState::SelectionNet { .. } => {}
            state @ (CanvasState::None | CanvasState::Inserting { .. }) => self.state = state,
        }
    }

    /// Insert a layer and select it, as one undo step.
    fn insert_layer(&mut self, kind: LayerKind, position: Point) {
        let layer = Layer::new(kind, position, self.config.default_layer_size, self.last_used_color);
        self.insert_and_select(layer);
    }

    fn finish_stroke(&mut self, points: &[Point]) {
        self.presence.set_pencil_draft(None, None);
        if points.len() < self.config.min_path_points {
            log::debug!("Discarding stroke with {} point(s)", points.len());
            return;
        }
        if let Some(layer) = Layer::path(points, self.last_used_color) {
            self.insert_and_select(layer);
        }
    }

    fn insert_and_select(&mut self, layer: Layer) {
        self.history.pause();
        let inserted = self
            .commit(&[Mutation::Insert { layer }], RecordHistory::Yes)
            .into_iter()
            .find_map(|change| match change {
                Change::Inserted { layer, .. } => Some(layer.id),
                _ => None,
            });
        if let Some(id) = inserted {
            self.select(vec![id], RecordHistory::Yes);
        }
        self.history.resume();
    }

    // --- Rendering ---

    /// Bounds enclosing every selected layer.
    pub fn selection_bounds(&self) -> Option<Bounds> {
        self.selection()
            .iter()
            .filter_map(|id| self.store.layer(id))
            .map(|layer| layer.bounds)
            .reduce(|acc, bounds| acc.union(&bounds))
    }

    pub fn frame(&self) -> RenderFrame {
        let highlights = self.presence.selection_colors();
        let layers = self
            .store
            .layers()
            .into_iter()
            .map(|layer| LayerView {
                highlight: highlights.get(&layer.id).copied(),
                layer,
            })
            .collect();

        let selection: Vec<LayerId> = self
            .selection()
            .iter()
            .filter(|id| self.store.contains(id))
            .cloned()
            .collect();
        let selection_bounds = self.selection_bounds();
        // Handles only make sense for a single layer.
        let handles = match (selection.len(), selection_bounds) {
            (1, Some(bounds)) => get_handles(&bounds),
            _ => Vec::new(),
        };

        let others = self.presence.others();
        let cursors = others
            .iter()
            .filter_map(|peer| {
                peer.presence.cursor.map(|position| CursorView {
                    connection_id: peer.connection_id,
                    position,
                    color: peer.color,
                })
            })
            .collect();

        let mut pencil_drafts: Vec<DraftView> = others
            .iter()
            .filter_map(|peer| {
                let points = peer.presence.pencil_draft.clone()?;
                Some(DraftView {
                    connection_id: Some(peer.connection_id),
                    points,
                    color: peer.presence.pencil_color.unwrap_or(peer.color),
                })
            })
            .collect();
        if let CanvasState::Pencil { draft: Some(points) } = &self.state {
            pencil_drafts.push(DraftView {
                connection_id: None,
                points: points.clone(),
                color: self.last_used_color,
            });
        }

        let selection_net = match &self.state {
            CanvasState::SelectionNet {
                origin,
                current: Some(current),
            } => Bounds::from_points(&[*origin, *current]),
            _ => None,
        };

        RenderFrame {
            camera: self.camera,
            mode: self.state.clone(),
            layers,
            selection,
            selection_bounds,
            handles,
            cursors,
            pencil_drafts,
            selection_net,
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
        }
    }
}
