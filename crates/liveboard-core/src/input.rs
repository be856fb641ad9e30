//! Input events, tools and commands consumed by the board.

use crate::layer::{LayerId, LayerKind, Rgb};
use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};

/// Modifier keys state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        shift: false,
        ctrl: false,
        alt: false,
        meta: false,
    };

    pub const SHIFT: Modifiers = Modifiers {
        shift: true,
        ctrl: false,
        alt: false,
        meta: false,
    };

    /// Ctrl on most platforms, Cmd on macOS.
    pub fn command(&self) -> bool {
        self.ctrl || self.meta
    }
}

/// Pointer event in client coordinates.
///
/// `target` is the layer under the pointer as reported by the host's hit
/// testing, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PointerEvent {
    Down {
        position: Point,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<LayerId>,
        #[serde(default)]
        modifiers: Modifiers,
    },
    Move {
        position: Point,
    },
    Up {
        position: Point,
    },
    Leave,
    Wheel {
        delta: Vec2,
    },
}

/// Available tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    #[default]
    Select,
    Rectangle,
    Ellipse,
    Text,
    Note,
    Pencil,
}

impl Tool {
    /// Layer kind placed by an insert tool.
    pub fn layer_kind(self) -> Option<LayerKind> {
        match self {
            Tool::Rectangle => Some(LayerKind::Rectangle),
            Tool::Ellipse => Some(LayerKind::Ellipse),
            Tool::Text => Some(LayerKind::Text),
            Tool::Note => Some(LayerKind::Note),
            Tool::Select | Tool::Pencil => None,
        }
    }
}

/// Board-level commands from toolbars, menus and shortcuts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    SelectTool { tool: Tool },
    Undo,
    Redo,
    /// Escape: abandon the current tool or gesture.
    Cancel,
    DeleteSelection,
    SetFill { color: Rgb },
    BringToFront,
    SendToBack,
}

/// A keyboard shortcut definition.
#[derive(Debug, Clone, Copy)]
pub struct Shortcut {
    pub key: &'static str,
    pub command_key: bool,
    pub shift: bool,
    pub command: Command,
}

impl Shortcut {
    const fn new(key: &'static str, command_key: bool, shift: bool, command: Command) -> Self {
        Self {
            key,
            command_key,
            shift,
            command,
        }
    }

    /// Format the shortcut for display (e.g., "Ctrl+Shift+Z").
    pub fn format(&self) -> String {
        let mut parts = Vec::new();
        if self.command_key {
            parts.push("Ctrl");
        }
        if self.shift {
            parts.push("Shift");
        }
        parts.push(self.key);
        parts.join("+")
    }
}

/// All keyboard shortcuts. Keys are matched case-insensitively.
pub const SHORTCUTS: &[Shortcut] = &[
    Shortcut::new("Z", true, false, Command::Undo),
    Shortcut::new("Z", true, true, Command::Redo),
    Shortcut::new("Y", true, false, Command::Redo),
    Shortcut::new("Escape", false, false, Command::Cancel),
    Shortcut::new("Delete", false, false, Command::DeleteSelection),
    Shortcut::new("Backspace", false, false, Command::DeleteSelection),
    Shortcut::new("]", true, false, Command::BringToFront),
    Shortcut::new("[", true, false, Command::SendToBack),
    Shortcut::new("V", false, false, Command::SelectTool { tool: Tool::Select }),
    Shortcut::new("R", false, false, Command::SelectTool { tool: Tool::Rectangle }),
    Shortcut::new("E", false, false, Command::SelectTool { tool: Tool::Ellipse }),
    Shortcut::new("T", false, false, Command::SelectTool { tool: Tool::Text }),
    Shortcut::new("N", false, false, Command::SelectTool { tool: Tool::Note }),
    Shortcut::new("P", false, false, Command::SelectTool { tool: Tool::Pencil }),
];

/// Look up the command bound to a key press.
pub fn command_for_key(key: &str, modifiers: Modifiers) -> Option<Command> {
    SHORTCUTS
        .iter()
        .find(|s| {
            s.key.eq_ignore_ascii_case(key) && s.command_key == modifiers.command() && s.shift == modifiers.shift
        })
        .map(|s| s.command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undo_redo_shortcuts() {
        let ctrl = Modifiers {
            ctrl: true,
            ..Modifiers::NONE
        };
        let cmd_shift = Modifiers {
            meta: true,
            shift: true,
            ..Modifiers::NONE
        };
        assert_eq!(command_for_key("z", ctrl), Some(Command::Undo));
        assert_eq!(command_for_key("Z", cmd_shift), Some(Command::Redo));
        assert_eq!(command_for_key("y", ctrl), Some(Command::Redo));
        assert_eq!(command_for_key("z", Modifiers::NONE), None);
    }

    #[test]
    fn test_tool_shortcuts() {
        assert_eq!(
            command_for_key("r", Modifiers::NONE),
            Some(Command::SelectTool { tool: Tool::Rectangle })
        );
        assert_eq!(command_for_key("escape", Modifiers::NONE), Some(Command::Cancel));
    }

    #[test]
    fn test_shortcut_format() {
        let redo = SHORTCUTS
            .iter()
            .find(|s| s.command == Command::Redo && s.shift)
            .expect("Missing redo shortcut");
        assert_eq!(redo.format(), "Ctrl+Shift+Z");
    }

    #[test]
    fn test_tool_layer_kind() {
        assert_eq!(Tool::Note.layer_kind(), Some(LayerKind::Note));
        assert_eq!(Tool::Pencil.layer_kind(), None);
        assert_eq!(Tool::Select.layer_kind(), None);
    }

    #[test]
    fn test_pointer_event_json() {
        let event: PointerEvent =
            serde_json::from_str(r#"{ "kind": "down", "position": { "x": 1.0, "y": 2.0 }, "target": "a" }"#)
                .expect("Failed to parse pointer event");
        assert_eq!(
            event,
            PointerEvent::Down {
                position: Point::new(1.0, 2.0),
                target: Some("a".to_string()),
                modifiers: Modifiers::NONE,
            }
        );
    }
}
