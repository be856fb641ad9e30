//! Layer definitions for the shared canvas.

use kurbo::{Point, Rect, Vec2};
use peniko::Color;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a layer.
///
/// Generated client-side when the layer is created and never rewritten.
pub type LayerId = String;

/// Generate a fresh, collision-resistant layer id.
pub fn new_layer_id() -> LayerId {
    Uuid::new_v4().to_string()
}

/// The kind of object a layer renders as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Rectangle,
    Ellipse,
    Text,
    Note,
    Path,
}

impl LayerKind {
    /// Name stored in the CRDT document.
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerKind::Rectangle => "rectangle",
            LayerKind::Ellipse => "ellipse",
            LayerKind::Text => "text",
            LayerKind::Note => "note",
            LayerKind::Path => "path",
        }
    }

    /// Parse a stored kind name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "rectangle" => Some(LayerKind::Rectangle),
            "ellipse" => Some(LayerKind::Ellipse),
            "text" => Some(LayerKind::Text),
            "note" => Some(LayerKind::Note),
            "path" => Some(LayerKind::Path),
            _ => None,
        }
    }

    /// Whether the insert tool can place this kind with a single click.
    pub fn is_insertable(&self) -> bool {
        !matches!(self, LayerKind::Path)
    }
}

/// RGB fill color (8 bits per channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const fn black() -> Self {
        Self::new(0, 0, 0)
    }

    /// CSS-style hex string, e.g. `#dc2626`.
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl From<Color> for Rgb {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self::new(rgba.r, rgba.g, rgba.b)
    }
}

impl From<Rgb> for Color {
    fn from(color: Rgb) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, 255)
    }
}

/// Axis-aligned bounds in canvas space (`XYWH`).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Top-left corner.
    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn to_rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.width, self.y + self.height)
    }

    /// Build bounds from any (possibly unnormalized) rectangle.
    pub fn from_rect(rect: Rect) -> Self {
        let rect = rect.abs();
        Self::new(rect.x0, rect.y0, rect.width(), rect.height())
    }

    /// Smallest bounds enclosing all points, or `None` for an empty slice.
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let rect = points
            .iter()
            .skip(1)
            .fold(Rect::from_points(*first, *first), |rect, p| {
                rect.union_pt(*p)
            });
        Some(Self::from_rect(rect))
    }

    pub fn translate(&self, delta: Vec2) -> Self {
        Self::new(self.x + delta.x, self.y + delta.y, self.width, self.height)
    }

    /// Union of two bounds.
    pub fn union(&self, other: &Bounds) -> Self {
        Self::from_rect(self.to_rect().union(other.to_rect()))
    }

    /// Whether the two bounds overlap (touching edges count).
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.x <= other.x + other.width
            && other.x <= self.x + self.width
            && self.y <= other.y + other.height
            && other.y <= self.y + self.height
    }

    /// Approximate equality for float comparisons.
    pub fn approx_eq(&self, other: &Bounds, epsilon: f64) -> bool {
        (self.x - other.x).abs() < epsilon
            && (self.y - other.y).abs() < epsilon
            && (self.width - other.width).abs() < epsilon
            && (self.height - other.height).abs() < epsilon
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }
}

/// A single object on the shared canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub kind: LayerKind,
    pub bounds: Bounds,
    pub fill: Rgb,
    /// Path points relative to the bounds origin. Empty for non-path layers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub points: Vec<Point>,
}

impl Layer {
    /// Create a new layer with a fresh id.
    pub fn new(kind: LayerKind, position: Point, size: f64, fill: Rgb) -> Self {
        Self {
            id: new_layer_id(),
            kind,
            bounds: Bounds::new(position.x, position.y, size, size),
            fill,
            points: Vec::new(),
        }
    }

    /// Create a path layer from absolute canvas points.
    ///
    /// Points are stored relative to the top-left of their bounds so that
    /// moving the layer only touches `x` and `y`.
    pub fn path(points: &[Point], fill: Rgb) -> Option<Self> {
        let bounds = Bounds::from_points(points)?;
        let origin = bounds.origin();
        Some(Self {
            id: new_layer_id(),
            kind: LayerKind::Path,
            bounds,
            fill,
            points: points.iter().map(|p| Point::new(p.x - origin.x, p.y - origin.y)).collect(),
        })
    }

    /// Path points in canvas coordinates.
    pub fn absolute_points(&self) -> Vec<Point> {
        let offset = self.bounds.origin().to_vec2();
        self.points.iter().map(|p| *p + offset).collect()
    }
}
