//! Selection handles and resize math.

use crate::layer::Bounds;
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Corner positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

/// Edge positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Edge {
    Top,
    Right,
    Bottom,
    Left,
}

/// A grab point on the selection box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResizeHandle {
    Corner(Corner),
    Edge(Edge),
}

impl ResizeHandle {
    /// All eight handles in drawing order.
    pub const ALL: [ResizeHandle; 8] = [
        ResizeHandle::Corner(Corner::TopLeft),
        ResizeHandle::Edge(Edge::Top),
        ResizeHandle::Corner(Corner::TopRight),
        ResizeHandle::Edge(Edge::Right),
        ResizeHandle::Corner(Corner::BottomRight),
        ResizeHandle::Edge(Edge::Bottom),
        ResizeHandle::Corner(Corner::BottomLeft),
        ResizeHandle::Edge(Edge::Left),
    ];

    fn moves_left(self) -> bool {
        matches!(
            self,
            ResizeHandle::Corner(Corner::TopLeft | Corner::BottomLeft) | ResizeHandle::Edge(Edge::Left)
        )
    }

    fn moves_right(self) -> bool {
        matches!(
            self,
            ResizeHandle::Corner(Corner::TopRight | Corner::BottomRight) | ResizeHandle::Edge(Edge::Right)
        )
    }

    fn moves_top(self) -> bool {
        matches!(
            self,
            ResizeHandle::Corner(Corner::TopLeft | Corner::TopRight) | ResizeHandle::Edge(Edge::Top)
        )
    }

    fn moves_bottom(self) -> bool {
        matches!(
            self,
            ResizeHandle::Corner(Corner::BottomLeft | Corner::BottomRight) | ResizeHandle::Edge(Edge::Bottom)
        )
    }

    /// The handle diagonally (or directly) across the box.
    pub fn opposite(self) -> Self {
        match self {
            ResizeHandle::Corner(Corner::TopLeft) => ResizeHandle::Corner(Corner::BottomRight),
            ResizeHandle::Corner(Corner::TopRight) => ResizeHandle::Corner(Corner::BottomLeft),
            ResizeHandle::Corner(Corner::BottomLeft) => ResizeHandle::Corner(Corner::TopRight),
            ResizeHandle::Corner(Corner::BottomRight) => ResizeHandle::Corner(Corner::TopLeft),
            ResizeHandle::Edge(Edge::Top) => ResizeHandle::Edge(Edge::Bottom),
            ResizeHandle::Edge(Edge::Bottom) => ResizeHandle::Edge(Edge::Top),
            ResizeHandle::Edge(Edge::Left) => ResizeHandle::Edge(Edge::Right),
            ResizeHandle::Edge(Edge::Right) => ResizeHandle::Edge(Edge::Left),
        }
    }

    /// Position of this handle on the given bounds.
    pub fn position(self, bounds: &Bounds) -> Point {
        let x = if self.moves_left() {
            bounds.x
        } else if self.moves_right() {
            bounds.x + bounds.width
        } else {
            bounds.x + bounds.width / 2.0
        };
        let y = if self.moves_top() {
            bounds.y
        } else if self.moves_bottom() {
            bounds.y + bounds.height
        } else {
            bounds.y + bounds.height / 2.0
        };
        Point::new(x, y)
    }
}

/// A selection handle with its position, for the rendering boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Handle {
    pub position: Point,
    pub kind: ResizeHandle,
}

/// Get the resize handles for a selection box.
pub fn get_handles(bounds: &Bounds) -> Vec<Handle> {
    ResizeHandle::ALL
        .iter()
        .map(|&kind| Handle {
            position: kind.position(bounds),
            kind,
        })
        .collect()
}

/// Recompute `initial` with the edges adjacent to `handle` dragged to `point`.
///
/// Edges not adjacent to the handle stay fixed and act as the anchor. When
/// the pointer crosses the anchor the roles swap, so width and height are
/// never negative.
pub fn resize_bounds(initial: &Bounds, handle: ResizeHandle, point: Point) -> Bounds {
    debug_assert!(initial.is_finite(), "non-finite bounds");
    debug_assert!(point.is_finite(), "non-finite resize point");

    let mut result = *initial;

    if handle.moves_left() {
        let anchor = initial.x + initial.width;
        result.x = point.x.min(anchor);
        result.width = (anchor - point.x).abs();
    }
    if handle.moves_right() {
        let anchor = initial.x;
        result.x = point.x.min(anchor);
        result.width = (point.x - anchor).abs();
    }
    if handle.moves_top() {
        let anchor = initial.y + initial.height;
        result.y = point.y.min(anchor);
        result.height = (anchor - point.y).abs();
    }
    if handle.moves_bottom() {
        let anchor = initial.y;
        result.y = point.y.min(anchor);
        result.height = (point.y - anchor).abs();
    }

    result
}
