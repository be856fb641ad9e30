//! Camera module for the pan transform.

use kurbo::{Affine, Point, Vec2};
use serde::{Deserialize, Serialize};

/// Camera holds the local pan offset of the canvas.
///
/// The offset is purely a view transform: it is never shared with peers and
/// never stored in the document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    /// Current translation offset (pan), in screen pixels.
    pub offset: Vec2,
}

impl Camera {
    /// Create a new camera at the origin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transform from canvas coordinates to screen coordinates.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.offset)
    }

    /// Convert a screen point to canvas coordinates.
    pub fn screen_to_canvas(&self, screen_point: Point) -> Point {
        screen_point - self.offset
    }

    /// Convert a canvas point to screen coordinates.
    pub fn canvas_to_screen(&self, canvas_point: Point) -> Point {
        canvas_point + self.offset
    }

    /// Apply a wheel delta. Scrolling right/down moves the content left/up.
    pub fn pan(&mut self, wheel_delta: Vec2) {
        self.offset -= wheel_delta;
    }

    pub fn reset(&mut self) {
        self.offset = Vec2::ZERO;
    }
}

/// Convert raw client coordinates into a canvas-space point.
///
/// `container_origin` is the client position of the canvas element's
/// top-left corner.
pub fn to_canvas_point(client: Point, container_origin: Point, camera: &Camera) -> Point {
    debug_assert!(client.is_finite(), "non-finite pointer position");
    let local = client - container_origin.to_vec2();
    camera.screen_to_canvas(local)
}
