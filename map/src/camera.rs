//! Coordinate spaces and the pan/zoom camera.
//!
//! Three spaces are in play:
//! - **screen**: device pixels on the render surface, origin top-left;
//! - **world**: the pan/zoom-independent plane, units are pixels at zoom 1;
//! - **cell**: world divided by the grid cell size.
//!
//! `world = (screen - surface_center) / zoom + camera` and its exact inverse.

#[cfg(test)]
#[path = "camera_test.rs"]
mod tests;

use serde::{Deserialize, Serialize};

/// A point in screen, world, or cell space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// The render surface: device-pixel dimensions plus the device pixel ratio
/// used to convert host (CSS) pixel coordinates into device pixels.
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub dpr: f64,
}

impl Viewport {
    #[must_use]
    pub fn new(width: f64, height: f64, dpr: f64) -> Self {
        Self { width, height, dpr }
    }

    /// Surface center in device pixels, the fixed point of the camera
    /// transform.
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width: 0.0, height: 0.0, dpr: 1.0 }
    }
}

/// Camera state: `x`/`y` is the world point shown at the surface center,
/// `zoom` the world→screen scale factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, zoom: 1.0 }
    }
}

impl Camera {
    /// Convert a screen-space point (device pixels) to world coordinates.
    #[must_use]
    pub fn screen_to_world(&self, vp: &Viewport, screen: Point) -> Point {
        let c = vp.center();
        Point {
            x: (screen.x - c.x) / self.zoom + self.x,
            y: (screen.y - c.y) / self.zoom + self.y,
        }
    }

    /// Convert a world-space point to screen coordinates (device pixels).
    #[must_use]
    pub fn world_to_screen(&self, vp: &Viewport, world: Point) -> Point {
        let c = vp.center();
        Point {
            x: (world.x - self.x) * self.zoom + c.x,
            y: (world.y - self.y) * self.zoom + c.y,
        }
    }

    /// Pan by a pointer movement given in host (CSS) pixels. The movement is
    /// scaled by the device pixel ratio, divided by zoom, and subtracted so
    /// the world follows the pointer.
    pub fn pan_by(&mut self, vp: &Viewport, movement_x: f64, movement_y: f64) {
        self.x -= movement_x * vp.dpr / self.zoom;
        self.y -= movement_y * vp.dpr / self.zoom;
    }

    /// Change zoom while keeping `anchor_screen` fixed: the world point under
    /// the anchor before the change stays under it after.
    pub fn zoom_to(&mut self, vp: &Viewport, new_zoom: f64, anchor_screen: Point, min: f64, max: f64) {
        let next = new_zoom.clamp(min, max);
        let before = self.screen_to_world(vp, anchor_screen);
        self.zoom = next;
        let after = self.screen_to_world(vp, anchor_screen);
        self.x += before.x - after.x;
        self.y += before.y - after.y;
    }

    /// Visible world bounds as `(left, top, right, bottom)`.
    #[must_use]
    pub fn visible_world_bounds(&self, vp: &Viewport) -> (f64, f64, f64, f64) {
        let half_w = (vp.width / 2.0) / self.zoom;
        let half_h = (vp.height / 2.0) / self.zoom;
        (self.x - half_w, self.y - half_h, self.x + half_w, self.y + half_h)
    }
}

/// World → cell space.
#[must_use]
pub fn world_to_cell(world: Point, cell_size: f64) -> Point {
    Point::new(world.x / cell_size, world.y / cell_size)
}

/// Cell → world space.
#[must_use]
pub fn cell_to_world(cell: Point, cell_size: f64) -> Point {
    Point::new(cell.x * cell_size, cell.y * cell_size)
}
