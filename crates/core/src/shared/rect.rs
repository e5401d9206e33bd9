use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in pixel coordinates of the original image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a rect from corner coordinates, truncating toward zero.
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x: x1 as i32,
            y: y1 as i32,
            width: (x2 - x1) as i32,
            height: (y2 - y1) as i32,
        }
    }

    /// Multiplies every coordinate by `factor`, truncating toward zero.
    ///
    /// Used to map rects found on a downsampled image back to the source.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            x: (self.x as f64 * factor) as i32,
            y: (self.y as f64 * factor) as i32,
            width: (self.width as f64 * factor) as i32,
            height: (self.height as f64 * factor) as i32,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }
}
