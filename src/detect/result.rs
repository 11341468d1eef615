use serde::{Deserialize, Serialize};

use crate::frame::Rect;
use crate::imaging::Contour;

/// One classified contour in one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub shape: String,
    pub cx: f32,
    pub cy: f32,
    pub area: f32,
    /// Degrees. Contours carry no orientation, so per-frame detections report 0.
    pub angle: f32,
    pub width: f32,
    pub height: f32,
}

impl Detection {
    /// Build from a classified contour. `None` for degenerate (zero-area) contours.
    pub fn from_contour(shape: &str, contour: &Contour) -> Option<Self> {
        let moments = contour.moments();
        let (cx, cy) = moments.centroid()?;
        let rect = contour.bounding_rect();
        Some(Self {
            shape: shape.to_string(),
            cx: cx as f32,
            cy: cy as f32,
            area: moments.m00 as f32,
            angle: 0.0,
            width: rect.w as f32,
            height: rect.h as f32,
        })
    }

    pub fn rect(&self) -> Rect {
        Rect::centered(self.cx, self.cy, self.width, self.height)
    }
}

/// A placed physical object, averaged over its cluster history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectEvent {
    pub id: String,
    pub shape: String,
    pub cx: i32,
    pub cy: i32,
    pub w: f32,
    pub h: f32,
    pub angle: f32,
    pub scale: f32,
}

/// Objects that appeared and disappeared since the previous diff.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectDiff {
    pub new: Vec<ObjectEvent>,
    pub removed: Vec<String>,
}

impl ObjectDiff {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.removed.is_empty()
    }
}
