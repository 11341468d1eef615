//! Brush-stroke pipeline for the drawing tools.
//!
//! Mapped frames are smoothed into a per-tool canvas (`StrokeAccumulator`), the canvas
//! is reduced to centerline points (`BrushStrokeDetector`), points already drawn are
//! dropped (`StrokeTracker`), new ones must persist for a few frames
//! (`StrokeConfirmTracker`) and strokes no longer seen expire (`StrokeLifeTimer`).

mod accumulator;
mod brush;
mod confirm;
mod lifetimer;
mod tracker;

pub use accumulator::StrokeAccumulator;
pub use brush::BrushStrokeDetector;
pub use confirm::StrokeConfirmTracker;
pub use lifetimer::StrokeLifeTimer;
pub use tracker::StrokeTracker;

use crate::Tool;

/// A stroke point before it is confirmed and given an id.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrokePoint {
    pub tool: Tool,
    pub x: i32,
    pub y: i32,
    pub size: f32,
}

/// Per-axis proximity test shared by the stroke trackers.
pub(crate) fn within(ax: i32, ay: i32, bx: i32, by: i32, proximity: i32) -> bool {
    (ax - bx).abs() <= proximity && (ay - by).abs() <= proximity
}
