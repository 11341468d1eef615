//! Depth Canvas
//!
//! This crate interprets depth-sensor frames from an interactive sand-table installation
//! and turns them into a small set of stable events: confirmed background scenes, placed
//! and removed physical objects, and drawn brush strokes.
//!
//! # Architecture
//!
//! One frame flows synchronously through every stage before the next one is read:
//!
//! 1. **Baseline**: the first frames are averaged into the empty-scene reference.
//! 2. **Depth**: the frame is compared with the baseline into a mapped delta image and contours.
//! 3. **Objects** (tool 4): contours are classified against templates, clustered over time
//!    and confirmed; the dominant background runs through a hysteresis tracker and its
//!    relief is baked into the baseline.
//! 4. **Strokes** (tools 1-3): the delta image is smoothed into a per-tool canvas, reduced
//!    to centerline points, deduplicated, confirmed and aged.
//!
//! # Module Structure
//!
//! - `frame`, `imaging`: buffers, geometry and image primitives
//! - `baseline`, `depth`, `templates`, `detect`, `stroke`: pipeline stages
//! - `pipeline`: the controller owning all per-session state
//! - `ingest`, `transport`: sensor sources and outbound event sinks
//! - Core types: Tool, StrokeEvent, FramePayload, LifecycleEvent

use rand::RngCore;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

pub mod baseline;
pub mod config;
pub mod depth;
pub mod detect;
mod error;
pub mod frame;
pub mod imaging;
pub mod ingest;
pub mod pipeline;
pub mod stroke;
pub mod templates;
pub mod transport;

pub use baseline::{BaselineCalculator, BaselineManager, PlacedZone, ZoneRemoval};
pub use config::{CanvasConfig, MatchMethod};
pub use depth::{DepthProcessor, DepthResult};
pub use detect::{
    BackgroundChange, BackgroundTracker, Cluster, ClusterTracker, Detection, ObjectDetector,
    ObjectDiff, ObjectEvent, ShapeClassifier,
};
pub use error::CanvasError;
pub use frame::{DepthFrame, HeightMap, MappedFrame, Rect, Roi};
pub use ingest::{DepthSource, FramePrep, MemorySource, ReplaySource, SyntheticSource};
pub use pipeline::{FrameReport, Pipeline};
pub use stroke::{
    BrushStrokeDetector, StrokeAccumulator, StrokeConfirmTracker, StrokeLifeTimer, StrokePoint,
    StrokeTracker,
};
pub use templates::{SizeClass, Template, TemplateManager};
pub use transport::{EventSink, MemorySink, MqttSink, NullSink};

/// Fresh globally unique id: 128 random bits as lowercase hex.
pub fn fresh_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// -------------------- Tools --------------------

/// Interaction tool selected on the installation: 1-3 draw strokes, 4 places objects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Tool(u8);

impl Tool {
    pub const STROKE_TOOLS: usize = 3;
    pub const OBJECTS: Tool = Tool(4);

    pub fn new(id: u8) -> Option<Self> {
        (1..=4).contains(&id).then_some(Self(id))
    }

    pub fn id(self) -> u8 {
        self.0
    }

    pub fn is_stroke(self) -> bool {
        self.channel().is_some()
    }

    /// Canvas channel of a stroke tool (tool 1 → 0).
    pub fn channel(self) -> Option<usize> {
        (1..=Self::STROKE_TOOLS as u8)
            .contains(&self.0)
            .then(|| (self.0 - 1) as usize)
    }

    pub fn all() -> impl Iterator<Item = Tool> {
        (1..=4).map(Tool)
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Tool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .ok()
            .and_then(Tool::new)
            .ok_or_else(|| format!("tool must be 1, 2, 3 or 4 (got '{}')", s))
    }
}

// -------------------- Events --------------------

/// A confirmed stroke point.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokeEvent {
    pub id: String,
    pub tool_id: Tool,
    pub x: i32,
    pub y: i32,
    pub size: f32,
}

impl StrokeEvent {
    pub fn new(point: &StrokePoint) -> Self {
        Self {
            id: fresh_id(),
            tool_id: point.tool,
            x: point.x,
            y: point.y,
            size: point.size,
        }
    }

    /// Same tool and within `proximity` pixels on both axes.
    pub fn covers(&self, point: &StrokePoint, proximity: i32) -> bool {
        self.tool_id == point.tool
            && (self.x - point.x).abs() <= proximity
            && (self.y - point.y).abs() <= proximity
    }
}

/// Per-frame changes sent downstream.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FramePayload {
    pub tool: Tool,
    pub new_strokes: Vec<StrokeEvent>,
    pub remove_strokes: Vec<String>,
    pub new_objects: Vec<ObjectEvent>,
    pub remove_objects: Vec<String>,
}

impl FramePayload {
    pub fn new(tool: Tool) -> Self {
        Self {
            tool,
            new_strokes: Vec::new(),
            remove_strokes: Vec::new(),
            new_objects: Vec::new(),
            remove_objects: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.new_strokes.is_empty()
            && self.remove_strokes.is_empty()
            && self.new_objects.is_empty()
            && self.remove_objects.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BackgroundEvent {
    pub id: String,
    pub shape: String,
    #[serde(flatten)]
    pub rect: Rect,
}

/// Background scene lifecycle, sent separately from frame payloads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LifecycleEvent {
    Background(BackgroundEvent),
    Removal(BackgroundEvent),
}

impl LifecycleEvent {
    pub fn id(&self) -> &str {
        match self {
            LifecycleEvent::Background(e) | LifecycleEvent::Removal(e) => &e.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_hex() {
        let a = fresh_id();
        let b = fresh_id();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn tools_map_to_channels() {
        assert_eq!(Tool::new(1).unwrap().channel(), Some(0));
        assert_eq!(Tool::new(3).unwrap().channel(), Some(2));
        assert_eq!(Tool::OBJECTS.channel(), None);
        assert!(Tool::new(0).is_none());
        assert!(Tool::new(5).is_none());
        assert_eq!("2".parse::<Tool>().unwrap(), Tool::new(2).unwrap());
        assert!("9".parse::<Tool>().is_err());
    }

    #[test]
    fn payload_serializes_camel_case() {
        let mut payload = FramePayload::new(Tool::new(2).unwrap());
        payload.new_strokes.push(StrokeEvent {
            id: "s1".to_string(),
            tool_id: Tool::new(2).unwrap(),
            x: 4,
            y: 5,
            size: 12.0,
        });
        payload.remove_objects.push("o1".to_string());
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["tool"], 2);
        assert_eq!(json["newStrokes"][0]["toolId"], 2);
        assert_eq!(json["removeObjects"][0], "o1");
        assert!(json["newObjects"].as_array().unwrap().is_empty());
    }

    #[test]
    fn lifecycle_events_are_tagged() {
        let event = LifecycleEvent::Background(BackgroundEvent {
            id: "b1".to_string(),
            shape: "fond_sea".to_string(),
            rect: Rect::new(3, 4, 50, 20),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "background");
        assert_eq!(json["shape"], "fond_sea");
        assert_eq!(json["x"], 3);
        assert_eq!(json["h"], 20);
        assert_eq!(event.id(), "b1");
    }
}
