//! Object and background interpretation of classified contours.
//!
//! - `ShapeClassifier`: contour → nearest template
//! - `ClusterTracker`: per-frame detections → temporally stable clusters
//! - `ObjectDetector`: confirmed clusters → object events and diffs
//! - `BackgroundTracker`: dominant background scene with hysteresis

mod background;
mod classifier;
mod cluster;
mod objects;
mod result;

pub use background::{BackgroundChange, BackgroundTracker};
pub use classifier::ShapeClassifier;
pub use cluster::{Cluster, ClusterPoint, ClusterTracker};
pub use objects::ObjectDetector;
pub use result::{Detection, ObjectDiff, ObjectEvent};
