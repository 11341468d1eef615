//! Frame loop controller.
//!
//! `Pipeline` owns every piece of per-session state (current tool, baseline, clusters,
//! background, stroke canvases and slots) and runs one frame at a time through the
//! stages. Nothing here is shared across threads.

use std::sync::Arc;

use crate::baseline::{BaselineCalculator, BaselineManager};
use crate::config::{CanvasConfig, MatchMethod};
use crate::depth::{DepthProcessor, DepthResult};
use crate::detect::{
    BackgroundChange, BackgroundTracker, ClusterTracker, Detection, ObjectDetector, ShapeClassifier,
};
use crate::frame::{DepthFrame, Rect};
use crate::stroke::{
    BrushStrokeDetector, StrokeAccumulator, StrokeConfirmTracker, StrokeLifeTimer, StrokeTracker,
};
use crate::templates::{SizeClass, TemplateManager};
use crate::{BackgroundEvent, CanvasError, FramePayload, LifecycleEvent, StrokeEvent, Tool};

/// Everything one frame (or tool switch) produced.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameReport {
    pub payload: FramePayload,
    pub lifecycle: Vec<LifecycleEvent>,
}

impl FrameReport {
    pub fn new(tool: Tool) -> Self {
        Self {
            payload: FramePayload::new(tool),
            lifecycle: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty() && self.lifecycle.is_empty()
    }
}

#[derive(Clone, Debug)]
struct StrokeSlot {
    event: StrokeEvent,
    /// Persistent strokes survive tool switches and are never aged out.
    persistent: bool,
}

/// The background observed in the current frame.
struct BackgroundSighting {
    shape: String,
    detection: Detection,
}

/// Mutable state of one session.
struct PipelineState {
    tool: Tool,
    calculator: BaselineCalculator,
    manager: Option<BaselineManager>,
    clusters: ClusterTracker,
    objects: ObjectDetector,
    background: BackgroundTracker,
    background_rect: Option<Rect>,
    accumulator: StrokeAccumulator,
    confirm: StrokeConfirmTracker,
    lifetimers: Vec<StrokeLifeTimer>,
    slots: Vec<Vec<StrokeSlot>>,
}

pub struct Pipeline {
    config: CanvasConfig,
    templates: Arc<TemplateManager>,
    classifier: ShapeClassifier,
    depth: DepthProcessor,
    brush: BrushStrokeDetector,
    stroke_tracker: StrokeTracker,
    state: PipelineState,
}

impl Pipeline {
    pub fn new(config: &CanvasConfig, templates: Arc<TemplateManager>, tool: Tool) -> Self {
        let roi = config.roi;
        let strokes = &config.strokes;
        let state = PipelineState {
            tool,
            calculator: BaselineCalculator::new(config.baseline.n_profile),
            manager: None,
            clusters: ClusterTracker::new(&config.clusters, config.matching.area_threshold),
            objects: ObjectDetector::new(&templates, roi, &config.clusters),
            background: BackgroundTracker::new(&config.background),
            background_rect: None,
            accumulator: StrokeAccumulator::new(
                roi.width(),
                roi.height(),
                strokes.alpha,
                strokes.abs_mode,
            ),
            confirm: StrokeConfirmTracker::new(strokes.proximity, strokes.confirmation_frames),
            lifetimers: (0..Tool::STROKE_TOOLS)
                .map(|_| StrokeLifeTimer::new(strokes.max_age))
                .collect(),
            slots: vec![Vec::new(); Tool::STROKE_TOOLS],
        };
        Self {
            config: config.clone(),
            classifier: ShapeClassifier::new(templates.clone()),
            templates,
            depth: DepthProcessor::new(&config.depth),
            brush: BrushStrokeDetector::new(strokes),
            stroke_tracker: StrokeTracker::new(strokes.proximity),
            state,
        }
    }

    pub fn tool(&self) -> Tool {
        self.state.tool
    }

    pub fn is_calibrated(&self) -> bool {
        self.state.manager.is_some()
    }

    /// Current (possibly baked) baseline.
    pub fn baseline(&self) -> Option<&DepthFrame> {
        self.state.manager.as_ref().map(|m| m.baseline())
    }

    pub fn baseline_manager(&self) -> Option<&BaselineManager> {
        self.state.manager.as_ref()
    }

    pub fn clusters(&self) -> &ClusterTracker {
        &self.state.clusters
    }

    /// Confirmed background as `(id, shape)`.
    pub fn background(&self) -> Option<(&str, &str)> {
        self.state.background.confirmed()
    }

    pub fn tracked_objects(&self) -> &[crate::ObjectEvent] {
        self.state.objects.tracked()
    }

    /// Strokes currently known for a drawing tool.
    pub fn strokes(&self, tool: Tool) -> Vec<&StrokeEvent> {
        tool.channel()
            .map(|ch| self.state.slots[ch].iter().map(|s| &s.event).collect())
            .unwrap_or_default()
    }

    /// Run one prepared ROI frame through the pipeline.
    pub fn process(&mut self, frame: &DepthFrame) -> Result<FrameReport, CanvasError> {
        let roi = self.config.roi;
        if frame.dimensions() != (roi.width(), roi.height()) {
            return Err(CanvasError::FrameSizeMismatch {
                expected: (roi.width(), roi.height()),
                actual: frame.dimensions(),
            });
        }
        let mut report = FrameReport::new(self.state.tool);

        if self.state.manager.is_none() {
            if !self.state.calculator.update(frame)? {
                return Ok(report);
            }
            let baseline = self.state.calculator.baseline()?.clone();
            self.state.manager = Some(BaselineManager::new(
                baseline,
                self.config.baseline.removal_threshold,
                self.config.baseline.removal_ratio,
            ));
            log::info!("pipeline: calibrated for tool {}", self.state.tool);
            return Ok(report);
        }

        self.handle_zone_removals(frame, &mut report)?;

        let result = match self.state.manager.as_ref() {
            Some(manager) => self.depth.process(frame, manager.baseline())?,
            None => return Ok(report),
        };

        if self.state.tool.is_stroke() {
            self.process_strokes(&result, &mut report);
        } else {
            self.process_objects(frame, &result, &mut report);
        }
        Ok(report)
    }

    fn handle_zone_removals(
        &mut self,
        frame: &DepthFrame,
        report: &mut FrameReport,
    ) -> Result<(), CanvasError> {
        let Some(manager) = self.state.manager.as_mut() else {
            return Ok(());
        };
        for removal in manager.detect_and_handle_removals(frame)? {
            if self.state.background.forget(&removal.obj_id) {
                self.state.background_rect = None;
            }
            report.lifecycle.push(LifecycleEvent::Removal(BackgroundEvent {
                id: removal.obj_id,
                shape: removal.name,
                rect: removal.rect,
            }));
        }
        Ok(())
    }

    fn process_strokes(&mut self, result: &DepthResult, report: &mut FrameReport) {
        let tool = self.state.tool;
        let Some(channel) = tool.channel() else {
            return;
        };
        let Some(composite) = self.state.accumulator.update(&result.mapped, tool) else {
            return;
        };
        let raw = self.brush.detect(&composite, tool);

        let slots = &mut self.state.slots[channel];
        let unique = self
            .stroke_tracker
            .update(&raw, slots.iter().map(|s| &s.event));
        let confirmed = self.state.confirm.update(&unique);

        let lifetimer = &mut self.state.lifetimers[channel];
        for point in confirmed {
            if point.size > self.config.strokes.size_max {
                continue;
            }
            if self
                .stroke_tracker
                .is_duplicate(&point, slots.iter().map(|s| &s.event))
            {
                continue;
            }
            let event = StrokeEvent::new(&point);
            lifetimer.track(&event.id);
            report.payload.new_strokes.push(event.clone());
            slots.push(StrokeSlot {
                event,
                persistent: false,
            });
        }

        let active: Vec<String> = slots
            .iter()
            .filter(|s| !s.persistent)
            .filter(|s| raw.iter().any(|p| self.stroke_tracker.is_duplicate(p, [&s.event])))
            .map(|s| s.event.id.clone())
            .collect();
        let expired = lifetimer.update(&active);
        if !expired.is_empty() {
            slots.retain(|s| !expired.contains(&s.event.id));
            report.payload.remove_strokes.extend(expired);
        }
    }

    fn process_objects(&mut self, frame: &DepthFrame, result: &DepthResult, report: &mut FrameReport) {
        let mut detections = Vec::with_capacity(result.contours.len());
        let mut sighting: Option<BackgroundSighting> = None;
        let baseline = self.state.manager.as_ref().map(|m| m.baseline());

        for contour in &result.contours {
            let template = match (self.config.matching.method, baseline) {
                (MatchMethod::Relief, Some(baseline)) => self
                    .classifier
                    .classify_relief(contour, frame, baseline)
                    .or_else(|| self.classifier.classify(contour)),
                _ => self.classifier.classify(contour),
            };
            let Some(template) = template else {
                continue;
            };
            let Some(detection) = Detection::from_contour(&template.name, contour) else {
                continue;
            };
            let background_sized =
                self.classifier.bucket_for_area(detection.area as f64) == SizeClass::Background;
            if template.class == SizeClass::Background
                && background_sized
                && sighting
                    .as_ref()
                    .map_or(true, |s| detection.area > s.detection.area)
            {
                sighting = Some(BackgroundSighting {
                    shape: template.name.clone(),
                    detection: detection.clone(),
                });
            }
            detections.push(detection);
        }

        self.state.clusters.update(&detections);
        let diff = self.state.objects.update(&self.state.clusters);
        report.payload.new_objects.extend(diff.new);
        report.payload.remove_objects.extend(diff.removed);

        self.track_background(sighting, report);
    }

    fn track_background(&mut self, sighting: Option<BackgroundSighting>, report: &mut FrameReport) {
        // A baked background no longer shows up in the delta image; while its zone is in
        // place the scene counts as still observed and removal is left to the manager.
        let baked = self.state.background.confirmed().and_then(|(id, shape)| {
            self.state
                .manager
                .as_ref()
                .filter(|m| m.has_zone(id))
                .map(|_| shape.to_string())
        });
        let observed = baked.or_else(|| sighting.as_ref().map(|s| s.shape.clone()));

        for change in self.state.background.update(observed.as_deref()) {
            match change {
                BackgroundChange::Placed { id, shape } => {
                    let Some(sighting) = sighting.as_ref() else {
                        continue;
                    };
                    let d = &sighting.detection;
                    let rect = d.rect();
                    self.state.background_rect = Some(rect);
                    if self.config.background.bake {
                        self.bake_background(&id, &shape, d);
                    }
                    report
                        .lifecycle
                        .push(LifecycleEvent::Background(BackgroundEvent { id, shape, rect }));
                }
                BackgroundChange::Removed { id, shape } => {
                    let released = self
                        .state
                        .manager
                        .as_mut()
                        .and_then(|m| m.release_zone(&id))
                        .map(|zone| zone.rect);
                    let rect = self
                        .state
                        .background_rect
                        .take()
                        .or(released)
                        .unwrap_or(Rect::new(0, 0, 0, 0));
                    report
                        .lifecycle
                        .push(LifecycleEvent::Removal(BackgroundEvent { id, shape, rect }));
                }
            }
        }
    }

    fn bake_background(&mut self, id: &str, shape: &str, detection: &Detection) {
        let Some(manager) = self.state.manager.as_mut() else {
            return;
        };
        match manager.place_zone(
            &self.templates,
            id,
            shape,
            (detection.cx, detection.cy),
            (detection.width, detection.height),
        ) {
            Ok(Some(_)) => {}
            Ok(None) => log::debug!("pipeline: '{}' has no relief to bake", shape),
            Err(err) => log::warn!("pipeline: cannot bake '{}': {}", shape, err),
        }
    }

    /// Switch the active tool.
    ///
    /// Dynamic strokes of the old tool become persistent, calibration restarts, the
    /// object side is retired with removal events and the new tool's persistent strokes
    /// are emitted again.
    pub fn switch_tool(&mut self, tool: Tool) -> FrameReport {
        let old = self.state.tool;
        if tool == old {
            return FrameReport::new(tool);
        }
        let mut report = FrameReport::new(tool);

        if let Some(ch) = old.channel() {
            let lifetimer = &mut self.state.lifetimers[ch];
            for slot in self.state.slots[ch].iter_mut().filter(|s| !s.persistent) {
                slot.persistent = true;
                lifetimer.forget(&slot.event.id);
            }
        }

        if let Some(BackgroundChange::Removed { id, shape }) = self.state.background.reset() {
            let rect = self
                .state
                .background_rect
                .take()
                .unwrap_or(Rect::new(0, 0, 0, 0));
            report
                .lifecycle
                .push(LifecycleEvent::Removal(BackgroundEvent { id, shape, rect }));
        }
        self.state.background_rect = None;
        report.payload.remove_objects = self.state.objects.reset();
        self.state.clusters.reset();

        self.state.calculator.reset();
        self.state.manager = None;
        self.state.accumulator.clear();
        self.state.confirm.reset();

        if let Some(ch) = tool.channel() {
            report.payload.new_strokes = self.state.slots[ch]
                .iter()
                .filter(|s| s.persistent)
                .map(|s| s.event.clone())
                .collect();
        }

        self.state.tool = tool;
        log::info!("pipeline: tool switched {} -> {}", old, tool);
        report
    }

    /// Removal of everything still known downstream, sent once on shutdown.
    pub fn shutdown_report(&self) -> FrameReport {
        let mut report = FrameReport::new(self.state.tool);
        report.payload.remove_strokes = self
            .state
            .slots
            .iter()
            .flatten()
            .map(|s| s.event.id.clone())
            .collect();
        report.payload.remove_objects = self
            .state
            .objects
            .tracked()
            .iter()
            .map(|o| o.id.clone())
            .collect();
        if let Some((id, shape)) = self.state.background.confirmed() {
            report.lifecycle.push(LifecycleEvent::Removal(BackgroundEvent {
                id: id.to_string(),
                shape: shape.to_string(),
                rect: self.state.background_rect.unwrap_or(Rect::new(0, 0, 0, 0)),
            }));
        }
        report
    }
}
