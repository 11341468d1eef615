//! Outbound event delivery.
//!
//! The frame loop hands every `FrameReport` to an `EventSink`. Delivery is
//! fire-and-forget: a failed publish is logged and that payload is dropped, the loop
//! never retries or blocks on it.

mod endpoint;
mod mqtt;

use anyhow::Result;

pub use endpoint::{parse_mqtt_endpoint, MqttEndpoint};
pub use mqtt::MqttSink;

use crate::pipeline::FrameReport;
use crate::{FramePayload, LifecycleEvent};

pub trait EventSink {
    fn publish_frame(&mut self, payload: &FramePayload) -> Result<()>;
    fn publish_lifecycle(&mut self, event: &LifecycleEvent) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

/// Publish a report: lifecycle events first, then the frame payload if it carries changes.
/// Returns how many messages were accepted by the sink.
pub fn deliver(sink: &mut dyn EventSink, report: &FrameReport) -> usize {
    let mut sent = 0;
    for event in &report.lifecycle {
        match sink.publish_lifecycle(event) {
            Ok(()) => sent += 1,
            Err(e) => log::warn!("transport: dropped lifecycle event: {:#}", e),
        }
    }
    if !report.payload.is_empty() {
        match sink.publish_frame(&report.payload) {
            Ok(()) => sent += 1,
            Err(e) => log::warn!("transport: dropped frame payload: {:#}", e),
        }
    }
    sent
}

/// Discards everything (transport bypass).
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish_frame(&mut self, _payload: &FramePayload) -> Result<()> {
        Ok(())
    }

    fn publish_lifecycle(&mut self, _event: &LifecycleEvent) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Records everything it receives.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub frames: Vec<FramePayload>,
    pub lifecycle: Vec<LifecycleEvent>,
    pub closed: bool,
}

impl EventSink for MemorySink {
    fn publish_frame(&mut self, payload: &FramePayload) -> Result<()> {
        self.frames.push(payload.clone());
        Ok(())
    }

    fn publish_lifecycle(&mut self, event: &LifecycleEvent) -> Result<()> {
        self.lifecycle.push(event.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct FailingSink;

    impl EventSink for FailingSink {
        fn publish_frame(&mut self, _payload: &FramePayload) -> Result<()> {
            Err(anyhow!("broker unavailable"))
        }

        fn publish_lifecycle(&mut self, _event: &LifecycleEvent) -> Result<()> {
            Err(anyhow!("broker unavailable"))
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn report() -> FrameReport {
        let mut report = FrameReport::new(crate::Tool::OBJECTS);
        report.payload.remove_objects.push("abc".to_string());
        report.lifecycle.push(LifecycleEvent::Removal(crate::BackgroundEvent {
            id: "bg".to_string(),
            shape: "fond_sea".to_string(),
            rect: crate::frame::Rect::new(0, 0, 10, 10),
        }));
        report
    }

    #[test]
    fn delivers_lifecycle_then_payload() {
        let mut sink = MemorySink::default();
        assert_eq!(deliver(&mut sink, &report()), 2);
        assert_eq!(sink.lifecycle.len(), 1);
        assert_eq!(sink.frames[0].remove_objects, vec!["abc".to_string()]);
    }

    #[test]
    fn empty_payload_is_not_sent() {
        let mut sink = MemorySink::default();
        assert_eq!(deliver(&mut sink, &FrameReport::new(crate::Tool::OBJECTS)), 0);
        assert!(sink.frames.is_empty());
    }

    #[test]
    fn failures_are_swallowed() {
        assert_eq!(deliver(&mut FailingSink, &report()), 0);
    }
}
