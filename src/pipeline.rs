//! Pipeline orchestration
//!
//! This module provides the receiver-side public API for Plantar Flux.
//! It orchestrates the path from raw telemetry text to a render frame.

use crate::config::ReceiverConfig;
use crate::error::PlantarError;
use crate::field::{reconstruct, ReconstructionConfig};
use crate::layout::{FootLayout, FootOutline};
use crate::telemetry;
use crate::types::{FrameProducer, FrameProvenance, RenderFrame};
use crate::{PLANTAR_VERSION, PRODUCER_NAME};
use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Current render frame schema version
pub const FRAME_VERSION: &str = "1.0.0";

/// Title shown above a rendered field
pub fn frame_title(steps: u64) -> String {
    format!("Foot Pressure Map - Steps: {steps}")
}

/// Convert one telemetry message into a render frame JSON document
/// using the reference layout, outline and smoothing.
///
/// # Example
/// ```ignore
/// let frame_json = telemetry_to_frame("Steps: 3, Channel 0: 120".to_string())?;
/// ```
pub fn telemetry_to_frame(text: String) -> Result<String, PlantarError> {
    let mut processor = FrameProcessor::new();
    let frame = processor.process(&text, None);
    serde_json::to_string_pretty(&frame).map_err(PlantarError::JsonError)
}

/// Reconstruction context for a receiver.
///
/// Holds the fixed layout and outline and numbers the frames it produces. No
/// reconstruction state carries over between messages.
pub struct FrameProcessor {
    layout: FootLayout,
    outline: FootOutline,
    config: ReconstructionConfig,
    instance_id: String,
    sequence: u64,
}

impl Default for FrameProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameProcessor {
    /// Create a processor with the reference context
    pub fn new() -> Self {
        Self::with_context(
            FootLayout::default(),
            FootOutline::default(),
            ReconstructionConfig::default(),
        )
    }

    pub fn with_context(layout: FootLayout, outline: FootOutline, config: ReconstructionConfig) -> Self {
        Self {
            layout,
            outline,
            config,
            instance_id: Uuid::new_v4().to_string(),
            sequence: 0,
        }
    }

    /// Create a processor from a validated receiver configuration
    pub fn from_config(config: &ReceiverConfig) -> Self {
        Self::with_context(
            config.layout.clone(),
            config.outline.clone(),
            config.reconstruction.clone(),
        )
    }

    /// Use a fixed instance id (reproducible output)
    pub fn with_instance_id(mut self, instance_id: String) -> Self {
        self.instance_id = instance_id;
        self
    }

    pub fn layout(&self) -> &FootLayout {
        &self.layout
    }

    pub fn outline(&self) -> &FootOutline {
        &self.outline
    }

    /// Frames produced so far
    pub fn frames_produced(&self) -> u64 {
        self.sequence
    }

    /// Decode and reconstruct one message.
    ///
    /// Never fails: malformed text yields a frame with warnings attached.
    pub fn process(&mut self, text: &str, peer: Option<&str>) -> RenderFrame {
        let report = telemetry::decode(text);
        for warning in &report.warnings {
            warn!(peer, "{warning}");
        }

        let message = report.message;
        let result = reconstruct(&message.channels, &self.layout, &self.outline, &self.config);
        self.sequence += 1;
        debug!(
            sequence = self.sequence,
            steps = message.step_count,
            channels = message.channels.len(),
            "reconstructed frame"
        );

        RenderFrame {
            frame_version: FRAME_VERSION.to_string(),
            producer: FrameProducer {
                name: PRODUCER_NAME.to_string(),
                version: PLANTAR_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            provenance: FrameProvenance {
                peer: peer.map(str::to_string),
                received_at_utc: Utc::now().to_rfc3339(),
                sequence: self.sequence,
            },
            steps: message.step_count,
            title: frame_title(message.step_count),
            cells: result.field.displayed_rows(),
            field: result.field,
            raster: result.raster,
            markers: result.markers,
            outline: self.outline.points().to_vec(),
            warnings: report.warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_frame() {
        let mut processor = FrameProcessor::with_context(
            FootLayout::default(),
            FootOutline::default(),
            ReconstructionConfig::with_sigma(1.0),
        );
        let frame = processor.process("Steps: 3, Channel 0: 120, Channel 5: 200", Some("10.0.0.7:5123"));

        assert_eq!(frame.steps, 3);
        assert_eq!(frame.title, "Foot Pressure Map - Steps: 3");
        assert!(frame.title.ends_with('3'));
        assert_eq!(frame.field.local_maxima(), vec![(0, 0), (2, 1)]);

        let layout = FootLayout::default();
        for (row, cells) in frame.cells.iter().enumerate() {
            for (col, cell) in cells.iter().enumerate() {
                assert_eq!(cell.is_none(), layout.channel_at(row, col).is_none());
            }
        }
        assert_eq!(frame.markers.len(), 8);
        assert!(frame.warnings.is_empty());
        assert_eq!(frame.provenance.peer.as_deref(), Some("10.0.0.7:5123"));
        assert_eq!(frame.provenance.sequence, 1);
    }

    #[test]
    fn test_frames_are_independent() {
        let mut processor = FrameProcessor::new();
        let first = processor.process("Steps: 1, Channel 3: 250", None);
        let _garbled = processor.process("\u{fffd}\u{fffd}nonsense", None);
        let again = processor.process("Steps: 1, Channel 3: 250", None);
        assert_eq!(first.field, again.field);
        assert_eq!(again.provenance.sequence, 3);
        assert_eq!(processor.frames_produced(), 3);
    }

    #[test]
    fn test_garbled_message_still_renders() {
        let mut processor = FrameProcessor::new();
        let frame = processor.process("garbage", None);
        assert_eq!(frame.steps, 0);
        assert_eq!(frame.warnings.len(), 1);
        assert!(frame.field.smoothed.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_telemetry_to_frame_json() {
        let json = telemetry_to_frame("Steps: 7, Channel 2: 99".to_string()).unwrap();
        let frame: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(frame["frame_version"], FRAME_VERSION);
        assert_eq!(frame["producer"]["name"], PRODUCER_NAME);
        assert_eq!(frame["steps"], 7);
        assert_eq!(frame["title"], "Foot Pressure Map - Steps: 7");
        assert!(frame["cells"][0][1].is_null());
        assert!(frame["cells"][1][2].as_f64().unwrap() > 0.0);
        assert_eq!(frame["markers"].as_array().unwrap().len(), 8);
    }

    #[test]
    fn test_fixed_instance_id() {
        let mut processor = FrameProcessor::new().with_instance_id("bench".to_string());
        let frame = processor.process("Steps: 0", None);
        assert_eq!(frame.producer.instance_id, "bench");
        assert_eq!(frame.producer.version, PLANTAR_VERSION);
    }
}
