//! Core types for the Plantar Flux pipeline
//!
//! This module defines the data structures that flow between stages: raw
//! motion and pressure samples on the node, the telemetry message on the wire,
//! and the render frame handed to a renderer on the receiver.

use crate::field::{ClippedRaster, PressureField, SensorMarker};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of pressure channels on the converter
pub const CHANNEL_COUNT: u8 = 8;

/// Channel id → reading, iterated in ascending channel order
pub type ChannelMap = BTreeMap<u8, u16>;

/// Whether a channel id addresses one of the converter inputs
pub fn is_valid_channel(channel_id: u8) -> bool {
    channel_id < CHANNEL_COUNT
}

/// One 3-axis acceleration sample in g
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelerationSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AccelerationSample {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean norm of the acceleration vector
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Step counter state after a detector update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepState {
    /// Steps counted since the detector was created
    pub count: u64,
    /// True while magnitude stays above the threshold
    pub armed: bool,
}

/// Outcome of a single converter read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conversion {
    /// 8-bit-equivalent reading
    Sample(u8),
    /// Channel id out of range; the bus was not touched
    NotAttempted,
}

impl Conversion {
    pub fn value(&self) -> Option<u8> {
        match self {
            Conversion::Sample(value) => Some(*value),
            Conversion::NotAttempted => None,
        }
    }
}

/// A single channel reading taken during one sampling tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelReading {
    pub channel_id: u8,
    pub value: u8,
}

/// The unit exchanged over the transport
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryMessage {
    pub step_count: u64,
    pub channels: ChannelMap,
}

impl TelemetryMessage {
    pub fn new(step_count: u64, channels: ChannelMap) -> Self {
        Self {
            step_count,
            channels,
        }
    }

    /// Build a message from the readings of one tick
    pub fn from_readings(step_count: u64, readings: &[ChannelReading]) -> Self {
        let channels = readings
            .iter()
            .map(|r| (r.channel_id, u16::from(r.value)))
            .collect();
        Self {
            step_count,
            channels,
        }
    }
}

/// Result of a permissive decode: the message plus anything that looked off
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeReport {
    pub message: TelemetryMessage,
    pub warnings: Vec<String>,
}

impl DecodeReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Render frame producer metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Where and when the telemetry behind a frame arrived
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameProvenance {
    /// Remote address of the sensor node, if known
    pub peer: Option<String>,
    pub received_at_utc: String,
    /// Frame counter for this receiver instance
    pub sequence: u64,
}

/// Everything a renderer needs for one render cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderFrame {
    pub frame_version: String,
    pub producer: FrameProducer,
    pub provenance: FrameProvenance,
    pub steps: u64,
    pub title: String,
    pub field: PressureField,
    /// Displayed values per cell; masked cells are `None`
    pub cells: Vec<Vec<Option<f64>>>,
    pub raster: ClippedRaster,
    pub markers: Vec<SensorMarker>,
    /// Outline polygon as `[x, y]` points
    pub outline: Vec<[f64; 2]>,
    pub warnings: Vec<String>,
}
