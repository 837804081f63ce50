//! Plantar Flux - Foot-sensor telemetry from sensor node to pressure map
//!
//! A sensor node samples an accelerometer and an 8-channel pressure converter,
//! counts steps and streams one text message per tick. A receiver decodes each
//! message and reconstructs a smoothed, masked and outline-clipped pressure
//! field for rendering:
//! sampling → step detection → telemetry encoding → framing → decoding →
//! field reconstruction → rendering.
//!
//! ## Modules
//!
//! - **Node side**: [`motion`], [`pressure`], [`steps`], [`node`]
//! - **Wire**: [`telemetry`], [`framing`]
//! - **Receiver side**: [`field`], [`layout`], [`pipeline`], [`receiver`], [`render`]

pub mod config;
pub mod error;
pub mod field;
pub mod framing;
pub mod layout;
pub mod motion;
pub mod node;
pub mod pipeline;
pub mod pressure;
pub mod receiver;
pub mod render;
pub mod simulate;
pub mod steps;
pub mod telemetry;
pub mod types;

pub use config::{NodeConfig, ReceiverConfig, ReconnectPolicy};
pub use error::{FaultKind, PlantarError};
pub use field::{reconstruct, PressureField, ReconstructionConfig};
pub use framing::{FrameReader, Framing};
pub use layout::{FootLayout, FootOutline};
pub use node::SensorNode;
pub use pipeline::{telemetry_to_frame, FrameProcessor};
pub use receiver::Receiver;
pub use render::Renderer;
pub use steps::StepDetector;
pub use telemetry::{decode, encode};

/// Plantar Flux version embedded in all render frames
pub const PLANTAR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for render frames
pub const PRODUCER_NAME: &str = "plantar-flux";
