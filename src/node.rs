//! Sensor node loop
//!
//! One tick samples the accelerometer, updates the step detector, sweeps the
//! pressure channels, encodes the message and writes it to the link. Ticks are
//! strictly sequential and separated by a fixed sleep.

use crate::config::NodeConfig;
use crate::error::{FaultKind, PlantarError};
use crate::framing::Framing;
use crate::motion::MotionSource;
use crate::pressure::PressureSource;
use crate::steps::StepDetector;
use crate::telemetry;
use crate::types::{StepState, TelemetryMessage};
use std::io::{self, ErrorKind, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Longest uninterrupted sleep, so a shutdown request is noticed promptly
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Result of one tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub state: StepState,
    pub message: TelemetryMessage,
    /// Wire text without framing
    pub text: String,
}

/// Totals after the loop stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeSummary {
    pub ticks: u64,
    pub messages_sent: u64,
    /// Messages lost to transient write faults
    pub messages_dropped: u64,
    pub steps: u64,
}

/// Sender-side context: sensors, detector and link
pub struct SensorNode<M, P, W> {
    motion: M,
    pressure: P,
    link: W,
    detector: StepDetector,
    framing: Framing,
    ticks: u64,
    sent: u64,
    dropped: u64,
}

impl<M, P, W> SensorNode<M, P, W>
where
    M: MotionSource,
    P: PressureSource,
    W: Write,
{
    pub fn new(motion: M, pressure: P, link: W, detector: StepDetector, framing: Framing) -> Self {
        Self {
            motion,
            pressure,
            link,
            detector,
            framing,
            ticks: 0,
            sent: 0,
            dropped: 0,
        }
    }

    pub fn from_config(motion: M, pressure: P, link: W, config: &NodeConfig) -> Self {
        Self::new(
            motion,
            pressure,
            link,
            StepDetector::new(config.step_threshold_g),
            config.framing,
        )
    }

    pub fn steps(&self) -> StepState {
        self.detector.state()
    }

    /// Ticks attempted over the node's lifetime, across link swaps
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Lifetime totals, including loops that ended with an error
    pub fn totals(&self) -> NodeSummary {
        NodeSummary {
            ticks: self.ticks,
            messages_sent: self.sent,
            messages_dropped: self.dropped,
            steps: self.detector.state().count,
        }
    }

    pub fn link(&self) -> &W {
        &self.link
    }

    /// Swap in a fresh link, keeping the step count; returns the old one
    pub fn replace_link(&mut self, link: W) -> W {
        std::mem::replace(&mut self.link, link)
    }

    /// Release the link
    pub fn into_link(self) -> W {
        self.link
    }

    /// Sample, detect, encode and send one message
    pub fn tick(&mut self) -> Result<TickReport, PlantarError> {
        self.ticks += 1;
        let sample = self
            .motion
            .read_acceleration()
            .map_err(|e| PlantarError::Device(format!("accelerometer: {e:?}")))?;
        let state = self.detector.update(sample.magnitude());

        let readings = self
            .pressure
            .read_all()
            .map_err(|e| PlantarError::Device(format!("pressure converter: {e:?}")))?;

        let message = TelemetryMessage::from_readings(state.count, &readings);
        let text = telemetry::encode_message(&message);
        self.send(&text)?;
        debug!(steps = state.count, channels = readings.len(), "sent {text}");

        Ok(TickReport {
            state,
            message,
            text,
        })
    }

    /// Write one whole frame.
    ///
    /// A fault before the first byte leaves the stream clean and keeps its
    /// classification. Once part of the frame is on the wire the next message
    /// would be glued onto the fragment, so the fault is fatal.
    fn send(&mut self, text: &str) -> Result<(), PlantarError> {
        let bytes = self.framing.frame(text);
        let mut written = 0;
        while written < bytes.len() {
            match self.link.write(&bytes[written..]) {
                Ok(0) => {
                    return Err(partial_frame(
                        io::Error::from(ErrorKind::WriteZero),
                        written,
                        bytes.len(),
                    ))
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if written == 0 => return Err(PlantarError::transport(e)),
                Err(e) => return Err(partial_frame(e, written, bytes.len())),
            }
        }
        self.link.flush().map_err(PlantarError::transport)
    }

    /// Tick until `shutdown` is set, `max_ticks` is reached or the link fails.
    ///
    /// Transient write faults drop the message and the loop carries on; any
    /// other fault ends the loop with the error. The returned summary covers
    /// this call only; see [`SensorNode::totals`] for the lifetime view.
    pub fn run(
        &mut self,
        shutdown: &AtomicBool,
        interval: Duration,
        max_ticks: Option<u64>,
    ) -> Result<NodeSummary, PlantarError> {
        let mut summary = NodeSummary::default();

        while !shutdown.load(Ordering::SeqCst) {
            if max_ticks.is_some_and(|max| summary.ticks >= max) {
                break;
            }
            summary.ticks += 1;
            match self.tick() {
                Ok(_) => {
                    summary.messages_sent += 1;
                    self.sent += 1;
                }
                Err(e) if e.is_transient() => {
                    summary.messages_dropped += 1;
                    self.dropped += 1;
                    warn!("dropping message after transient fault: {e}");
                }
                Err(e) => return Err(e),
            }
            sleep_unless_shutdown(shutdown, interval);
        }

        summary.steps = self.detector.state().count;
        info!(
            ticks = summary.ticks,
            sent = summary.messages_sent,
            steps = summary.steps,
            "node loop stopped"
        );
        Ok(summary)
    }
}

fn partial_frame(cause: io::Error, written: usize, len: usize) -> PlantarError {
    warn!(written, len, "link failed mid-frame: {cause}");
    PlantarError::Transport {
        kind: FaultKind::Fatal,
        source: io::Error::new(
            ErrorKind::BrokenPipe,
            format!("partial frame ({written} of {len} bytes): {cause}"),
        ),
    }
}

fn sleep_unless_shutdown(shutdown: &AtomicBool, interval: Duration) {
    let mut remaining = interval;
    while !remaining.is_zero() && !shutdown.load(Ordering::SeqCst) {
        let slice = remaining.min(SLEEP_SLICE);
        thread::sleep(slice);
        remaining -= slice;
    }
}
