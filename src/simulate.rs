//! Simulated sensors
//!
//! Deterministic stand-ins for the accelerometer and pressure converter so the
//! node and receiver can run on machines without the hardware attached. Both
//! follow the same gait cycle of `stride_ticks` samples.

use crate::layout::FootLayout;
use crate::motion::MotionSource;
use crate::pressure::PressureSource;
use crate::types::{is_valid_channel, AccelerationSample, ChannelReading, Conversion, CHANNEL_COUNT};
use core::convert::Infallible;

/// Default samples per simulated stride
pub const DEFAULT_STRIDE_TICKS: u32 = 4;

/// Magnitude at rest (g)
const REST_G: f64 = 1.0;

/// Magnitude at heel strike (g)
const STRIKE_G: f64 = 1.6;

/// Accelerometer that crosses the default step threshold once per stride
#[derive(Debug, Clone)]
pub struct SimulatedAccelerometer {
    stride_ticks: u32,
    tick: u64,
}

impl Default for SimulatedAccelerometer {
    fn default() -> Self {
        Self::new(DEFAULT_STRIDE_TICKS)
    }
}

impl SimulatedAccelerometer {
    pub fn new(stride_ticks: u32) -> Self {
        Self {
            stride_ticks: stride_ticks.max(2),
            tick: 0,
        }
    }

    /// Magnitude at a given tick: one strike sample per stride
    pub fn magnitude_at(&self, tick: u64) -> f64 {
        if tick % u64::from(self.stride_ticks) == 1 {
            STRIKE_G
        } else {
            REST_G
        }
    }
}

impl MotionSource for SimulatedAccelerometer {
    type Error = Infallible;

    fn read_acceleration(&mut self) -> Result<AccelerationSample, Self::Error> {
        let magnitude = self.magnitude_at(self.tick);
        self.tick += 1;
        // All of the load on z, slight sway on x
        let x = 0.05;
        let z = (magnitude * magnitude - x * x).sqrt();
        Ok(AccelerationSample::new(x, 0.0, z))
    }
}

/// Pressure pad whose load rolls from heel to toes over each stride
#[derive(Debug, Clone)]
pub struct SimulatedPressurePad {
    layout: FootLayout,
    stride_ticks: u32,
    tick: u64,
}

impl Default for SimulatedPressurePad {
    fn default() -> Self {
        Self::new(FootLayout::default(), DEFAULT_STRIDE_TICKS)
    }
}

impl SimulatedPressurePad {
    pub fn new(layout: FootLayout, stride_ticks: u32) -> Self {
        Self {
            layout,
            stride_ticks: stride_ticks.max(2),
            tick: 0,
        }
    }

    /// Row carrying the peak load at a given tick (3 = heel, 0 = toes)
    fn loaded_row(&self, tick: u64) -> f64 {
        let stride = u64::from(self.stride_ticks);
        let phase = (tick % stride) as f64 / (stride - 1) as f64;
        let last_row = (self.layout.rows() - 1) as f64;
        last_row * (1.0 - phase)
    }

    /// Conversion for a channel at a given tick
    pub fn value_at(&self, channel_id: u8, tick: u64) -> Conversion {
        let Some((row, _)) = self.layout.position_of(channel_id) else {
            return Conversion::NotAttempted;
        };
        let distance = row as f64 - self.loaded_row(tick);
        let load = 255.0 * (-distance * distance).exp();
        Conversion::Sample(load.round().clamp(0.0, 255.0) as u8)
    }

    /// Move on to the next sample of the cycle
    pub fn advance(&mut self) {
        self.tick += 1;
    }
}

impl PressureSource for SimulatedPressurePad {
    type Error = Infallible;

    fn read_channel(&mut self, channel_id: u8) -> Result<Conversion, Self::Error> {
        if !is_valid_channel(channel_id) {
            return Ok(Conversion::NotAttempted);
        }
        Ok(self.value_at(channel_id, self.tick))
    }

    /// One full sweep per tick
    fn read_all(&mut self) -> Result<Vec<ChannelReading>, Self::Error> {
        let mut readings = Vec::with_capacity(CHANNEL_COUNT as usize);
        for channel_id in 0..CHANNEL_COUNT {
            if let Conversion::Sample(value) = self.read_channel(channel_id)? {
                readings.push(ChannelReading { channel_id, value });
            }
        }
        self.advance();
        Ok(readings)
    }
}
