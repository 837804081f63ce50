//! Pressure sampling
//!
//! Reads the eight single-ended inputs of an MCP3008-class converter over SPI.
//! Each read is a 3-byte full-duplex exchange: the first byte carries the start
//! condition, single-ended mode and channel select, the last two bytes return
//! the conversion.
//!
//! The 10-bit result is reduced to an 8-bit-equivalent value with `raw >> 2`.
//! Downstream consumers work in these units; it is not a calibrated scale.

use crate::types::{is_valid_channel, ChannelReading, Conversion, CHANNEL_COUNT};
use embedded_hal::spi::SpiDevice;

/// Anything that yields per-channel pressure conversions
pub trait PressureSource {
    type Error: core::fmt::Debug;

    /// Read one channel; out-of-range ids return [`Conversion::NotAttempted`]
    fn read_channel(&mut self, channel_id: u8) -> Result<Conversion, Self::Error>;

    /// Read every channel in ascending order, skipping failed conversions
    fn read_all(&mut self) -> Result<Vec<ChannelReading>, Self::Error> {
        let mut readings = Vec::with_capacity(CHANNEL_COUNT as usize);
        for channel_id in 0..CHANNEL_COUNT {
            if let Conversion::Sample(value) = self.read_channel(channel_id)? {
                readings.push(ChannelReading { channel_id, value });
            }
        }
        Ok(readings)
    }
}

/// First byte of the exchange for a channel
pub fn command_byte(channel_id: u8) -> u8 {
    (0b11 << 6) | ((channel_id & 0x07) << 3)
}

/// Recover the 10-bit conversion from the two returned bytes
pub fn raw_conversion(high: u8, low: u8) -> u16 {
    (u16::from(high & 0x03) << 8) | u16::from(low)
}

/// Reduce a 10-bit conversion to the 8-bit-equivalent output
pub fn rescale(raw10: u16) -> u8 {
    (raw10 >> 2) as u8
}

#[derive(Debug)]
pub enum Error<E> {
    Spi(E),
}

/// MCP3008 converter behind an SPI device (chip select owned by the device)
pub struct Mcp3008<SPI> {
    spi: SPI,
}

impl<SPI, E> Mcp3008<SPI>
where
    SPI: SpiDevice<Error = E>,
    E: core::fmt::Debug,
{
    pub fn new(spi: SPI) -> Self {
        Self { spi }
    }

    pub fn destroy(self) -> SPI {
        self.spi
    }

    /// Raw 10-bit conversion for a valid channel
    pub fn read_raw(&mut self, channel_id: u8) -> Result<u16, Error<E>> {
        let mut buf = [command_byte(channel_id), 0, 0];
        self.spi.transfer_in_place(&mut buf).map_err(Error::Spi)?;
        Ok(raw_conversion(buf[1], buf[2]))
    }
}

impl<SPI, E> PressureSource for Mcp3008<SPI>
where
    SPI: SpiDevice<Error = E>,
    E: core::fmt::Debug,
{
    type Error = Error<E>;

    fn read_channel(&mut self, channel_id: u8) -> Result<Conversion, Self::Error> {
        if !is_valid_channel(channel_id) {
            return Ok(Conversion::NotAttempted);
        }
        let raw = self.read_raw(channel_id)?;
        Ok(Conversion::Sample(rescale(raw)))
    }
}
