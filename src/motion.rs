//! Motion sampling
//!
//! Reads 3-axis acceleration from an ADXL345-class accelerometer over I2C and
//! converts raw counts to g.

use crate::types::AccelerationSample;
use embedded_hal::i2c::I2c;

/// Default I2C address of the accelerometer
pub const ADXL345_ADDRESS: u8 = 0x53;

/// Register map subset used by the driver
pub mod registers {
    pub const POWER_CTL: u8 = 0x2D;
    pub const DATA_FORMAT: u8 = 0x31;
    pub const DATAX0: u8 = 0x32;

    /// POWER_CTL value enabling measurement mode
    pub const MEASURE: u8 = 0x08;
    /// DATA_FORMAT value selecting full resolution at ±2 g
    pub const FULL_RES_2G: u8 = 0x08;
}

/// Configured range in g
pub const RANGE_G: f64 = 2.0;

/// g per raw count
pub const SCALE_FACTOR: f64 = RANGE_G * 2.0 / 512.0;

/// Anything that yields acceleration samples
pub trait MotionSource {
    type Error: core::fmt::Debug;

    fn read_acceleration(&mut self) -> Result<AccelerationSample, Self::Error>;
}

#[derive(Debug)]
pub enum Error<E> {
    I2c(E),
}

/// ADXL345 accelerometer on an I2C bus
pub struct Adxl345<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C, E> Adxl345<I2C>
where
    I2C: I2c<Error = E>,
    E: core::fmt::Debug,
{
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    pub fn with_default_address(i2c: I2C) -> Self {
        Self::new(i2c, ADXL345_ADDRESS)
    }

    /// Release the bus
    pub fn destroy(self) -> I2C {
        self.i2c
    }

    /// Enter measurement mode at full resolution, ±2 g
    pub fn init(&mut self) -> Result<(), Error<E>> {
        self.write_reg(registers::POWER_CTL, registers::MEASURE)?;
        self.write_reg(registers::DATA_FORMAT, registers::FULL_RES_2G)?;
        Ok(())
    }

    pub fn write_reg(&mut self, reg: u8, val: u8) -> Result<(), Error<E>> {
        self.i2c
            .write(self.address, &[reg, val])
            .map_err(Error::I2c)
    }

    /// Raw little-endian axis counts
    pub fn read_raw(&mut self) -> Result<[i16; 3], Error<E>> {
        let mut buf = [0u8; 6];
        self.i2c
            .write_read(self.address, &[registers::DATAX0], &mut buf)
            .map_err(Error::I2c)?;
        Ok([
            i16::from_le_bytes([buf[0], buf[1]]),
            i16::from_le_bytes([buf[2], buf[3]]),
            i16::from_le_bytes([buf[4], buf[5]]),
        ])
    }
}

impl<I2C, E> MotionSource for Adxl345<I2C>
where
    I2C: I2c<Error = E>,
    E: core::fmt::Debug,
{
    type Error = Error<E>;

    fn read_acceleration(&mut self) -> Result<AccelerationSample, Self::Error> {
        let [x, y, z] = self.read_raw()?;
        Ok(AccelerationSample::new(
            f64::from(x) * SCALE_FACTOR,
            f64::from(y) * SCALE_FACTOR,
            f64::from(z) * SCALE_FACTOR,
        ))
    }
}
