//! The seam between this driver and ST's ultra low power (ULP) ranging
//! algorithm.
//!
//! The algorithm is a black box. It drives the sensor exclusively through a
//! [`Platform`], and the driver drives the algorithm exclusively through the
//! entry points of [`Ulp`]. Both sides address the sensor with the 8-bit
//! device identifier the algorithm was handed (`address << 1`).

use crate::i2c::TransportError;
use crate::Measurement;

/// Status byte the algorithm reports for a failed register access.
pub const TRANSPORT_FAILURE: u8 = 255;

/// A non-zero status byte returned by the algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UlpError(pub u8);

impl UlpError {
    /// Map a raw status byte, where zero means success.
    #[inline]
    pub const fn check(status: u8) -> UlpResult {
        if status == 0 {
            Ok(())
        } else {
            Err(UlpError(status))
        }
    }
}

impl From<TransportError> for UlpError {
    fn from(_: TransportError) -> Self {
        UlpError(TRANSPORT_FAILURE)
    }
}

/// Result of an algorithm entry point.
pub type UlpResult<T = ()> = Result<T, UlpError>;

/// Convert a 7-bit bus address into the algorithm's device identifier.
#[inline]
pub const fn device_id(address: u8) -> u16 {
    (address as u16) << 1
}

/// Register access and timing the algorithm needs from the host.
pub trait Platform {
    /// Fill `buf` from consecutive registers starting at `reg`.
    fn read(&mut self, dev: u16, reg: u16, buf: &mut [u8]) -> Result<(), TransportError>;

    /// Write `data` to consecutive registers starting at `reg`.
    fn write(&mut self, dev: u16, reg: u16, data: &[u8]) -> Result<(), TransportError>;

    /// Block for `ms` milliseconds.
    fn wait_ms(&mut self, ms: u32);

    /// Read a [`u8`] register.
    fn read_byte(&mut self, dev: u16, reg: u16) -> Result<u8, TransportError> {
        let mut buf = [0; 1];
        self.read(dev, reg, &mut buf)?;
        Ok(buf[0])
    }

    /// Read a big-endian [`u16`] register.
    fn read_word(&mut self, dev: u16, reg: u16) -> Result<u16, TransportError> {
        let mut buf = [0; 2];
        self.read(dev, reg, &mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    /// Read a big-endian [`u32`] register.
    fn read_dword(&mut self, dev: u16, reg: u16) -> Result<u32, TransportError> {
        let mut buf = [0; 4];
        self.read(dev, reg, &mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    /// Write a [`u8`] register.
    fn write_byte(&mut self, dev: u16, reg: u16, value: u8) -> Result<(), TransportError> {
        self.write(dev, reg, &[value])
    }

    /// Write a big-endian [`u16`] register.
    fn write_word(&mut self, dev: u16, reg: u16, value: u16) -> Result<(), TransportError> {
        self.write(dev, reg, &value.to_be_bytes())
    }

    /// Write a big-endian [`u32`] register.
    fn write_dword(&mut self, dev: u16, reg: u16, value: u32) -> Result<(), TransportError> {
        self.write(dev, reg, &value.to_be_bytes())
    }
}

/// Entry points of the ranging algorithm.
///
/// Every call gets the platform to run its register traffic on. None of these
/// are interpreted by the driver beyond success or failure.
pub trait Ulp {
    /// Read the model id register (0xEACC for a VL53L1X).
    fn get_sensor_id(&mut self, dev: u16, platform: &mut dyn Platform) -> UlpResult<u16>;

    /// Boot the sensor and load the default configuration.
    fn sensor_init(&mut self, dev: u16, platform: &mut dyn Platform) -> UlpResult;

    /// Start continuous ranging.
    fn start_ranging(&mut self, dev: u16, platform: &mut dyn Platform) -> UlpResult;

    /// Start a single measurement.
    fn start_ranging_single_shot(&mut self, dev: u16, platform: &mut dyn Platform)
        -> UlpResult;

    /// Stop ranging.
    fn stop_ranging(&mut self, dev: u16, platform: &mut dyn Platform) -> UlpResult;

    /// Whether a measurement is waiting to be read.
    fn check_for_data_ready(&mut self, dev: u16, platform: &mut dyn Platform)
        -> UlpResult<bool>;

    /// Acknowledge the current measurement so the next one can be produced.
    fn clear_interrupt(&mut self, dev: u16, platform: &mut dyn Platform) -> UlpResult;

    /// Read every field of the current measurement.
    fn dump_debug_data(&mut self, dev: u16, platform: &mut dyn Platform)
        -> UlpResult<Measurement>;

    /// Set the macro timing (1..=255).
    fn set_macro_timing(
        &mut self,
        dev: u16,
        platform: &mut dyn Platform,
        macro_timing: u16,
    ) -> UlpResult;

    /// Set the inter-measurement period in milliseconds.
    fn set_inter_measurement_in_ms(
        &mut self,
        dev: u16,
        platform: &mut dyn Platform,
        inter_measurement_ms: u32,
    ) -> UlpResult;

    /// Set the width of the square region of interest in SPADs (4..=16).
    fn set_roi(&mut self, dev: u16, platform: &mut dyn Platform, roi_width: u8) -> UlpResult;

    /// Set the sigma threshold in millimeters.
    fn set_sigma_threshold(
        &mut self,
        dev: u16,
        platform: &mut dyn Platform,
        sigma_mm: u16,
    ) -> UlpResult;

    /// Set the signal threshold in kcps.
    fn set_signal_threshold(
        &mut self,
        dev: u16,
        platform: &mut dyn Platform,
        signal_kcps: u16,
    ) -> UlpResult;
}
