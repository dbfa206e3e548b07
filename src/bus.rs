//! Bus manager abstractions.
//!
//! A [`Bus`] owns the physical I²C controller. It can check whether something
//! answers at an address and attach a [`BusDevice`] to it. A device performs
//! whole transactions at its own address; every method below is exactly one
//! bus transaction.

use core::fmt::Debug;
use core::time::Duration;

/// Default SCL clock for attached devices.
pub const DEFAULT_SCL_SPEED_HZ: u32 = 400_000;

/// How a device is attached to the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    /// 7-bit I²C address.
    pub address: u8,
    /// SCL clock used for transactions with this device.
    pub scl_speed_hz: u32,
}

impl DeviceConfig {
    /// A device at `address` clocked at [`DEFAULT_SCL_SPEED_HZ`].
    pub const fn new(address: u8) -> Self {
        Self {
            address,
            scl_speed_hz: DEFAULT_SCL_SPEED_HZ,
        }
    }
}

/// Owner of a physical bus.
pub trait Bus {
    /// Device handle created by [`Bus::add_device`].
    type Device: BusDevice<Error = Self::Error>;
    /// Error type for bus operations.
    type Error: Debug;

    /// Check that a device acknowledges `address`, giving up after `timeout`.
    fn probe(&mut self, address: u8, timeout: Duration) -> Result<(), Self::Error>;

    /// Attach a device representation to the bus.
    fn add_device(&mut self, config: &DeviceConfig) -> Result<Self::Device, Self::Error>;
}

/// A device attached to a [`Bus`].
pub trait BusDevice: Sized {
    /// Error type for transactions.
    type Error: Debug;

    /// 7-bit address this device talks to.
    fn address(&self) -> u8;

    /// Write `bytes` in one transaction.
    fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Write `head` immediately followed by `tail` in one transaction, with no
    /// restart between the two segments.
    fn write_split(&mut self, head: &[u8], tail: &[u8]) -> Result<(), Self::Error>;

    /// Write `bytes`, then read into `buf` after a repeated start.
    fn write_read(&mut self, bytes: &[u8], buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Detach from the bus.
    ///
    /// On failure the device is handed back together with the error so that
    /// it is not lost.
    fn detach(self) -> Result<(), (Self::Error, Self)>;
}
