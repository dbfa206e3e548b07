//! Bus backend for any [`embedded_hal::i2c::I2c`] implementation.
//!
//! The controller lives in a [`RefCell`] so that several devices, each a
//! [`RefCellDevice`], can share it from one execution context.

use core::cell::RefCell;
use core::time::Duration;

use embedded_hal::i2c::{I2c, Operation};
use embedded_hal_bus::i2c::RefCellDevice;

use crate::bus::{Bus, BusDevice, DeviceConfig};

/// A shared `embedded-hal` I²C controller.
pub struct HalBus<'a, I2C> {
    bus: &'a RefCell<I2C>,
}

impl<'a, I2C: I2c> HalBus<'a, I2C> {
    /// Manage devices on `bus`.
    pub fn new(bus: &'a RefCell<I2C>) -> Self {
        Self { bus }
    }
}

impl<'a, I2C: I2c> Bus for HalBus<'a, I2C> {
    type Device = HalDevice<'a, I2C>;
    type Error = I2C::Error;

    /// Probe with an empty write. `embedded-hal` has no notion of a timeout,
    /// so `timeout` is left to the controller's own configuration.
    fn probe(&mut self, address: u8, _timeout: Duration) -> Result<(), I2C::Error> {
        trace!("probe {:#04x}", address);
        self.bus.borrow_mut().write(address, &[])
    }

    /// The clock speed is a property of the controller in `embedded-hal`, so
    /// `config.scl_speed_hz` is not applied here.
    fn add_device(&mut self, config: &DeviceConfig) -> Result<HalDevice<'a, I2C>, I2C::Error> {
        debug!("attach {:#04x}", config.address);
        Ok(HalDevice {
            address: config.address,
            i2c: RefCellDevice::new(self.bus),
        })
    }
}

/// One device on a [`HalBus`].
pub struct HalDevice<'a, I2C> {
    address: u8,
    i2c: RefCellDevice<'a, I2C>,
}

impl<I2C: I2c> BusDevice for HalDevice<'_, I2C> {
    type Error = I2C::Error;

    fn address(&self) -> u8 {
        self.address
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), I2C::Error> {
        self.i2c.write(self.address, bytes)
    }

    fn write_split(&mut self, head: &[u8], tail: &[u8]) -> Result<(), I2C::Error> {
        // adjacent writes are merged into one transfer without a restart
        self.i2c.transaction(
            self.address,
            &mut [Operation::Write(head), Operation::Write(tail)],
        )
    }

    fn write_read(&mut self, bytes: &[u8], buf: &mut [u8]) -> Result<(), I2C::Error> {
        self.i2c.write_read(self.address, bytes, buf)
    }

    fn detach(self) -> Result<(), (I2C::Error, Self)> {
        Ok(())
    }
}
