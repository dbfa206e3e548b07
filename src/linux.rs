//! Bus backend for Linux `i2c-dev` character devices.

use std::path::{Path, PathBuf};
use std::time::Duration;

use i2cdev::core::{I2CDevice, I2CMessage, I2CTransfer};
use i2cdev::linux::{LinuxI2CDevice, LinuxI2CError, LinuxI2CMessage};

use crate::bus::{Bus, BusDevice, DeviceConfig};

/// An I²C adapter such as `/dev/i2c-1`.
#[derive(Debug, Clone)]
pub struct LinuxBus {
    path: PathBuf,
}

impl LinuxBus {
    /// Manage devices on the adapter at `path`. Nothing is opened yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the adapter.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Bus for LinuxBus {
    type Device = LinuxDevice;
    type Error = LinuxI2CError;

    /// Probe with an SMBus quick write. The kernel applies the adapter's own
    /// timeout, `timeout` is not enforced here.
    fn probe(&mut self, address: u8, _timeout: Duration) -> Result<(), LinuxI2CError> {
        trace!("probe {:#04x} on {:?}", address, self.path);
        let mut dev = LinuxI2CDevice::new(&self.path, u16::from(address))?;
        dev.smbus_write_quick(false)
    }

    /// The bus clock is fixed by the adapter's device tree, so
    /// `config.scl_speed_hz` is not applied.
    fn add_device(&mut self, config: &DeviceConfig) -> Result<LinuxDevice, LinuxI2CError> {
        debug!("attach {:#04x} on {:?}", config.address, self.path);
        Ok(LinuxDevice {
            address: config.address,
            dev: LinuxI2CDevice::new(&self.path, u16::from(config.address))?,
        })
    }
}

/// One device on a [`LinuxBus`], holding its own file descriptor.
pub struct LinuxDevice {
    address: u8,
    dev: LinuxI2CDevice,
}

impl BusDevice for LinuxDevice {
    type Error = LinuxI2CError;

    fn address(&self) -> u8 {
        self.address
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), LinuxI2CError> {
        self.dev.write(bytes)
    }

    fn write_split(&mut self, head: &[u8], tail: &[u8]) -> Result<(), LinuxI2CError> {
        // not every adapter supports I2C_M_NOSTART, so join the halves
        let mut msg = Vec::with_capacity(head.len() + tail.len());
        msg.extend_from_slice(head);
        msg.extend_from_slice(tail);
        self.dev.write(&msg)
    }

    fn write_read(&mut self, bytes: &[u8], buf: &mut [u8]) -> Result<(), LinuxI2CError> {
        let address = u16::from(self.address);
        let mut msgs = [
            LinuxI2CMessage::write(bytes).with_address(address),
            LinuxI2CMessage::read(buf).with_address(address),
        ];
        self.dev.transfer(&mut msgs[..]).map(drop)
    }

    fn detach(self) -> Result<(), (LinuxI2CError, Self)> {
        // closing the file descriptor is all there is to it
        Ok(())
    }
}
