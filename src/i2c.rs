//! [I²C](https://en.wikipedia.org/wiki/I%C2%B2C) register transport.
//!
//! Every register access is a single transaction: the 2-byte big-endian
//! register address immediately followed by the payload.

use crate::bus::BusDevice;
use crate::ulp::Platform;
use crate::wait::Timer;

/// Payloads up to this length are copied next to the register address and
/// sent as one buffer. Longer payloads go out as a split write.
pub const MAX_INLINE_PAYLOAD: usize = 16;

/// A register access failed. The cause (NACK, arbitration loss, missing
/// device...) is deliberately not kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("register transport failure")]
pub struct TransportError;

/// Read consecutive registers starting at `reg` from `device`.
pub fn read_bytes<D: BusDevice>(
    device: &mut D,
    reg: u16,
    buf: &mut [u8],
) -> Result<(), TransportError> {
    trace!("read {:#06x} len {}", reg, buf.len());
    device.write_read(&reg.to_be_bytes(), buf).map_err(|_e| {
        debug!("read {:#06x} failed: {:?}", reg, _e);
        TransportError
    })
}

/// Write `data` to consecutive registers starting at `reg` on `device`.
pub fn write_bytes<D: BusDevice>(
    device: &mut D,
    reg: u16,
    data: &[u8],
) -> Result<(), TransportError> {
    trace!("write {:#06x} {:x?}", reg, data);
    let result = if data.len() <= MAX_INLINE_PAYLOAD {
        let mut msg = [0; 2 + MAX_INLINE_PAYLOAD]; // 2 bytes for register selection, rest for data
        msg[..2].copy_from_slice(&reg.to_be_bytes());
        msg[2..2 + data.len()].copy_from_slice(data);
        device.write(&msg[..2 + data.len()])
    } else {
        device.write_split(&reg.to_be_bytes(), data)
    };
    result.map_err(|_e| {
        debug!("write {:#06x} failed: {:?}", reg, _e);
        TransportError
    })
}

/// Register transport bound to at most one device.
///
/// The bound device receives every register access regardless of the device
/// identifier the algorithm passes. Without a bound device every access fails.
pub struct Transport<D, T> {
    device: Option<D>,
    timer: T,
}

impl<D: BusDevice, T: Timer> Transport<D, T> {
    /// An unbound transport.
    pub fn new(timer: T) -> Self {
        Self {
            device: None,
            timer,
        }
    }

    /// Route all register traffic to `device`, returning the device that was
    /// bound before.
    pub fn bind(&mut self, device: D) -> Option<D> {
        debug!("bound device at {:#04x}", device.address());
        self.device.replace(device)
    }

    /// Remove the bound device.
    pub fn unbind(&mut self) -> Option<D> {
        self.device.take()
    }

    /// Whether a device is bound.
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.device.is_some()
    }

    /// Timer used for delays.
    #[inline]
    pub fn timer(&mut self) -> &mut T {
        &mut self.timer
    }
}

impl<D: BusDevice, T: Timer> Platform for Transport<D, T> {
    fn read(&mut self, _dev: u16, reg: u16, buf: &mut [u8]) -> Result<(), TransportError> {
        let device = self.device.as_mut().ok_or(TransportError)?;
        read_bytes(device, reg, buf)
    }

    fn write(&mut self, _dev: u16, reg: u16, data: &[u8]) -> Result<(), TransportError> {
        let device = self.device.as_mut().ok_or(TransportError)?;
        write_bytes(device, reg, data)
    }

    fn wait_ms(&mut self, ms: u32) {
        self.timer.wait_ms(ms);
    }
}
