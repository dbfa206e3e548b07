//! Spy bus and manual clock shared by the unit and integration tests.
//!
//! Only the public API is used here, so the integration tests can include
//! this file as well.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use core::time::Duration;

use vl53l1x_ulp::bus::{Bus, BusDevice, DeviceConfig};
use vl53l1x_ulp::wait::Timer;

/// Error produced by the spy bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpyError {
    Nack,
    Detach,
}

/// One transaction as it went over the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub address: u8,
    pub bytes: Vec<u8>,
    pub read_len: usize,
    pub split: bool,
}

impl Frame {
    pub fn reg(&self) -> u16 {
        u16::from_be_bytes([self.bytes[0], self.bytes[1]])
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[2..]
    }
}

#[derive(Default)]
struct WireState {
    frames: Vec<Frame>,
    memory: HashMap<(u8, u16), u8>,
    fail_next: usize,
    fail_detach: bool,
    absent: Vec<u8>,
    probes: Vec<(u8, Duration)>,
    attached: Vec<DeviceConfig>,
    detached: Vec<u8>,
}

/// Shared view of everything that went over the spy bus.
#[derive(Clone, Default)]
pub struct Wire(Rc<RefCell<WireState>>);

impl Wire {
    pub fn frames(&self) -> Vec<Frame> {
        self.0.borrow().frames.clone()
    }

    /// Fail the next `n` transactions.
    pub fn fail_next(&self, n: usize) {
        self.0.borrow_mut().fail_next = n;
    }

    /// Fail every transaction from now on.
    pub fn break_bus(&self) {
        self.fail_next(usize::MAX);
    }

    pub fn fail_detach(&self, fail: bool) {
        self.0.borrow_mut().fail_detach = fail;
    }

    pub fn mark_absent(&self, address: u8) {
        self.0.borrow_mut().absent.push(address);
    }

    /// Preload registers of the device at `address`.
    pub fn poke(&self, address: u8, reg: u16, bytes: &[u8]) {
        let mut state = self.0.borrow_mut();
        for (i, &byte) in bytes.iter().enumerate() {
            state.memory.insert((address, reg.wrapping_add(i as u16)), byte);
        }
    }

    pub fn probes(&self) -> Vec<(u8, Duration)> {
        self.0.borrow().probes.clone()
    }

    pub fn attached(&self) -> Vec<u8> {
        self.0.borrow().attached.iter().map(|c| c.address).collect()
    }

    pub fn attached_configs(&self) -> Vec<DeviceConfig> {
        self.0.borrow().attached.clone()
    }

    pub fn detached(&self) -> Vec<u8> {
        self.0.borrow().detached.clone()
    }

    fn transact(&self, frame: Frame, buf: &mut [u8]) -> Result<(), SpyError> {
        let mut state = self.0.borrow_mut();
        state.frames.push(frame.clone());
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(SpyError::Nack);
        }
        let reg = frame.reg();
        if frame.read_len > 0 {
            for (i, byte) in buf.iter_mut().enumerate() {
                let key = (frame.address, reg.wrapping_add(i as u16));
                *byte = state.memory.get(&key).copied().unwrap_or(0);
            }
        } else {
            for (i, &byte) in frame.payload().iter().enumerate() {
                state
                    .memory
                    .insert((frame.address, reg.wrapping_add(i as u16)), byte);
            }
        }
        Ok(())
    }
}

/// A device backed by a register file on the shared [`Wire`].
pub struct SpyDevice {
    address: u8,
    wire: Wire,
}

impl SpyDevice {
    pub fn new(address: u8, wire: Wire) -> Self {
        Self { address, wire }
    }

    fn frame(&self, bytes: Vec<u8>, read_len: usize, split: bool) -> Frame {
        Frame {
            address: self.address,
            bytes,
            read_len,
            split,
        }
    }
}

impl BusDevice for SpyDevice {
    type Error = SpyError;

    fn address(&self) -> u8 {
        self.address
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SpyError> {
        let frame = self.frame(bytes.to_vec(), 0, false);
        self.wire.transact(frame, &mut [])
    }

    fn write_split(&mut self, head: &[u8], tail: &[u8]) -> Result<(), SpyError> {
        let frame = self.frame([head, tail].concat(), 0, true);
        self.wire.transact(frame, &mut [])
    }

    fn write_read(&mut self, bytes: &[u8], buf: &mut [u8]) -> Result<(), SpyError> {
        let frame = self.frame(bytes.to_vec(), buf.len(), false);
        self.wire.transact(frame, buf)
    }

    fn detach(self) -> Result<(), (SpyError, Self)> {
        if self.wire.0.borrow().fail_detach {
            return Err((SpyError::Detach, self));
        }
        self.wire.0.borrow_mut().detached.push(self.address);
        Ok(())
    }
}

/// Bus whose devices all share one [`Wire`].
#[derive(Clone, Default)]
pub struct SpyBus {
    pub wire: Wire,
}

impl Bus for SpyBus {
    type Device = SpyDevice;
    type Error = SpyError;

    fn probe(&mut self, address: u8, timeout: Duration) -> Result<(), SpyError> {
        let mut state = self.wire.0.borrow_mut();
        state.probes.push((address, timeout));
        if state.absent.contains(&address) {
            Err(SpyError::Nack)
        } else {
            Ok(())
        }
    }

    fn add_device(&mut self, config: &DeviceConfig) -> Result<SpyDevice, SpyError> {
        self.wire.0.borrow_mut().attached.push(*config);
        Ok(SpyDevice::new(config.address, self.wire.clone()))
    }
}

/// Clock that only moves when somebody waits on it.
#[derive(Clone, Default)]
pub struct ManualTimer {
    now: Rc<Cell<u64>>,
    waits: Rc<RefCell<Vec<u32>>>,
}

impl ManualTimer {
    pub fn waits(&self) -> Vec<u32> {
        self.waits.borrow().clone()
    }
}

impl Timer for ManualTimer {
    fn now_ms(&mut self) -> u64 {
        self.now.get()
    }

    fn wait_ms(&mut self, ms: u32) {
        if ms == 0 {
            return;
        }
        self.waits.borrow_mut().push(ms);
        self.now.set(self.now.get() + u64::from(ms));
    }
}
