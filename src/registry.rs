//! Fixed-capacity table of attached devices, keyed by bus address.
//!
//! The ranging algorithm only ever names a sensor by its device identifier.
//! [`RegistryPlatform`] resolves that identifier through the registry, which
//! lets one algorithm instance drive several sensors on the same bus.

use core::fmt::Debug;

use crate::bus::{Bus, BusDevice, DeviceConfig};
use crate::i2c::{read_bytes, write_bytes, TransportError};
use crate::ulp::Platform;
use crate::wait::Timer;
use crate::{Error, MAX_ADDRESS};

/// Default number of slots.
pub const MAX_DEVICES: usize = 4;

struct Slot<D> {
    address: u8,
    device: D,
}

/// Devices attached to a bus, at most one per address.
pub struct Registry<D, const N: usize = MAX_DEVICES> {
    slots: [Option<Slot<D>>; N],
}

impl<D: BusDevice, const N: usize> Registry<D, N> {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
        }
    }

    /// Attach a device at `config.address` and store it in the first free slot.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if the address is not 7-bit or already
    ///   has a slot.
    /// - [`Error::ResourceExhausted`] if every slot is taken. Nothing is
    ///   attached in that case.
    /// - [`Error::Bus`] if the bus fails to attach the device.
    pub fn add<B>(&mut self, bus: &mut B, config: &DeviceConfig) -> Result<&mut D, Error<D::Error>>
    where
        B: Bus<Device = D, Error = D::Error>,
    {
        if config.address > MAX_ADDRESS {
            error!("invalid address: {:#04x}", config.address);
            return Err(Error::InvalidArgument);
        }
        if self.position(config.address).is_some() {
            error!("address {:#04x} is already registered", config.address);
            return Err(Error::InvalidArgument);
        }
        let free = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(Error::ResourceExhausted)?;

        let device = bus.add_device(config).map_err(Error::Bus)?;
        debug!("registered {:#04x} in slot {}", config.address, free);
        let slot = self.slots[free].insert(Slot {
            address: config.address,
            device,
        });
        Ok(&mut slot.device)
    }

    /// The device registered at `address`.
    pub fn lookup(&mut self, address: u8) -> Option<&mut D> {
        let index = self.position(address)?;
        self.slots[index].as_mut().map(|slot| &mut slot.device)
    }

    /// Whether a device is registered at `address`.
    pub fn contains(&self, address: u8) -> bool {
        self.position(address).is_some()
    }

    /// Detach the device at `address` and free its slot.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if nothing is registered at `address`.
    /// - [`Error::Bus`] with the bus manager's own error if detaching fails.
    ///   The device then stays registered.
    pub fn remove(&mut self, address: u8) -> Result<(), Error<D::Error>> {
        let index = self.position(address).ok_or(Error::NotFound)?;
        let Some(slot) = self.slots[index].take() else {
            return Err(Error::NotFound);
        };

        match slot.device.detach() {
            Ok(()) => {
                debug!("removed {:#04x} from slot {}", address, index);
                Ok(())
            }
            Err((err, device)) => {
                warn!("failed to detach {:#04x}: {:?}", address, err);
                self.slots[index] = Some(Slot { address, device });
                Err(Error::Bus(err))
            }
        }
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Whether no device is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Addresses of all registered devices, in slot order.
    pub fn addresses(&self) -> impl Iterator<Item = u8> + '_ {
        self.slots.iter().flatten().map(|slot| slot.address)
    }

    fn position(&self, address: u8) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| matches!(slot, Some(slot) if slot.address == address))
    }
}

impl<D: BusDevice, const N: usize> Default for Registry<D, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// [`Platform`] that routes every access to the registered device whose
/// address matches the algorithm's device identifier.
pub struct RegistryPlatform<'r, D, T, const N: usize = MAX_DEVICES> {
    registry: &'r mut Registry<D, N>,
    timer: T,
}

impl<'r, D: BusDevice, T: Timer, const N: usize> RegistryPlatform<'r, D, T, N> {
    /// Route through `registry`, delaying with `timer`.
    pub fn new(registry: &'r mut Registry<D, N>, timer: T) -> Self {
        Self { registry, timer }
    }

    fn device(&mut self, dev: u16) -> Result<&mut D, TransportError> {
        let address = u8::try_from(dev >> 1).map_err(|_| TransportError)?;
        self.registry.lookup(address).ok_or_else(|| {
            debug!("no device registered for id {:#06x}", dev);
            TransportError
        })
    }
}

impl<D: BusDevice, T: Timer, const N: usize> Platform for RegistryPlatform<'_, D, T, N> {
    fn read(&mut self, dev: u16, reg: u16, buf: &mut [u8]) -> Result<(), TransportError> {
        read_bytes(self.device(dev)?, reg, buf)
    }

    fn write(&mut self, dev: u16, reg: u16, data: &[u8]) -> Result<(), TransportError> {
        write_bytes(self.device(dev)?, reg, data)
    }

    fn wait_ms(&mut self, ms: u32) {
        self.timer.wait_ms(ms);
    }
}

impl<D: BusDevice, const N: usize> Debug for Registry<D, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.addresses()).finish()
    }
}
