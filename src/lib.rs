//! Driver shim for the [VL53L1X ToF distance sensor](https://www.st.com/en/imaging-and-photonics-solutions/vl53l1x.html)
//! running ST's ultra low power (ULP) ranging algorithm.
//!
//! The algorithm is opaque: this crate plugs it into a bus (see [`ulp`]) and
//! wraps it in a small blocking lifecycle and ranging API.
//!
//! ```no_run
//! # #[cfg(all(feature = "linux", feature = "ulp-link"))]
//! # fn main() -> anyhow::Result<()> {
//! use vl53l1x_ulp::{ffi::UlpLibrary, linux::LinuxBus, wait::StdTimer, Vl53l1x};
//!
//! let mut bus = LinuxBus::new("/dev/i2c-1");
//! let mut vl53 = Vl53l1x::new(UlpLibrary, StdTimer::new());
//!
//! vl53.init(&mut bus, vl53l1x_ulp::PERIPHERAL_ADDR)?;
//! vl53.sensor_init()?;
//! vl53.config_long_100ms()?;
//! vl53.start()?;
//!
//! loop {
//!     let measurement = vl53.read(200)?;
//!     if measurement.is_valid() {
//!         println!("{} mm", measurement.distance_mm);
//!     }
//! }
//! # }
//! # #[cfg(not(all(feature = "linux", feature = "ulp-link")))]
//! # fn main() {}
//! ```

#![warn(missing_docs)]
#![cfg_attr(not(any(feature = "std", test)), no_std)]

mod fmt; // <-- must be first module!

pub mod bus;
mod error;
pub mod i2c;
pub mod registry;
pub mod ulp;
pub mod wait;

#[cfg(feature = "ulp-ffi")]
pub mod ffi;
#[cfg(feature = "hal")]
pub mod hal;
#[cfg(feature = "linux")]
pub mod linux;

#[cfg(test)]
extern crate self as vl53l1x_ulp;
#[cfg(test)]
mod testing;

use core::time::Duration;

#[cfg(feature = "tracing")]
use tracing::instrument;

pub use bus::{Bus, BusDevice, DeviceConfig};
pub use error::Error;
pub use i2c::{Transport, TransportError};
pub use registry::{Registry, RegistryPlatform};
pub use ulp::{Platform, Ulp, UlpError, UlpResult};
pub use wait::{Deadline, Timer};

/// Default I<sup>2</sup>C address of the VL53L1X.
pub const PERIPHERAL_ADDR: u8 = 0x29;

/// Highest valid 7-bit address.
pub const MAX_ADDRESS: u8 = 0x7f;

/// Model id reported by a VL53L1X.
pub const SENSOR_ID: u16 = 0xeacc;

/// How long [`Vl53l1x::init`] waits for the sensor to acknowledge its address.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(100);

/// Poll interval for [`Vl53l1x::read`].
pub const DATA_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Valid macro timings.
pub const MACRO_TIMING_RANGE: core::ops::RangeInclusive<u16> = 1..=255;

/// Valid inter-measurement periods in milliseconds.
pub const INTER_MEASUREMENT_RANGE_MS: core::ops::RangeInclusive<u32> = 20..=60_000;

/// A measurement status, as reported by the ranging algorithm.
///
/// Only the codes listed in ST's ULP user manual (UM2931) are told apart.
/// Every other value is [`RangeStatus::Other`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum RangeStatus {
    /// Returned distance is valid.
    Valid = 0,
    /// Sigma is above the defined threshold.
    SigmaAboveThreshold = 1,
    /// Signal is below the defined threshold.
    SignalBelowThreshold = 2,
    /// Phase out of valid limit.
    InvalidPhase = 4,
    /// Wrapped target, phase does not match.
    WrappedTarget = 7,
    /// Any other status, treated as an error.
    Other = 255,
}

/// Severity of a measurement status.
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord)]
pub enum Severity {
    /// The measurement is completely valid.
    None,
    /// The computed measurement might be somewhat correct.
    Warning,
    /// Something went very wrong.
    Error,
}

impl RangeStatus {
    /// Classify a status byte.
    pub const fn from_status(status: u8) -> Self {
        match status {
            0 => Self::Valid,
            1 => Self::SigmaAboveThreshold,
            2 => Self::SignalBelowThreshold,
            4 => Self::InvalidPhase,
            7 => Self::WrappedTarget,
            _ => Self::Other,
        }
    }

    /// Severity of this status. Threshold misses are warnings, the rest are
    /// errors.
    pub const fn severity(&self) -> Severity {
        match self {
            RangeStatus::Valid => Severity::None,
            RangeStatus::SigmaAboveThreshold | RangeStatus::SignalBelowThreshold => {
                Severity::Warning
            }
            _ => Severity::Error,
        }
    }
}

/// A VL53L1X measurement.
///
/// A non-zero [`status`](Self::status) marks a statistically weak range
/// estimate, not a failed read. Whether to trust it is up to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Measurement {
    /// Range status, zero when the distance is valid.
    pub status: u8,
    /// Measured distance to the target (millimeters).
    pub distance_mm: u16,
    /// Sigma estimator for the noise in the reported
    /// target distance (millimeters).
    pub sigma_mm: u16,
    /// Return signal rate.
    ///
    /// The returned value is measured in thousand counts
    /// per second (kcps) (10<sup>3</sup> * s<sup>-1</sup>).
    pub signal_kcps: u16,
    /// Ambient rate measured with no active photon emission.
    ///
    /// The returned value is measured in thousand counts
    /// per second (kcps) (10<sup>3</sup> * s<sup>-1</sup>).
    pub ambient_kcps: u16,
}

impl Measurement {
    /// Whether this measurement is valid or not, given its status.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.status == 0
    }

    /// Classified status.
    #[inline]
    pub fn range_status(&self) -> RangeStatus {
        RangeStatus::from_status(self.status)
    }
}

/// Tunables of a sensor instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Bound on the presence probe done by [`Vl53l1x::init`].
    pub probe_timeout: Duration,
    /// Sleep between two data-ready checks in [`Vl53l1x::read`].
    pub poll_interval: Duration,
    /// SCL clock of the attached device.
    pub scl_speed_hz: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            probe_timeout: PROBE_TIMEOUT,
            poll_interval: DATA_POLL_INTERVAL,
            scl_speed_hz: bus::DEFAULT_SCL_SPEED_HZ,
        }
    }
}

impl Config {
    fn poll_interval_ms(&self) -> u32 {
        u32::try_from(self.poll_interval.as_millis()).unwrap_or(u32::MAX)
    }
}

/// Where a sensor instance is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No device is bound.
    Uninitialized,
    /// A device answered at the address and is bound.
    Identified,
    /// The algorithm has booted and configured the sensor.
    SensorReady,
    /// Measurements are being produced.
    Ranging,
    /// Ranging was stopped.
    Stopped,
}

/// A VL53L1X ToF range sensor driven by a ranging algorithm `U`.
///
/// Each instance owns its own [`Transport`], so two instances never share
/// register traffic. Calling [`Self::init`] again on a bound instance moves
/// that instance to the new device.
pub struct Vl53l1x<D, U, T> {
    transport: Transport<D, T>,
    ulp: U,
    address: u8,
    state: State,
    config: Config,
}

impl<D, U, T> Vl53l1x<D, U, T>
where
    D: BusDevice,
    U: Ulp,
    T: Timer,
{
    /// Construct a new sensor, without sending
    /// any commands. To begin measuring, you
    /// need to call [`Self::init`], [`Self::sensor_init`]
    /// as well as [`Self::start`].
    pub fn new(ulp: U, timer: T) -> Self {
        Self::with_config(ulp, timer, Config::default())
    }

    /// Like [`Self::new`] with explicit tunables.
    pub fn with_config(ulp: U, timer: T, config: Config) -> Self {
        Self {
            transport: Transport::new(timer),
            ulp,
            address: PERIPHERAL_ADDR,
            state: State::Uninitialized,
            config,
        }
    }

    /// Probe `address` on `bus`, attach a device there and route all register
    /// traffic of this instance to it.
    ///
    /// If the instance was already bound, the previous device is detached and
    /// everything from now on goes to the new one.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `address` is not a 7-bit address. The
    ///   bus is not touched.
    /// - [`Error::Bus`] with the probe's error if nothing answers, or with the
    ///   bus manager's error if attaching fails.
    #[cfg_attr(feature = "tracing", instrument(err(Debug), skip(self, bus)))]
    pub fn init<B>(&mut self, bus: &mut B, address: u8) -> Result<(), Error<D::Error>>
    where
        B: Bus<Device = D, Error = D::Error>,
    {
        if address > MAX_ADDRESS {
            error!("address must be 7-bit: {:#04x}", address);
            return Err(Error::InvalidArgument);
        }

        bus.probe(address, self.config.probe_timeout)
            .map_err(Error::Bus)?;

        let config = DeviceConfig {
            address,
            scl_speed_hz: self.config.scl_speed_hz,
        };
        let device = bus.add_device(&config).map_err(Error::Bus)?;

        if let Some(previous) = self.transport.bind(device) {
            warn!(
                "register traffic moves from {:#04x} to {:#04x}",
                previous.address(),
                address
            );
            if let Err((_err, _)) = previous.detach() {
                warn!("failed to detach previous device: {:?}", _err);
            }
        }

        self.address = address;
        self.state = State::Identified;
        info!("sensor bound at {:#04x}", address);
        Ok(())
    }

    /// Detach the device, if any, and fall back to [`PERIPHERAL_ADDR`].
    /// Calling this on an unbound instance does nothing.
    ///
    /// # Errors
    ///
    /// [`Error::Bus`] if the bus manager fails to detach. The instance is
    /// unbound regardless.
    pub fn deinit(&mut self) -> Result<(), Error<D::Error>> {
        self.state = State::Uninitialized;
        self.address = PERIPHERAL_ADDR;
        match self.transport.unbind() {
            Some(device) => {
                debug!("detaching {:#04x}", device.address());
                device.detach().map_err(|(err, _)| Error::Bus(err))
            }
            None => Ok(()),
        }
    }

    /// Read the model id. A VL53L1X reports [`SENSOR_ID`]; comparing is up to
    /// the caller.
    pub fn get_sensor_id(&mut self) -> Result<u16, Error<D::Error>> {
        let dev = self.dev()?;
        self.ulp
            .get_sensor_id(dev, &mut self.transport)
            .map_err(fail("get sensor id"))
    }

    /// Boot the sensor and load its default configuration. Mandatory before
    /// ranging; on failure, start over from [`Self::init`].
    #[cfg_attr(feature = "tracing", instrument(err(Debug), skip(self)))]
    pub fn sensor_init(&mut self) -> Result<(), Error<D::Error>> {
        let dev = self.dev()?;
        self.ulp
            .sensor_init(dev, &mut self.transport)
            .map_err(fail::<D::Error>("sensor init"))?;
        self.state = State::SensorReady;
        Ok(())
    }

    /// Set the macro timing, roughly the integration time of one measurement.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if `macro_timing` is outside
    /// [`MACRO_TIMING_RANGE`] or the algorithm rejects it.
    pub fn set_macro_timing(&mut self, macro_timing: u16) -> Result<(), Error<D::Error>> {
        let dev = self.dev()?;
        if !MACRO_TIMING_RANGE.contains(&macro_timing) {
            error!("invalid macro timing: {}", macro_timing);
            return Err(Error::InvalidArgument);
        }
        self.ulp
            .set_macro_timing(dev, &mut self.transport, macro_timing)
            .map_err(rejected("macro timing"))
    }

    /// Set the time between the start of two measurements in continuous
    /// ranging.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if `inter_measurement_ms` is outside
    /// [`INTER_MEASUREMENT_RANGE_MS`] or the algorithm rejects it.
    pub fn set_inter_measurement_ms(
        &mut self,
        inter_measurement_ms: u32,
    ) -> Result<(), Error<D::Error>> {
        let dev = self.dev()?;
        if !INTER_MEASUREMENT_RANGE_MS.contains(&inter_measurement_ms) {
            error!("invalid inter measurement: {} ms", inter_measurement_ms);
            return Err(Error::InvalidArgument);
        }
        self.ulp
            .set_inter_measurement_in_ms(dev, &mut self.transport, inter_measurement_ms)
            .map_err(rejected("inter measurement"))
    }

    /// Set the width of the region of interest in SPADs.
    pub fn set_roi(&mut self, roi_width: u8) -> Result<(), Error<D::Error>> {
        let dev = self.dev()?;
        self.ulp
            .set_roi(dev, &mut self.transport, roi_width)
            .map_err(rejected("roi"))
    }

    /// Set the sigma threshold in millimeters.
    pub fn set_sigma_threshold(&mut self, sigma_mm: u16) -> Result<(), Error<D::Error>> {
        let dev = self.dev()?;
        self.ulp
            .set_sigma_threshold(dev, &mut self.transport, sigma_mm)
            .map_err(rejected("sigma threshold"))
    }

    /// Set the signal threshold in kcps.
    pub fn set_signal_threshold(&mut self, signal_kcps: u16) -> Result<(), Error<D::Error>> {
        let dev = self.dev()?;
        self.ulp
            .set_signal_threshold(dev, &mut self.transport, signal_kcps)
            .map_err(rejected("signal threshold"))
    }

    /// Long range preset: one measurement every 100 ms with macro timing 100,
    /// the full 16x16 SPAD array and relaxed sigma/signal thresholds. Reaches
    /// about 1.3 m.
    pub fn config_long_100ms(&mut self) -> Result<(), Error<D::Error>> {
        let dev = self.dev()?;
        long_range_preset(&mut self.ulp, dev, &mut self.transport)
            .map_err(fail("long range preset"))
    }

    /// Begin continuous ranging. Every measurement has to be acknowledged,
    /// which [`Self::read`] does.
    pub fn start(&mut self) -> Result<(), Error<D::Error>> {
        let dev = self.dev()?;
        self.ulp
            .start_ranging(dev, &mut self.transport)
            .map_err(fail::<D::Error>("start ranging"))?;
        self.state = State::Ranging;
        Ok(())
    }

    /// Trigger a single measurement.
    pub fn start_single_shot(&mut self) -> Result<(), Error<D::Error>> {
        let dev = self.dev()?;
        self.ulp
            .start_ranging_single_shot(dev, &mut self.transport)
            .map_err(fail::<D::Error>("start single shot"))?;
        self.state = State::Ranging;
        Ok(())
    }

    /// Stop ranging.
    ///
    /// The instance counts as stopped even if this fails, so that cleanup
    /// paths cannot get stuck on it.
    pub fn stop(&mut self) -> Result<(), Error<D::Error>> {
        let dev = self.dev()?;
        self.state = State::Stopped;
        self.ulp
            .stop_ranging(dev, &mut self.transport)
            .map_err(fail("stop ranging"))
    }

    /// Wait for a measurement, read it and clear the interrupt so that the
    /// sensor produces the next one.
    ///
    /// Data ready is polled every [`Config::poll_interval`]. With a
    /// `timeout_ms` of zero this polls until data is ready or the bus fails.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if no data was ready within `timeout_ms`.
    /// - [`Error::Fail`] if checking, reading or clearing fails. A measurement
    ///   whose interrupt could not be cleared is discarded. If reading the
    ///   measurement fails, the interrupt is left uncleared.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn read(&mut self, timeout_ms: u32) -> Result<Measurement, Error<D::Error>> {
        let dev = self.dev()?;
        let poll_interval_ms = self.config.poll_interval_ms();
        let deadline = Deadline::start(self.transport.timer(), timeout_ms);

        loop {
            let ready = self
                .ulp
                .check_for_data_ready(dev, &mut self.transport)
                .map_err(fail::<D::Error>("check for data ready"))?;
            if ready {
                break;
            }
            if deadline.expired(self.transport.timer()) {
                return Err(Error::Timeout);
            }
            self.transport.timer().wait_ms(poll_interval_ms);
        }

        let measurement = self
            .ulp
            .dump_debug_data(dev, &mut self.transport)
            .map_err(fail::<D::Error>("read measurement"))?;
        trace!("measurement: {:?}", measurement);

        self.ulp
            .clear_interrupt(dev, &mut self.transport)
            .map_err(fail::<D::Error>("clear interrupt"))?;

        Ok(measurement)
    }

    /// Lifecycle state.
    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    /// Address of the bound device, or the default address when unbound.
    #[inline]
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Whether a device is bound.
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.transport.is_bound()
    }

    /// Tunables of this instance.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn dev(&self) -> Result<u16, Error<D::Error>> {
        if self.transport.is_bound() {
            Ok(ulp::device_id(self.address))
        } else {
            error!("sensor is not initialized");
            Err(Error::InvalidArgument)
        }
    }
}

fn long_range_preset<U: Ulp>(ulp: &mut U, dev: u16, platform: &mut dyn Platform) -> UlpResult {
    ulp.set_inter_measurement_in_ms(dev, platform, 100)?;
    ulp.set_macro_timing(dev, platform, 100)?;
    ulp.set_roi(dev, platform, 16)?;
    ulp.set_sigma_threshold(dev, platform, 60)?;
    ulp.set_signal_threshold(dev, platform, 1200)
}

fn fail<E: core::fmt::Debug>(_what: &'static str) -> impl FnOnce(UlpError) -> Error<E> {
    move |_status| {
        debug!("{} failed with status {}", _what, _status.0);
        Error::Fail
    }
}

fn rejected<E: core::fmt::Debug>(_what: &'static str) -> impl FnOnce(UlpError) -> Error<E> {
    move |_status| {
        error!("{} rejected with status {}", _what, _status.0);
        Error::InvalidArgument
    }
}
