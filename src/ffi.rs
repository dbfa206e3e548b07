//! Binding to ST's C implementation of the ULP algorithm.
//!
//! The library expects its host to provide the `VL53L1X_ULP_Rd*`,
//! `VL53L1X_ULP_Wr*` and `VL53L1X_ULP_WaitMs` callbacks, which are exported
//! from here. Linking `libvl53l1x_ulp` itself and the `UlpLibrary` entry
//! points need the `ulp-link` feature.
//!
//! A callback runs on the platform installed with [`scoped`] on this thread,
//! which is what every `UlpLibrary` entry point does for its duration.
//! Outside of such a scope (for code calling the library directly) callbacks
//! go to the process-wide platform installed with [`bind`]. With neither,
//! every register access reports a transport failure.

#![allow(non_snake_case)]

use std::cell::Cell;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::i2c::TransportError;
use crate::ulp::{Platform, TRANSPORT_FAILURE};
#[cfg(feature = "ulp-link")]
use crate::{
    ulp::{Ulp, UlpError, UlpResult},
    Measurement,
};

#[cfg(feature = "ulp-link")]
#[link(name = "vl53l1x_ulp")]
extern "C" {
    fn VL53L1X_ULP_GetSensorId(dev: u16, p_id: *mut u16) -> u8;
    fn VL53L1X_ULP_SensorInit(dev: u16) -> u8;
    fn VL53L1X_ULP_StartRanging(dev: u16) -> u8;
    fn VL53L1X_ULP_StartRangingSingleShot(dev: u16) -> u8;
    fn VL53L1X_ULP_StopRanging(dev: u16) -> u8;
    fn VL53L1X_ULP_CheckForDataReady(dev: u16, p_is_data_ready: *mut u8) -> u8;
    fn VL53L1X_ULP_ClearInterrupt(dev: u16) -> u8;
    fn VL53L1X_ULP_DumpDebugData(
        dev: u16,
        p_measurement_status: *mut u8,
        p_estimated_distance_mm: *mut u16,
        p_sigma_mm: *mut u16,
        p_signal_kcps: *mut u16,
        p_ambient_kcps: *mut u16,
    ) -> u8;
    fn VL53L1X_ULP_SetMacroTiming(dev: u16, macro_timing: u16) -> u8;
    fn VL53L1X_ULP_SetInterMeasurementInMs(dev: u16, inter_measurement_ms: u32) -> u8;
    fn VL53L1X_ULP_SetROI(dev: u16, roi_width: u8) -> u8;
    fn VL53L1X_ULP_SetSigmaThreshold(dev: u16, sigma_mm: u16) -> u8;
    fn VL53L1X_ULP_SetSignalThreshold(dev: u16, signal_kcps: u16) -> u8;
}

type DefaultPlatform = Box<dyn Platform + Send>;

static DEFAULT: Mutex<Option<DefaultPlatform>> = Mutex::new(None);

thread_local! {
    static ACTIVE: Cell<Option<NonNull<dyn Platform>>> = const { Cell::new(None) };
}

/// Install the platform callbacks use outside of a [`scoped`] call, returning
/// the one installed before.
pub fn bind(platform: impl Platform + Send + 'static) -> Option<DefaultPlatform> {
    debug!("binding default platform");
    default_platform().replace(Box::new(platform))
}

/// Remove the platform installed with [`bind`].
pub fn unbind() -> Option<DefaultPlatform> {
    default_platform().take()
}

fn default_platform() -> MutexGuard<'static, Option<DefaultPlatform>> {
    DEFAULT.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Makes `platform` the target of this thread's callbacks until dropped.
struct Active<'a> {
    previous: Option<NonNull<dyn Platform>>,
    _platform: PhantomData<&'a mut dyn Platform>,
}

impl<'a> Active<'a> {
    fn install(platform: &'a mut dyn Platform) -> Self {
        let ptr: NonNull<dyn Platform + 'a> = NonNull::from(platform);
        // SAFETY: the pointer is removed from ACTIVE when the guard drops,
        // which happens before `'a` ends.
        let ptr = unsafe {
            core::mem::transmute::<NonNull<dyn Platform + 'a>, NonNull<dyn Platform + 'static>>(
                ptr,
            )
        };
        Self {
            previous: ACTIVE.with(|active| active.replace(Some(ptr))),
            _platform: PhantomData,
        }
    }
}

impl Drop for Active<'_> {
    fn drop(&mut self) {
        ACTIVE.with(|active| active.set(self.previous));
    }
}

/// Run `f` with `platform` as the target of this thread's callbacks. Scopes
/// nest, the outer platform is restored when `f` returns or unwinds.
pub fn scoped<R>(platform: &mut dyn Platform, f: impl FnOnce() -> R) -> R {
    let _active = Active::install(platform);
    f()
}

/// Run `f` on this thread's active platform, or the default one. Returns the
/// status byte the library expects.
fn with_platform(f: impl FnOnce(&mut dyn Platform) -> Result<(), TransportError>) -> u8 {
    let result = match ACTIVE.with(Cell::get) {
        // SAFETY: installed by an `Active` guard whose borrow is still live.
        // The caller of the library does not touch the platform while the
        // library runs.
        Some(mut ptr) => f(unsafe { ptr.as_mut() }),
        None => match default_platform().as_deref_mut() {
            Some(platform) => f(platform),
            None => {
                debug!("register access without a bound platform");
                Err(TransportError)
            }
        },
    };
    match result {
        Ok(()) => 0,
        Err(TransportError) => TRANSPORT_FAILURE,
    }
}

/// Read a byte register.
///
/// # Safety
///
/// `value` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn VL53L1X_ULP_RdByte(dev: u16, register_addr: u16, value: *mut u8) -> u8 {
    if value.is_null() {
        return TRANSPORT_FAILURE;
    }
    let mut out = 0;
    let status = with_platform(|p| {
        out = p.read_byte(dev, register_addr)?;
        Ok(())
    });
    if status == 0 {
        *value = out;
    }
    status
}

/// Read a word register.
///
/// # Safety
///
/// `value` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn VL53L1X_ULP_RdWord(dev: u16, register_addr: u16, value: *mut u16) -> u8 {
    if value.is_null() {
        return TRANSPORT_FAILURE;
    }
    let mut out = 0;
    let status = with_platform(|p| {
        out = p.read_word(dev, register_addr)?;
        Ok(())
    });
    if status == 0 {
        *value = out;
    }
    status
}

/// Read a double word register.
///
/// # Safety
///
/// `value` must be null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn VL53L1X_ULP_RdDWord(dev: u16, register_addr: u16, value: *mut u32) -> u8 {
    if value.is_null() {
        return TRANSPORT_FAILURE;
    }
    let mut out = 0;
    let status = with_platform(|p| {
        out = p.read_dword(dev, register_addr)?;
        Ok(())
    });
    if status == 0 {
        *value = out;
    }
    status
}

/// Write a byte register.
#[no_mangle]
pub extern "C" fn VL53L1X_ULP_WrByte(dev: u16, register_addr: u16, value: u8) -> u8 {
    with_platform(|p| p.write_byte(dev, register_addr, value))
}

/// Write a word register.
#[no_mangle]
pub extern "C" fn VL53L1X_ULP_WrWord(dev: u16, register_addr: u16, value: u16) -> u8 {
    with_platform(|p| p.write_word(dev, register_addr, value))
}

/// Write a double word register.
#[no_mangle]
pub extern "C" fn VL53L1X_ULP_WrDWord(dev: u16, register_addr: u16, value: u32) -> u8 {
    with_platform(|p| p.write_dword(dev, register_addr, value))
}

/// Block for `time_ms` milliseconds.
#[no_mangle]
pub extern "C" fn VL53L1X_ULP_WaitMs(time_ms: u32) {
    if time_ms == 0 {
        return;
    }
    let status = with_platform(|p| {
        p.wait_ms(time_ms);
        Ok(())
    });
    if status != 0 {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(time_ms)));
    }
}

/// The vendor library as a [`Ulp`].
///
/// Every entry point makes the platform it is given the callback target for
/// the duration of the call. The library keeps its own per-device state, so
/// a device must not be driven from two threads at once.
#[cfg(feature = "ulp-link")]
#[derive(Debug, Default, Clone, Copy)]
pub struct UlpLibrary;

#[cfg(feature = "ulp-link")]
fn run(platform: &mut dyn Platform, call: impl FnOnce() -> u8) -> UlpResult {
    UlpError::check(scoped(platform, call))
}

#[cfg(feature = "ulp-link")]
impl Ulp for UlpLibrary {
    fn get_sensor_id(&mut self, dev: u16, platform: &mut dyn Platform) -> UlpResult<u16> {
        let mut id = 0;
        run(platform, || unsafe { VL53L1X_ULP_GetSensorId(dev, &mut id) })?;
        Ok(id)
    }

    fn sensor_init(&mut self, dev: u16, platform: &mut dyn Platform) -> UlpResult {
        run(platform, || unsafe { VL53L1X_ULP_SensorInit(dev) })
    }

    fn start_ranging(&mut self, dev: u16, platform: &mut dyn Platform) -> UlpResult {
        run(platform, || unsafe { VL53L1X_ULP_StartRanging(dev) })
    }

    fn start_ranging_single_shot(
        &mut self,
        dev: u16,
        platform: &mut dyn Platform,
    ) -> UlpResult {
        run(platform, || unsafe { VL53L1X_ULP_StartRangingSingleShot(dev) })
    }

    fn stop_ranging(&mut self, dev: u16, platform: &mut dyn Platform) -> UlpResult {
        run(platform, || unsafe { VL53L1X_ULP_StopRanging(dev) })
    }

    fn check_for_data_ready(
        &mut self,
        dev: u16,
        platform: &mut dyn Platform,
    ) -> UlpResult<bool> {
        let mut ready = 0;
        run(platform, || unsafe {
            VL53L1X_ULP_CheckForDataReady(dev, &mut ready)
        })?;
        Ok(ready != 0)
    }

    fn clear_interrupt(&mut self, dev: u16, platform: &mut dyn Platform) -> UlpResult {
        run(platform, || unsafe { VL53L1X_ULP_ClearInterrupt(dev) })
    }

    fn dump_debug_data(
        &mut self,
        dev: u16,
        platform: &mut dyn Platform,
    ) -> UlpResult<Measurement> {
        let mut m = Measurement::default();
        run(platform, || unsafe {
            VL53L1X_ULP_DumpDebugData(
                dev,
                &mut m.status,
                &mut m.distance_mm,
                &mut m.sigma_mm,
                &mut m.signal_kcps,
                &mut m.ambient_kcps,
            )
        })?;
        Ok(m)
    }

    fn set_macro_timing(
        &mut self,
        dev: u16,
        platform: &mut dyn Platform,
        macro_timing: u16,
    ) -> UlpResult {
        run(platform, || unsafe {
            VL53L1X_ULP_SetMacroTiming(dev, macro_timing)
        })
    }

    fn set_inter_measurement_in_ms(
        &mut self,
        dev: u16,
        platform: &mut dyn Platform,
        inter_measurement_ms: u32,
    ) -> UlpResult {
        run(platform, || unsafe {
            VL53L1X_ULP_SetInterMeasurementInMs(dev, inter_measurement_ms)
        })
    }

    fn set_roi(&mut self, dev: u16, platform: &mut dyn Platform, roi_width: u8) -> UlpResult {
        run(platform, || unsafe { VL53L1X_ULP_SetROI(dev, roi_width) })
    }

    fn set_sigma_threshold(
        &mut self,
        dev: u16,
        platform: &mut dyn Platform,
        sigma_mm: u16,
    ) -> UlpResult {
        run(platform, || unsafe {
            VL53L1X_ULP_SetSigmaThreshold(dev, sigma_mm)
        })
    }

    fn set_signal_threshold(
        &mut self,
        dev: u16,
        platform: &mut dyn Platform,
        signal_kcps: u16,
    ) -> UlpResult {
        run(platform, || unsafe {
            VL53L1X_ULP_SetSignalThreshold(dev, signal_kcps)
        })
    }
}
