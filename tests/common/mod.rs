#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use vl53l1x_ulp::{Measurement, Platform, Ulp, UlpError, UlpResult, Vl53l1x};

#[path = "../../src/testing.rs"]
mod spy;

pub use spy::*;

// ---------------------------------------------------------------------------
// Scripted ranging algorithm
// ---------------------------------------------------------------------------

pub const REG_SENSOR_ID: u16 = 0x010f;
pub const REG_CONFIG_BLOCK: u16 = 0x002d;
pub const REG_DATA_READY: u16 = 0x0031;
pub const REG_MACRO_TIMING: u16 = 0x005e;
pub const REG_INTER_MEASUREMENT: u16 = 0x006c;
pub const REG_ROI: u16 = 0x007f;
pub const REG_SIGMA_THRESHOLD: u16 = 0x0064;
pub const REG_SIGNAL_THRESHOLD: u16 = 0x0066;
pub const REG_CLEAR_INTERRUPT: u16 = 0x0086;
pub const REG_SYSTEM_START: u16 = 0x0087;
pub const REG_RESULT: u16 = 0x0089;

pub const CONFIG_BLOCK_LEN: usize = 91;

#[derive(Default)]
pub struct Script {
    /// Number of "not ready" answers before data is ready. `None` never gets
    /// ready.
    pub ready_after: Option<usize>,
    /// Entry points that report the given status instead of running.
    pub failing: HashMap<&'static str, u8>,
    pub measurement: Measurement,
    pub calls: Vec<&'static str>,
    pub ready_checks: usize,
}

/// Stand-in for the vendor library. Drives the sensor through the platform
/// with plausible register traffic and answers according to its [`Script`].
#[derive(Clone, Default)]
pub struct ScriptedUlp {
    pub script: Rc<RefCell<Script>>,
}

impl ScriptedUlp {
    pub fn ready_after(self, polls: usize) -> Self {
        self.script.borrow_mut().ready_after = Some(polls);
        self
    }

    pub fn measuring(self, measurement: Measurement) -> Self {
        self.script.borrow_mut().measurement = measurement;
        self
    }

    pub fn failing(&self, call: &'static str, status: u8) {
        self.script.borrow_mut().failing.insert(call, status);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.script.borrow().calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.script.borrow().calls.iter().filter(|c| **c == call).count()
    }

    pub fn ready_checks(&self) -> usize {
        self.script.borrow().ready_checks
    }

    fn enter(&self, call: &'static str) -> UlpResult {
        let mut script = self.script.borrow_mut();
        script.calls.push(call);
        match script.failing.get(call) {
            Some(&status) => Err(UlpError(status)),
            None => Ok(()),
        }
    }
}

impl Ulp for ScriptedUlp {
    fn get_sensor_id(&mut self, dev: u16, platform: &mut dyn Platform) -> UlpResult<u16> {
        self.enter("get_sensor_id")?;
        Ok(platform.read_word(dev, REG_SENSOR_ID)?)
    }

    fn sensor_init(&mut self, dev: u16, platform: &mut dyn Platform) -> UlpResult {
        self.enter("sensor_init")?;
        platform.wait_ms(1);
        platform.write(dev, REG_CONFIG_BLOCK, &[0x01; CONFIG_BLOCK_LEN])?;
        Ok(())
    }

    fn start_ranging(&mut self, dev: u16, platform: &mut dyn Platform) -> UlpResult {
        self.enter("start_ranging")?;
        Ok(platform.write_byte(dev, REG_SYSTEM_START, 0x40)?)
    }

    fn start_ranging_single_shot(
        &mut self,
        dev: u16,
        platform: &mut dyn Platform,
    ) -> UlpResult {
        self.enter("start_ranging_single_shot")?;
        Ok(platform.write_byte(dev, REG_SYSTEM_START, 0x10)?)
    }

    fn stop_ranging(&mut self, dev: u16, platform: &mut dyn Platform) -> UlpResult {
        self.enter("stop_ranging")?;
        Ok(platform.write_byte(dev, REG_SYSTEM_START, 0x00)?)
    }

    fn check_for_data_ready(
        &mut self,
        dev: u16,
        platform: &mut dyn Platform,
    ) -> UlpResult<bool> {
        self.enter("check_for_data_ready")?;
        platform.read_byte(dev, REG_DATA_READY)?;
        let mut script = self.script.borrow_mut();
        let ready = matches!(script.ready_after, Some(n) if script.ready_checks >= n);
        script.ready_checks += 1;
        Ok(ready)
    }

    fn clear_interrupt(&mut self, dev: u16, platform: &mut dyn Platform) -> UlpResult {
        self.enter("clear_interrupt")?;
        Ok(platform.write_byte(dev, REG_CLEAR_INTERRUPT, 0x01)?)
    }

    fn dump_debug_data(
        &mut self,
        dev: u16,
        platform: &mut dyn Platform,
    ) -> UlpResult<Measurement> {
        self.enter("dump_debug_data")?;
        let mut raw = [0; 9];
        platform.read(dev, REG_RESULT, &mut raw)?;
        Ok(self.script.borrow().measurement)
    }

    fn set_macro_timing(
        &mut self,
        dev: u16,
        platform: &mut dyn Platform,
        macro_timing: u16,
    ) -> UlpResult {
        self.enter("set_macro_timing")?;
        Ok(platform.write_word(dev, REG_MACRO_TIMING, macro_timing)?)
    }

    fn set_inter_measurement_in_ms(
        &mut self,
        dev: u16,
        platform: &mut dyn Platform,
        inter_measurement_ms: u32,
    ) -> UlpResult {
        self.enter("set_inter_measurement_in_ms")?;
        Ok(platform.write_dword(dev, REG_INTER_MEASUREMENT, inter_measurement_ms)?)
    }

    fn set_roi(&mut self, dev: u16, platform: &mut dyn Platform, roi_width: u8) -> UlpResult {
        self.enter("set_roi")?;
        Ok(platform.write_byte(dev, REG_ROI, roi_width)?)
    }

    fn set_sigma_threshold(
        &mut self,
        dev: u16,
        platform: &mut dyn Platform,
        sigma_mm: u16,
    ) -> UlpResult {
        self.enter("set_sigma_threshold")?;
        Ok(platform.write_word(dev, REG_SIGMA_THRESHOLD, sigma_mm)?)
    }

    fn set_signal_threshold(
        &mut self,
        dev: u16,
        platform: &mut dyn Platform,
        signal_kcps: u16,
    ) -> UlpResult {
        self.enter("set_signal_threshold")?;
        Ok(platform.write_word(dev, REG_SIGNAL_THRESHOLD, signal_kcps)?)
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub type Sensor = Vl53l1x<SpyDevice, ScriptedUlp, ManualTimer>;

pub struct Rig {
    pub bus: SpyBus,
    pub ulp: ScriptedUlp,
    pub timer: ManualTimer,
    pub sensor: Sensor,
}

impl Rig {
    pub fn new(ulp: ScriptedUlp) -> Self {
        let timer = ManualTimer::default();
        Self {
            bus: SpyBus::default(),
            sensor: Vl53l1x::new(ulp.clone(), timer.clone()),
            ulp,
            timer,
        }
    }

    /// A sensor bound at `0x29` with the model id in place.
    pub fn bound(ulp: ScriptedUlp) -> Self {
        let mut rig = Self::new(ulp);
        rig.bus.wire.poke(0x29, REG_SENSOR_ID, &[0xea, 0xcc]);
        rig.sensor.init(&mut rig.bus, 0x29).unwrap();
        rig
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.bus.wire.frames()
    }
}
