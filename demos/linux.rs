//! Continuous long range measurements on `/dev/i2c-1`.
//!
//! Needs `libvl53l1x_ulp` on the linker path, for example through
//! `RUSTFLAGS="-L /path/to/ulp/build"`.

use std::thread;
use std::time::Duration;

use vl53l1x_ulp::ffi::UlpLibrary;
use vl53l1x_ulp::linux::LinuxBus;
use vl53l1x_ulp::wait::StdTimer;
use vl53l1x_ulp::{Vl53l1x, PERIPHERAL_ADDR, SENSOR_ID};

fn main() -> anyhow::Result<()> {
    let mut bus = LinuxBus::new("/dev/i2c-1");
    let mut vl53 = Vl53l1x::new(UlpLibrary, StdTimer::new());

    vl53.init(&mut bus, PERIPHERAL_ADDR)?;

    let id = vl53.get_sensor_id()?;
    println!("sensor id: {id:#06x}");
    if id != SENSOR_ID {
        anyhow::bail!("not a VL53L1X");
    }

    vl53.sensor_init()?;

    // drop these two for the short range default, which is faster
    vl53.config_long_100ms()?;
    vl53.set_macro_timing(16)?;

    vl53.start()?;

    loop {
        match vl53.read(200) {
            Ok(m) if m.is_valid() => println!(
                "{} mm (sigma {} mm, signal {} kcps, ambient {} kcps)",
                m.distance_mm, m.sigma_mm, m.signal_kcps, m.ambient_kcps
            ),
            Ok(m) => println!("{:?}: {} mm", m.range_status(), m.distance_mm),
            Err(e) if e.is_timeout() => println!("no measurement within 200 ms"),
            Err(e) => return Err(e.into()),
        }
        thread::sleep(Duration::from_millis(50));
    }
}
