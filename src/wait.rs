//! Blocking delays and the clock used to bound the data-ready poll loop.

/// Millisecond delay and clock.
pub trait Timer {
    /// Milliseconds since an arbitrary, fixed point in time.
    fn now_ms(&mut self) -> u64;

    /// Block for `ms` milliseconds. Returns immediately for zero.
    fn wait_ms(&mut self, ms: u32);
}

impl<T: Timer + ?Sized> Timer for &mut T {
    #[inline]
    fn now_ms(&mut self) -> u64 {
        (**self).now_ms()
    }

    #[inline]
    fn wait_ms(&mut self, ms: u32) {
        (**self).wait_ms(ms);
    }
}

/// [`Timer`] backed by the operating system.
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct StdTimer {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdTimer {
    /// A timer whose clock starts now.
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Timer for StdTimer {
    fn now_ms(&mut self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn wait_ms(&mut self, ms: u32) {
        if ms == 0 {
            return;
        }
        std::thread::sleep(core::time::Duration::from_millis(u64::from(ms)));
    }
}

/// [`Timer`] on top of an `embedded-hal` delay.
///
/// `embedded-hal` has no clock, so time only advances by the delays performed
/// through this timer. Time spent in bus transactions is not counted, which
/// makes deadlines measured with it err on the long side.
#[cfg(feature = "hal")]
pub struct DelayTimer<D> {
    delay: D,
    elapsed_ms: u64,
}

#[cfg(feature = "hal")]
impl<D: embedded_hal::delay::DelayNs> DelayTimer<D> {
    /// Wrap `delay`.
    pub fn new(delay: D) -> Self {
        Self {
            delay,
            elapsed_ms: 0,
        }
    }

    /// Return the wrapped delay.
    pub fn release(self) -> D {
        self.delay
    }
}

#[cfg(feature = "hal")]
impl<D: embedded_hal::delay::DelayNs> Timer for DelayTimer<D> {
    fn now_ms(&mut self) -> u64 {
        self.elapsed_ms
    }

    fn wait_ms(&mut self, ms: u32) {
        if ms == 0 {
            return;
        }
        self.delay.delay_ms(ms);
        self.elapsed_ms += u64::from(ms);
    }
}

/// Point in time after which polling gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    start_ms: u64,
    timeout_ms: u32,
}

impl Deadline {
    /// Start counting `timeout_ms` from now. A timeout of zero never expires.
    pub fn start<T: Timer>(timer: &mut T, timeout_ms: u32) -> Self {
        Self {
            start_ms: timer.now_ms(),
            timeout_ms,
        }
    }

    /// Whether at least `timeout_ms` have passed since [`Deadline::start`].
    pub fn expired<T: Timer>(&self, timer: &mut T) -> bool {
        self.timeout_ms > 0
            && timer.now_ms().saturating_sub(self.start_ms) >= u64::from(self.timeout_ms)
    }
}
