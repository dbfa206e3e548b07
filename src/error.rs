use core::fmt::Debug;

/// Errors reported by the driver.
///
/// Status codes of the ranging algorithm are not decoded: every non-zero
/// status becomes [`Error::Fail`] (or [`Error::InvalidArgument`] for the
/// configuration setters). Errors of the bus manager itself are passed through
/// unmodified in [`Error::Bus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error<E: Debug> {
    /// The bus manager failed to probe, attach or detach a device.
    #[error("bus error: {0:?}")]
    Bus(E),
    /// Unbound sensor, out-of-range parameter or malformed address.
    #[error("invalid argument")]
    InvalidArgument,
    /// No registry slot matches the address.
    #[error("device not found")]
    NotFound,
    /// Every registry slot is in use.
    #[error("no free device slot")]
    ResourceExhausted,
    /// No measurement became ready before the deadline.
    #[error("timed out waiting for data ready")]
    Timeout,
    /// The ranging algorithm or the register transport failed.
    #[error("operation failed")]
    Fail,
}

impl<E: Debug> Error<E> {
    /// Whether this error means "no data yet" rather than a broken device.
    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }
}
