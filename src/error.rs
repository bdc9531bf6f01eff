// Crate-wide driver error
//
// One enum for every driver. `E` is the bus (or UART) error type of the
// HAL the driver was built on; everything else is a protocol outcome.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
    /// I2C / SPI / UART transfer failed.
    Bus(E),
    /// No terminal response within the polling budget.
    Timeout,
    /// Device answered with an error result code.
    CommandError,
    /// Device answered, but with nothing the driver recognises.
    UnknownResponse,
    /// Identification register did not match; holds the value read.
    InvalidDevice(u16),
    /// Argument outside what the chip accepts.
    InvalidArgument,
    /// Measurement or buffer overflowed.
    Overflow,
    /// A GPIO line could not be driven or read.
    Pin,
}

impl<E> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::Bus(e)
    }
}

impl<E> Error<E> {
    /// Maps the bus error, keeping protocol outcomes as they are.
    pub fn map_bus<F, O>(self, f: F) -> Error<O>
    where
        F: FnOnce(E) -> O,
    {
        match self {
            Error::Bus(e) => Error::Bus(f(e)),
            Error::Timeout => Error::Timeout,
            Error::CommandError => Error::CommandError,
            Error::UnknownResponse => Error::UnknownResponse,
            Error::InvalidDevice(id) => Error::InvalidDevice(id),
            Error::InvalidArgument => Error::InvalidArgument,
            Error::Overflow => Error::Overflow,
            Error::Pin => Error::Pin,
        }
    }

    pub const fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }
}

impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Bus(e) => write!(f, "bus error: {:?}", e),
            Error::Timeout => write!(f, "timeout"),
            Error::CommandError => write!(f, "command error"),
            Error::UnknownResponse => write!(f, "unknown response"),
            Error::InvalidDevice(id) => write!(f, "unexpected device id 0x{:04X}", id),
            Error::InvalidArgument => write!(f, "invalid argument"),
            Error::Overflow => write!(f, "overflow"),
            Error::Pin => write!(f, "pin error"),
        }
    }
}

impl<E: fmt::Debug> core::error::Error for Error<E> {}

// lets a driver error be the error type of a bridged SPI device
impl<E: fmt::Debug> embedded_hal::spi::Error for Error<E> {
    fn kind(&self) -> embedded_hal::spi::ErrorKind {
        embedded_hal::spi::ErrorKind::Other
    }
}

pub type Result<T, E> = core::result::Result<T, Error<E>>;
