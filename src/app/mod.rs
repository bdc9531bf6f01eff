// Demo applications: one init step, then a task called forever.
//
// cellular: power up / attach / SMS state machine over any CellularModem
// sensors:  accelerometer, RTC, power monitor and expander loops

pub mod cellular;
pub mod sensors;

use core::fmt;

use crate::error::Error;

/// Why `init` gave up; bus error payloads are dropped so any demo can
/// report through one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppError {
    Bus,
    Timeout,
    /// Result code or data the device should not have sent.
    Protocol,
    /// Wrong chip or a config the chip cannot take.
    Device,
    Pin,
}

impl<E> From<Error<E>> for AppError {
    fn from(e: Error<E>) -> Self {
        match e {
            Error::Bus(_) => AppError::Bus,
            Error::Timeout => AppError::Timeout,
            Error::CommandError | Error::UnknownResponse | Error::Overflow => AppError::Protocol,
            Error::InvalidDevice(_) | Error::InvalidArgument => AppError::Device,
            Error::Pin => AppError::Pin,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppError::Bus => "bus error",
            AppError::Timeout => "timeout",
            AppError::Protocol => "protocol error",
            AppError::Device => "device error",
            AppError::Pin => "pin error",
        };
        f.write_str(s)
    }
}

impl core::error::Error for AppError {}

pub trait Application {
    fn init(&mut self) -> Result<(), AppError>;

    /// One pass of the main loop. Failures are logged, never fatal.
    fn task(&mut self);
}

/// `init` once, then `tasks` passes. Firmware calls `task` in its own
/// loop instead.
pub fn run<A: Application>(app: &mut A, tasks: usize) -> Result<(), AppError> {
    app.init()?;
    for _ in 0..tasks {
        app.task();
    }
    Ok(())
}
