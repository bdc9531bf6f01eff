// Drivers for mikroBUS Click boards
//
// One module per chip, all on embedded-hal 1.0 traits so any HAL can
// supply the buses, pins and delays. Modem clicks share one AT engine.
// Demos in app/ replace the per-board application_init/application_task.

#![cfg_attr(not(test), no_std)]

pub mod app;
pub mod at;
pub mod bus;
pub mod drivers;
pub mod error;
pub mod modems;

#[cfg(test)]
mod testing;

pub use bus::{I2cInterface, RegisterInterface, SpiFlags, SpiInterface};
pub use error::Error;
