// Chip drivers for the sensor, timing, motion and bridge clicks.
//
// Each module owns one chip. Bus framing comes from crate::bus; pin
// assignments and bus wiring stay with the caller.

pub mod a4988;
pub mod adxl345;
pub mod fdc1004;
pub mod ina219;
pub mod l3gd20;
pub mod mcp23017;
pub mod mcp7940n;
pub mod sc18is602;
