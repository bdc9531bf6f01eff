// AT command processing shared by the cellular and Bluetooth clicks.
//
// buffer:   NUL-filtering receive buffer, tail kept on overflow
// response: result classification (OK / ERROR / prompt) and field parsing
// engine:   blocking request/response loop over embedded-io
// fmt:      fixed-capacity command argument formatting
// asynch:   the same loop over embedded-io-async

#[cfg(feature = "async")]
pub mod asynch;
pub mod buffer;
pub mod engine;
pub mod fmt;
pub mod response;

pub use buffer::ResponseBuffer;
pub use engine::{AtEngine, Config, DEFAULT_BUFFER_SIZE};
pub use fmt::StackFmt;
pub use response::{Outcome, Tokens, classify, error_code, field_after, fields, parse_field};

/// Ends an SMS body or data-mode payload.
pub const CTRL_Z: u8 = 0x1A;
/// Aborts a pending prompt.
pub const ESC: u8 = 0x1B;
