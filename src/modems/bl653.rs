// BL653 Bluetooth LE module running the AT interface application
//
// Not V.25ter: commands end in CR, success is `00`, failure is
// `01<TAB><hex code>`, and information lines are TAB separated with a
// numeric tag in front (10 = ATI, 27 = ATS read).

use embedded_hal::delay::DelayNs;
use embedded_io::{Read, ReadReady, Write};
use log::{debug, info};

use crate::at::{AtEngine, Config, DEFAULT_BUFFER_SIZE, Tokens, fmt};
use crate::error::Error;

pub const TOKENS: Tokens = Tokens {
    ok: "00",
    error: "01\t",
    prompt: "",
};

const RESET_TIMEOUT_MS: u32 = 2_000;
const CONNECT_TIMEOUT_MS: u32 = 10_000;
const CONNECT_URC: &str = "connect ";
const URC_TAIL_POLLS: u32 = 100;

/// Engine settings for the AT interface application.
pub const fn engine_config() -> Config {
    Config::new()
        .with_terminator("\r")
        .with_tokens(TOKENS)
        .with_timeout_ms(5_000)
}

/// `ATI` items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Info {
    DeviceName = 0,
    FirmwareVersion = 3,
    BluetoothAddress = 4,
    AppVersion = 13,
}

pub struct Bl653<UART, D, const N: usize = DEFAULT_BUFFER_SIZE> {
    at: AtEngine<UART, D, N>,
}

impl<UART, D, const N: usize> Bl653<UART, D, N>
where
    UART: Read + ReadReady + Write,
    D: DelayNs,
{
    pub fn new(uart: UART, delay: D) -> Self {
        Self {
            at: AtEngine::new(uart, delay, engine_config()),
        }
    }

    pub fn from_engine(at: AtEngine<UART, D, N>) -> Self {
        Self { at }
    }

    pub fn at(&mut self) -> &mut AtEngine<UART, D, N> {
        &mut self.at
    }

    pub fn release(self) -> AtEngine<UART, D, N> {
        self.at
    }

    /// Warm reset; the module answers once it is back up.
    pub fn reset(&mut self) -> Result<(), Error<UART::Error>> {
        self.at.command_within("ATZ", RESET_TIMEOUT_MS)?;
        info!("bl653: reset");
        Ok(())
    }

    pub fn device_info(&mut self, item: Info) -> Result<&str, Error<UART::Error>> {
        let Some(cmd) = fmt::format::<16>(format_args!("ATI {}", item as u8)) else {
            return Err(Error::Overflow);
        };
        let rsp = self.at.command(cmd.as_str())?;
        tagged_value(rsp, "10").ok_or(Error::UnknownResponse)
    }

    pub fn set_s_register(&mut self, reg: u16, value: u32) -> Result<(), Error<UART::Error>> {
        let Some(cmd) = fmt::format::<24>(format_args!("ATS {}={}", reg, value)) else {
            return Err(Error::Overflow);
        };
        self.at.command(cmd.as_str())?;
        debug!("bl653: S{} = {}", reg, value);
        Ok(())
    }

    pub fn read_s_register(&mut self, reg: u16) -> Result<u32, Error<UART::Error>> {
        let Some(cmd) = fmt::format::<16>(format_args!("ATS {}?", reg)) else {
            return Err(Error::Overflow);
        };
        let rsp = self.at.command(cmd.as_str())?;
        tagged_value(rsp, "27")
            .and_then(|v| v.parse().ok())
            .ok_or(Error::UnknownResponse)
    }

    /// Persist S registers to flash; most take effect after `reset`.
    pub fn save_config(&mut self) -> Result<(), Error<UART::Error>> {
        self.at.command("AT&W")?;
        Ok(())
    }

    pub fn factory_reset(&mut self) -> Result<(), Error<UART::Error>> {
        self.at.command_within("AT&F*", RESET_TIMEOUT_MS)?;
        Ok(())
    }

    pub fn start_advertising(&mut self) -> Result<(), Error<UART::Error>> {
        self.at.command("AT+LADV")?;
        Ok(())
    }

    pub fn stop_advertising(&mut self) -> Result<(), Error<UART::Error>> {
        self.at.command("AT+LADVX")?;
        Ok(())
    }

    /// Scan for `seconds`; reports arrive as `AD0` lines in the response.
    pub fn start_scan(&mut self, seconds: u16) -> Result<(), Error<UART::Error>> {
        let Some(cmd) = fmt::format::<24>(format_args!("AT+LSCN {}", seconds)) else {
            return Err(Error::Overflow);
        };
        self.at.command(cmd.as_str())?;
        Ok(())
    }

    pub fn stop_scan(&mut self) -> Result<(), Error<UART::Error>> {
        self.at.command("AT+LSCNX")?;
        Ok(())
    }

    /// Connect to `address` (type byte + 6 byte address as 14 hex digits)
    /// and return the connection handle.
    pub fn connect(&mut self, address: &str) -> Result<u8, Error<UART::Error>> {
        if address.len() != 14 || !address.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidArgument);
        }
        let Some(cmd) = fmt::format::<32>(format_args!("AT+LCON {}", address)) else {
            return Err(Error::Overflow);
        };
        self.at.command(cmd.as_str())?;
        // the connect URC can be in the same reply or come later
        if parse_connect(self.at.response()).is_none() {
            self.at.wait_for(CONNECT_URC, CONNECT_TIMEOUT_MS)?;
        }
        for _ in 0..URC_TAIL_POLLS {
            if let Some(handle) = parse_connect(self.at.response()) {
                info!("bl653: connected to {} as {}", address, handle);
                return Ok(handle);
            }
            self.at.process()?;
            self.at.delay_mut().delay_ms(1);
        }
        Err(Error::UnknownResponse)
    }

    pub fn disconnect(&mut self, handle: u8) -> Result<(), Error<UART::Error>> {
        let Some(cmd) = fmt::format::<16>(format_args!("AT+LDSC {}", handle)) else {
            return Err(Error::Overflow);
        };
        self.at.command(cmd.as_str())?;
        Ok(())
    }

    /// Raw bytes over an open VSP bridge connection.
    pub fn send_data(&mut self, data: &[u8]) -> Result<(), Error<UART::Error>> {
        self.at.send_raw(data)
    }
}

/// Value field of the first `<tag>\t...\t<value>` line.
pub fn tagged_value<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    text.split(['\r', '\n'])
        .filter(|line| line.split('\t').next() == Some(tag))
        .find_map(|line| line.rsplit('\t').next())
        .map(str::trim)
}

// `connect <handle>,<address>,...`, only once the line is complete
fn parse_connect(text: &str) -> Option<u8> {
    let rest = text
        .split_inclusive(['\r', '\n'])
        .filter_map(|line| line.strip_suffix(['\r', '\n']))
        .find_map(|line| line.strip_prefix(CONNECT_URC))?;
    rest.split(',').next()?.trim().parse().ok()
}
