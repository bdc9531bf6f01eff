// AT-command modem clicks.
//
// lte:   4G LTE and LTE Cat.1 clicks
// gsm:   GSM/GPRS clicks (voice + SMS)
// bl653: BL653 Bluetooth LE module
//
// The helpers here speak 3GPP TS 27.005 / 27.007 and are shared by the
// cellular drivers. All of them run one exchange at a time on the
// blocking engine.

pub mod bl653;
pub mod gsm;
pub mod lte;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_io::{Read, ReadReady, Write};
use log::{debug, info, warn};

use crate::at::{self, AtEngine, StackFmt, field_after, parse_field};
use crate::error::Error;

const SMS_PROMPT_TIMEOUT_MS: u32 = 5_000;
const SMS_SEND_TIMEOUT_MS: u32 = 60_000;
const PING_TIMEOUT_MS: u32 = 1_000;

// ── Power key ───────────────────────────────────────────────────────────

/// PWRKEY / ON line of a modem.
pub struct PowerKey<P> {
    pin: P,
    pulse_ms: u32,
    boot_ms: u32,
    active_high: bool,
}

impl<P: OutputPin> PowerKey<P> {
    pub fn new(pin: P, pulse_ms: u32, boot_ms: u32) -> Self {
        Self {
            pin,
            pulse_ms,
            boot_ms,
            active_high: true,
        }
    }

    /// For boards that drive PWRKEY directly instead of through a transistor.
    pub fn active_low(mut self) -> Self {
        self.active_high = false;
        self
    }

    pub fn release(self) -> P {
        self.pin
    }

    /// Idle level, pulse, idle level again, then wait out the boot time.
    pub fn press<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), P::Error> {
        self.set(false)?;
        delay.delay_ms(100);
        self.set(true)?;
        delay.delay_ms(self.pulse_ms);
        self.set(false)?;
        delay.delay_ms(self.boot_ms);
        Ok(())
    }

    fn set(&mut self, pressed: bool) -> Result<(), P::Error> {
        if pressed == self.active_high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        }
    }
}

// ── Network state ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalQuality {
    /// 0..=31, 99 = unknown.
    pub rssi: u8,
    /// 0..=7, 99 = unknown.
    pub ber: u8,
}

impl SignalQuality {
    /// -113 dBm at 0 in 2 dB steps up to -51 dBm at 31.
    pub fn dbm(&self) -> Option<i16> {
        (self.rssi <= 31).then(|| -113 + 2 * self.rssi as i16)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    NotSearching,
    Home,
    Searching,
    Denied,
    Unknown,
    Roaming,
    Other(u8),
}

impl Registration {
    pub fn from_stat(stat: u8) -> Self {
        match stat {
            0 => Registration::NotSearching,
            1 => Registration::Home,
            2 => Registration::Searching,
            3 => Registration::Denied,
            4 => Registration::Unknown,
            5 => Registration::Roaming,
            n => Registration::Other(n),
        }
    }

    pub fn is_registered(self) -> bool {
        matches!(self, Registration::Home | Registration::Roaming)
    }
}

/// Which registration status command to ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    /// Circuit switched, +CREG.
    Cs,
    /// GPRS packet switched, +CGREG.
    Ps,
    /// LTE, +CEREG.
    Eps,
}

impl Domain {
    const fn command(self) -> &'static str {
        match self {
            Domain::Cs => "AT+CREG",
            Domain::Ps => "AT+CGREG",
            Domain::Eps => "AT+CEREG",
        }
    }

    const fn prefix(self) -> &'static str {
        match self {
            Domain::Cs => "+CREG:",
            Domain::Ps => "+CGREG:",
            Domain::Eps => "+CEREG:",
        }
    }
}

/// 15 digit IMEI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Imei([u8; 15]);

impl Imei {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let b = line.as_bytes();
        if b.len() != 15 || !b.iter().all(u8::is_ascii_digit) {
            return None;
        }
        let mut digits = [0u8; 15];
        digits.copy_from_slice(b);
        Some(Self(digits))
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.0).unwrap_or("")
    }
}

/// Uniform surface the cellular demo drives.
pub trait CellularModem {
    type Error: core::fmt::Debug;

    fn power_on(&mut self) -> Result<(), Self::Error>;
    /// Plain `AT` answered with OK.
    fn ping(&mut self) -> Result<(), Self::Error>;
    /// One-time setup after power up; `apn` may be empty.
    fn configure(&mut self, apn: &str) -> Result<(), Self::Error>;
    fn registration(&mut self) -> Result<Registration, Self::Error>;
    fn signal_quality(&mut self) -> Result<SignalQuality, Self::Error>;
    fn send_sms(&mut self, number: &str, text: &str) -> Result<(), Self::Error>;
}

// ── Shared exchanges ────────────────────────────────────────────────────

fn args(line: core::fmt::Arguments<'_>) -> Option<StackFmt> {
    at::fmt::format(line)
}

/// `AT` until OK or `attempts` run out, for the first exchange after boot.
pub fn wait_ready<UART, D, const N: usize>(
    at: &mut AtEngine<UART, D, N>,
    attempts: u32,
) -> Result<(), Error<UART::Error>>
where
    UART: Read + ReadReady + Write,
    D: DelayNs,
{
    let mut last = Error::Timeout;
    for n in 0..attempts {
        match at.command_within("AT", PING_TIMEOUT_MS) {
            Ok(_) => {
                debug!("modem: ready after {} attempts", n + 1);
                return Ok(());
            }
            Err(e @ Error::Bus(_)) => return Err(e),
            Err(e) => last = e,
        }
    }
    warn!("modem: no answer to AT");
    Err(last)
}

pub fn signal_quality<UART, D, const N: usize>(
    at: &mut AtEngine<UART, D, N>,
) -> Result<SignalQuality, Error<UART::Error>>
where
    UART: Read + ReadReady + Write,
    D: DelayNs,
{
    let rsp = at.command("AT+CSQ")?;
    parse_signal_quality(rsp).ok_or(Error::UnknownResponse)
}

pub fn parse_signal_quality(text: &str) -> Option<SignalQuality> {
    let list = field_after(text, "+CSQ:")?;
    Some(SignalQuality {
        rssi: parse_field(list, 0)?,
        ber: parse_field(list, 1)?,
    })
}

/// Registration state from the `<n>,<stat>` read form (or a bare
/// `<stat>` URC already in the buffer).
pub fn registration<UART, D, const N: usize>(
    at: &mut AtEngine<UART, D, N>,
    domain: Domain,
) -> Result<Registration, Error<UART::Error>>
where
    UART: Read + ReadReady + Write,
    D: DelayNs,
{
    let rsp = at.command_query(domain.command())?;
    parse_registration(rsp, domain).ok_or(Error::UnknownResponse)
}

/// Prefers the read form `<n>,<stat>[,..]`. URCs (`<stat>` alone or
/// `<stat>,"<lac>",..`) can land in the same buffer; the newest one counts
/// only when no read form line is present.
pub fn parse_registration(text: &str, domain: Domain) -> Option<Registration> {
    let mut urc = None;
    let lines = text
        .split(['\r', '\n'])
        .filter_map(|line| line.trim().strip_prefix(domain.prefix()));
    for list in lines {
        let second = list.split(',').nth(1).map(str::trim);
        if let Some(stat) = second.filter(|f| !f.starts_with('"')).and_then(|f| f.parse().ok()) {
            return Some(Registration::from_stat(stat));
        }
        urc = parse_field(list, 0).or(urc);
    }
    urc.map(Registration::from_stat)
}

pub fn imei<UART, D, const N: usize>(at: &mut AtEngine<UART, D, N>) -> Result<Imei, Error<UART::Error>>
where
    UART: Read + ReadReady + Write,
    D: DelayNs,
{
    let rsp = at.command("AT+CGSN")?;
    rsp.split(['\r', '\n'])
        .find_map(Imei::parse)
        .ok_or(Error::UnknownResponse)
}

/// PDP context 1, IPv4.
pub fn set_apn<UART, D, const N: usize>(at: &mut AtEngine<UART, D, N>, apn: &str) -> Result<(), Error<UART::Error>>
where
    UART: Read + ReadReady + Write,
    D: DelayNs,
{
    let Some(line) = args(format_args!("1,\"IP\",\"{}\"", apn)) else {
        return Err(Error::Overflow);
    };
    at.command_with_parameter("AT+CGDCONT", line.as_str())?;
    info!("modem: apn {}", apn);
    Ok(())
}

/// Text mode SMS: CMGF=1, CMGS with the number, body after the prompt,
/// Ctrl-Z to send.
pub fn send_sms_text<UART, D, const N: usize>(
    at: &mut AtEngine<UART, D, N>,
    number: &str,
    text: &str,
) -> Result<(), Error<UART::Error>>
where
    UART: Read + ReadReady + Write,
    D: DelayNs,
{
    at.command_with_parameter("AT+CMGF", "1")?;

    let Some(quoted) = args(format_args!("\"{}\"", number)) else {
        return Err(Error::Overflow);
    };
    at.clear();
    at.send_with_parameter("AT+CMGS", quoted.as_str())?;
    if let Err(e) = at.wait_prompt(SMS_PROMPT_TIMEOUT_MS) {
        // leave the module out of text entry
        at.send_raw(&[at::ESC])?;
        return Err(e);
    }

    at.clear();
    at.send_terminated(text.as_bytes(), at::CTRL_Z)?;
    at.read_response_within(SMS_SEND_TIMEOUT_MS)?;
    info!("modem: sms sent to {}", number);
    Ok(())
}
