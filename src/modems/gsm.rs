// GSM/GPRS clicks: voice calls and SMS on 2G modules.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_io::{Read, ReadReady, Write};
use log::info;

use super::{CellularModem, Domain, PowerKey, Registration, SignalQuality};
use crate::at::{AtEngine, DEFAULT_BUFFER_SIZE, fmt};
use crate::error::Error;

const READY_ATTEMPTS: u32 = 10;
const DIAL_TIMEOUT_MS: u32 = 20_000;

pub struct Gsm<UART, D, P, const N: usize = DEFAULT_BUFFER_SIZE> {
    at: AtEngine<UART, D, N>,
    key: PowerKey<P>,
}

impl<UART, D, P, const N: usize> Gsm<UART, D, P, N>
where
    UART: Read + ReadReady + Write,
    D: DelayNs,
    P: OutputPin,
{
    pub fn new(at: AtEngine<UART, D, N>, key: PowerKey<P>) -> Self {
        Self { at, key }
    }

    pub fn at(&mut self) -> &mut AtEngine<UART, D, N> {
        &mut self.at
    }

    pub fn release(self) -> (AtEngine<UART, D, N>, PowerKey<P>) {
        (self.at, self.key)
    }

    /// Voice call; the trailing `;` keeps the module out of data mode.
    pub fn dial(&mut self, number: &str) -> Result<(), Error<UART::Error>> {
        if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit() || b"+*#".contains(&b)) {
            return Err(Error::InvalidArgument);
        }
        let Some(cmd) = fmt::format::<32>(format_args!("ATD{};", number)) else {
            return Err(Error::Overflow);
        };
        self.at.command_within(cmd.as_str(), DIAL_TIMEOUT_MS)?;
        info!("gsm: dialing {}", number);
        Ok(())
    }

    pub fn hang_up(&mut self) -> Result<(), Error<UART::Error>> {
        self.at.command("ATH")?;
        Ok(())
    }

    pub fn answer(&mut self) -> Result<(), Error<UART::Error>> {
        self.at.command_within("ATA", DIAL_TIMEOUT_MS)?;
        Ok(())
    }

    /// Waits for an incoming call indication.
    pub fn wait_ring(&mut self, timeout_ms: u32) -> Result<(), Error<UART::Error>> {
        self.at.wait_for("RING", timeout_ms)
    }
}

impl<UART, D, P, const N: usize> CellularModem for Gsm<UART, D, P, N>
where
    UART: Read + ReadReady + Write,
    D: DelayNs,
    P: OutputPin,
{
    type Error = Error<UART::Error>;

    fn power_on(&mut self) -> Result<(), Self::Error> {
        if self.key.press(self.at.delay_mut()).is_err() {
            return Err(Error::Pin);
        }
        super::wait_ready(&mut self.at, READY_ATTEMPTS)?;
        info!("gsm: powered on");
        Ok(())
    }

    fn ping(&mut self) -> Result<(), Self::Error> {
        self.at.command("AT")?;
        Ok(())
    }

    fn configure(&mut self, apn: &str) -> Result<(), Self::Error> {
        // numeric +CME errors, registration URCs
        self.at.command_with_parameter("AT+CMEE", "1")?;
        self.at.command_with_parameter("AT+CREG", "1")?;
        if !apn.is_empty() {
            super::set_apn(&mut self.at, apn)?;
        }
        Ok(())
    }

    fn registration(&mut self) -> Result<Registration, Self::Error> {
        super::registration(&mut self.at, Domain::Cs)
    }

    fn signal_quality(&mut self) -> Result<SignalQuality, Self::Error> {
        super::signal_quality(&mut self.at)
    }

    fn send_sms(&mut self, number: &str, text: &str) -> Result<(), Self::Error> {
        super::send_sms_text(&mut self.at, number, text)
    }
}
