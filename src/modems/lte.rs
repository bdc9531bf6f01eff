// 4G LTE and LTE Cat.1 clicks
//
// Both boards share the command set; they differ in which registration
// status command reflects the network they attach to.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_io::{Read, ReadReady, Write};
use log::info;

use super::{CellularModem, Domain, Imei, PowerKey, Registration, SignalQuality};
use crate::at::{self, AtEngine, DEFAULT_BUFFER_SIZE, field_after};
use crate::error::Error;

const READY_ATTEMPTS: u32 = 10;
const CFUN_TIMEOUT_MS: u32 = 15_000;
const COPS_TIMEOUT_MS: u32 = 180_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Variant {
    /// LTE only, EPS registration (+CEREG).
    #[default]
    Lte4g,
    /// Cat.1 with 2G fallback, CS registration (+CREG).
    LteCat1,
}

impl Variant {
    pub const fn domain(self) -> Domain {
        match self {
            Variant::Lte4g => Domain::Eps,
            Variant::LteCat1 => Domain::Cs,
        }
    }
}

/// AT+CFUN levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Functionality {
    Minimum = 0,
    Full = 1,
    /// Transmit and receive RF circuits off. Flight mode.
    DisableRf = 4,
}

pub struct Lte<UART, D, P, const N: usize = DEFAULT_BUFFER_SIZE> {
    at: AtEngine<UART, D, N>,
    key: PowerKey<P>,
    variant: Variant,
}

impl<UART, D, P, const N: usize> Lte<UART, D, P, N>
where
    UART: Read + ReadReady + Write,
    D: DelayNs,
    P: OutputPin,
{
    pub fn new(at: AtEngine<UART, D, N>, key: PowerKey<P>, variant: Variant) -> Self {
        Self { at, key, variant }
    }

    pub fn at(&mut self) -> &mut AtEngine<UART, D, N> {
        &mut self.at
    }

    pub fn release(self) -> (AtEngine<UART, D, N>, PowerKey<P>) {
        (self.at, self.key)
    }

    pub fn set_functionality(&mut self, level: Functionality) -> Result<(), Error<UART::Error>> {
        let cmd = match level {
            Functionality::Minimum => "AT+CFUN=0",
            Functionality::Full => "AT+CFUN=1",
            Functionality::DisableRf => "AT+CFUN=4",
        };
        self.at.command_within(cmd, CFUN_TIMEOUT_MS)?;
        Ok(())
    }

    /// Name of the registered operator, `None` while not registered.
    pub fn operator(&mut self) -> Result<Option<&str>, Error<UART::Error>> {
        self.at.clear();
        self.at.send_query("AT+COPS")?;
        self.at.read_response_within(COPS_TIMEOUT_MS)?;
        Ok(field_after(self.at.response(), "+COPS:").and_then(|list| at::fields(list).nth(2)))
    }

    pub fn imei(&mut self) -> Result<Imei, Error<UART::Error>> {
        super::imei(&mut self.at)
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }
}

impl<UART, D, P, const N: usize> CellularModem for Lte<UART, D, P, N>
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
        info!("lte: {:?} powered on", self.variant);
        Ok(())
    }

    fn ping(&mut self) -> Result<(), Self::Error> {
        self.at.command("AT")?;
        Ok(())
    }

    fn configure(&mut self, apn: &str) -> Result<(), Self::Error> {
        self.set_functionality(Functionality::Full)?;
        // registration URCs on
        self.at.command_with_parameter(self.variant.domain().command(), "1")?;
        if !apn.is_empty() {
            super::set_apn(&mut self.at, apn)?;
        }
        Ok(())
    }

    fn registration(&mut self) -> Result<Registration, Self::Error> {
        super::registration(&mut self.at, self.variant.domain())
    }

    fn signal_quality(&mut self) -> Result<SignalQuality, Self::Error> {
        super::signal_quality(&mut self.at)
    }

    fn send_sms(&mut self, number: &str, text: &str) -> Result<(), Self::Error> {
        super::send_sms_text(&mut self.at, number, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::at::Config;
    use crate::testing::{MockDelay, MockPin, MockSerial};

    type Modem = Lte<MockSerial, MockDelay, MockPin, 256>;

    fn modem(serial: MockSerial, variant: Variant) -> Modem {
        let at = AtEngine::new(serial, MockDelay::new(), Config::new().with_timeout_ms(20));
        Lte::new(at, PowerKey::new(MockPin::new(), 500, 1_000), variant)
    }

    #[test]
    fn power_on_pulses_key_and_waits_for_at() {
        let mut serial = MockSerial::new();
        serial.reply(b"\r\nOK\r\n");
        let mut m = modem(serial, Variant::Lte4g);
        m.power_on().unwrap();

        let (at, key) = m.release();
        assert_eq!(key.release().rising_edges(), 1);
        let (serial, delay) = at.release();
        assert_eq!(serial.sent_str(), "AT\r\n");
        assert!(delay.total_ms() >= 1_500);
    }

    #[test]
    fn configure_uses_variant_registration_command() {
        let mut serial = MockSerial::new();
        for _ in 0..3 {
            serial.reply(b"\r\nOK\r\n");
        }
        let mut m = modem(serial, Variant::LteCat1);
        m.configure("iot.example").unwrap();
        let (at, _) = m.release();
        assert_eq!(
            at.release().0.sent_str(),
            "AT+CFUN=1\r\nAT+CREG=1\r\nAT+CGDCONT=1,\"IP\",\"iot.example\"\r\n"
        );
    }

    #[test]
    fn registration_follows_variant() {
        let mut serial = MockSerial::new();
        serial.reply(b"\r\n+CEREG: 0,1\r\n\r\nOK\r\n");
        let mut m = modem(serial, Variant::Lte4g);
        assert_eq!(m.registration(), Ok(Registration::Home));
    }

    #[test]
    fn operator_name() {
        let mut serial = MockSerial::new();
        serial.reply(b"\r\n+COPS: 0,0,\"A1 HR\",7\r\n\r\nOK\r\n");
        serial.reply(b"\r\n+COPS: 0\r\n\r\nOK\r\n");
        let mut m = modem(serial, Variant::Lte4g);
        assert_eq!(m.operator(), Ok(Some("A1 HR")));
        assert_eq!(m.operator(), Ok(None));
    }

    #[test]
    fn cfun_error_surfaces() {
        let mut serial = MockSerial::new();
        serial.reply(b"\r\n+CME ERROR: 3\r\n");
        let mut m = modem(serial, Variant::Lte4g);
        assert_eq!(m.set_functionality(Functionality::DisableRf), Err(Error::CommandError));
        assert_eq!(at::error_code(m.at().response()), Some(3));
    }
}
