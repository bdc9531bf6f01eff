// Cellular bring-up loop shared by the GSM and LTE clicks.
//
// PowerUp -> Check -> Configure -> WaitNetwork -> Example. A state that
// fails logs and runs again on the next task. Check, Configure and
// WaitNetwork give up after a bounded number of tries and power the modem
// up again; a run of failed power ups backs off for `interval_ms`.

use embedded_hal::delay::DelayNs;
use log::{info, warn};

use super::{AppError, Application};
use crate::modems::CellularModem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    PowerUp,
    Check,
    Configure,
    WaitNetwork,
    Example,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config<'a> {
    /// Empty leaves the modem's PDP context alone.
    pub apn: &'a str,
    /// Send `sms_text` here once registered; `None` only reports signal.
    pub phone_number: Option<&'a str>,
    pub sms_text: &'a str,
    pub power_attempts: u16,
    pub check_attempts: u16,
    pub configure_attempts: u16,
    pub network_attempts: u16,
    /// Pause after a registration poll, after each example pass and
    /// after `power_attempts` failed power ups in a row.
    pub interval_ms: u32,
}

impl Default for Config<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Config<'a> {
    pub const fn new() -> Self {
        Self {
            apn: "",
            phone_number: None,
            sms_text: "Hello from click-drivers",
            power_attempts: 3,
            check_attempts: 5,
            configure_attempts: 3,
            network_attempts: 60,
            interval_ms: 1_000,
        }
    }

    pub const fn with_apn(mut self, apn: &'a str) -> Self {
        self.apn = apn;
        self
    }

    pub const fn with_sms(mut self, number: &'a str, text: &'a str) -> Self {
        self.phone_number = Some(number);
        self.sms_text = text;
        self
    }

    pub const fn with_attempts(mut self, check: u16, network: u16) -> Self {
        self.check_attempts = check;
        self.network_attempts = network;
        self
    }

    pub const fn with_retries(mut self, power: u16, configure: u16) -> Self {
        self.power_attempts = power;
        self.configure_attempts = configure;
        self
    }

    pub const fn with_interval_ms(mut self, ms: u32) -> Self {
        self.interval_ms = ms;
        self
    }
}

pub struct CellularDemo<'a, M, D> {
    modem: M,
    delay: D,
    config: Config<'a>,
    state: State,
    failures: u16,
    sms_sent: bool,
}

impl<'a, M: CellularModem, D: DelayNs> CellularDemo<'a, M, D> {
    pub fn new(modem: M, delay: D, config: Config<'a>) -> Self {
        Self {
            modem,
            delay,
            config,
            state: State::PowerUp,
            failures: 0,
            sms_sent: false,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn modem(&mut self) -> &mut M {
        &mut self.modem
    }

    pub fn release(self) -> (M, D) {
        (self.modem, self.delay)
    }

    fn enter(&mut self, next: State) {
        self.state = next;
        self.failures = 0;
    }

    // one more failed try in a bounded state; past the limit, power up again
    fn retry(&mut self, limit: u16) {
        self.failures += 1;
        if self.failures >= limit {
            warn!("cellular: {:?} failed {} times, restarting", self.state, self.failures);
            self.enter(State::PowerUp);
        }
    }

    fn power_up(&mut self) {
        match self.modem.power_on() {
            Ok(()) => {
                info!("cellular: powered up");
                self.enter(State::Check);
            }
            Err(e) => {
                warn!("cellular: power up failed: {:?}", e);
                self.failures += 1;
                if self.failures >= self.config.power_attempts {
                    warn!("cellular: {} power ups failed, backing off", self.failures);
                    self.failures = 0;
                    self.delay.delay_ms(self.config.interval_ms);
                }
            }
        }
    }

    fn check(&mut self) {
        match self.modem.ping() {
            Ok(()) => self.enter(State::Configure),
            Err(e) => {
                warn!("cellular: no AT response: {:?}", e);
                self.retry(self.config.check_attempts);
            }
        }
    }

    fn configure(&mut self) {
        match self.modem.configure(self.config.apn) {
            Ok(()) => {
                info!("cellular: configured");
                self.enter(State::WaitNetwork);
            }
            Err(e) => {
                warn!("cellular: configure failed: {:?}", e);
                self.retry(self.config.configure_attempts);
            }
        }
    }

    fn wait_network(&mut self) {
        match self.modem.registration() {
            Ok(r) if r.is_registered() => {
                info!("cellular: registered ({:?})", r);
                self.enter(State::Example);
                return;
            }
            Ok(r) => info!("cellular: waiting for network ({:?})", r),
            Err(e) => warn!("cellular: registration query failed: {:?}", e),
        }
        self.retry(self.config.network_attempts);
        self.delay.delay_ms(self.config.interval_ms);
    }

    fn example(&mut self) {
        if let (Some(number), false) = (self.config.phone_number, self.sms_sent) {
            match self.modem.send_sms(number, self.config.sms_text) {
                Ok(()) => {
                    info!("cellular: SMS sent to {}", number);
                    self.sms_sent = true;
                }
                Err(e) => warn!("cellular: SMS failed: {:?}", e),
            }
        } else {
            match self.modem.signal_quality() {
                Ok(q) => match q.dbm() {
                    Some(dbm) => info!("Signal quality: {} dBm", dbm),
                    None => info!("Signal quality: unknown"),
                },
                Err(e) => warn!("cellular: signal quality failed: {:?}", e),
            }
        }
        self.delay.delay_ms(self.config.interval_ms);
    }
}

impl<M: CellularModem, D: DelayNs> Application for CellularDemo<'_, M, D> {
    fn init(&mut self) -> Result<(), AppError> {
        self.enter(State::PowerUp);
        self.sms_sent = false;
        info!("cellular: demo started");
        Ok(())
    }

    fn task(&mut self) {
        match self.state {
            State::PowerUp => self.power_up(),
            State::Check => self.check(),
            State::Configure => self.configure(),
            State::WaitNetwork => self.wait_network(),
            State::Example => self.example(),
        }
    }
}
