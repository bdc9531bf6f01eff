// MCP7940N battery-backed RTC (RTC click)
//
// Timekeeping registers 0x00..0x06 are BCD with control bits mixed in:
//   RTCSEC bit7 ST (oscillator start), RTCWKDAY bit5 OSCRUN / bit3 VBATEN,
//   RTCMTH bit5 LPYR. Always 24 hour mode. 64 bytes of SRAM at 0x20.

use embedded_hal::i2c::I2c;
use log::{debug, info, warn};

use crate::bus::{I2cInterface, RegisterInterface};
use crate::error::Error;

pub const ADDRESS: u8 = 0x6F;
pub const SRAM_SIZE: usize = 64;

mod reg {
    pub const RTCSEC: u8 = 0x00;
    pub const RTCMIN: u8 = 0x01;
    pub const RTCWKDAY: u8 = 0x03;
    pub const RTCMTH: u8 = 0x05;
    pub const CONTROL: u8 = 0x07;
    pub const OSCTRIM: u8 = 0x08;
    pub const ALM0SEC: u8 = 0x0A;
    pub const ALM0WKDAY: u8 = 0x0D;
    pub const SRAM: u8 = 0x20;
}

const SEC_ST: u8 = 1 << 7;
const WKDAY_OSCRUN: u8 = 1 << 5;
const WKDAY_PWRFAIL: u8 = 1 << 4;
const WKDAY_VBATEN: u8 = 1 << 3;
const MTH_LPYR: u8 = 1 << 5;
const HOUR_12H: u8 = 1 << 6;

const CONTROL_SQWEN: u8 = 1 << 6;
const CONTROL_ALM0EN: u8 = 1 << 4;
const CONTROL_EXTOSC: u8 = 1 << 3;

const ALM_IF: u8 = 1 << 3;

// OSCRUN drops within a few 32 kHz cycles of clearing ST
const OSC_STOP_POLLS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTime {
    /// 2000..=2099
    pub year: u16,
    pub month: u8,
    pub day: u8,
    /// 1..=7, meaning is up to the application
    pub weekday: u8,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
}

impl DateTime {
    pub fn is_valid(&self) -> bool {
        (2000..=2099).contains(&self.year)
            && (1..=12).contains(&self.month)
            && (1..=days_in_month(self.year, self.month)).contains(&self.day)
            && (1..=7).contains(&self.weekday)
            && self.hours < 24
            && self.minutes < 60
            && self.seconds < 60
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SquareWave {
    #[default]
    Hz1 = 0,
    Hz4096 = 1,
    Hz8192 = 2,
    Hz32768 = 3,
}

/// Which fields an alarm compares, ALMxMSK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmMatch {
    Seconds = 0b000,
    Minutes = 0b001,
    Hours = 0b010,
    Weekday = 0b011,
    Date = 0b100,
    All = 0b111,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Keep time on the coin cell when VCC drops.
    pub battery_backup: bool,
    /// Drive the oscillator from an external 32.768 kHz clock.
    pub external_oscillator: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub const fn new() -> Self {
        Self {
            battery_backup: true,
            external_oscillator: false,
        }
    }

    pub const fn with_battery_backup(mut self, on: bool) -> Self {
        self.battery_backup = on;
        self
    }
}

pub struct Mcp7940n<I2C> {
    iface: I2cInterface<I2C>,
    config: Config,
}

impl<I2C: I2c> Mcp7940n<I2C> {
    pub fn new(i2c: I2C, config: Config) -> Self {
        Self {
            iface: I2cInterface::new(i2c, ADDRESS),
            config,
        }
    }

    pub fn release(self) -> I2C {
        self.iface.release()
    }

    /// Battery backup and clock source from the config, then start the
    /// oscillator. Time registers are left alone.
    pub fn default_cfg(&mut self) -> Result<(), Error<I2C::Error>> {
        self.enable_battery_backup(self.config.battery_backup)?;
        let ext = if self.config.external_oscillator { CONTROL_EXTOSC } else { 0 };
        self.iface.modify_register(reg::CONTROL, CONTROL_EXTOSC, ext)?;
        self.start()?;
        info!("mcp7940n: oscillator started");
        Ok(())
    }

    pub fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Error<I2C::Error>> {
        Ok(self.iface.read_registers(reg, buf)?)
    }

    pub fn write_registers(&mut self, reg: u8, data: &[u8]) -> Result<(), Error<I2C::Error>> {
        Ok(self.iface.write_registers(reg, data)?)
    }

    pub fn start(&mut self) -> Result<(), Error<I2C::Error>> {
        self.iface.modify_register(reg::RTCSEC, SEC_ST, SEC_ST)?;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<(), Error<I2C::Error>> {
        self.iface.modify_register(reg::RTCSEC, SEC_ST, 0)?;
        Ok(())
    }

    pub fn is_running(&mut self) -> Result<bool, Error<I2C::Error>> {
        Ok(self.iface.read_register(reg::RTCWKDAY)? & WKDAY_OSCRUN != 0)
    }

    /// Set when main power failed at some point; cleared on read.
    pub fn take_power_fail(&mut self) -> Result<bool, Error<I2C::Error>> {
        let wk = self.iface.read_register(reg::RTCWKDAY)?;
        if wk & WKDAY_PWRFAIL != 0 {
            self.iface.write_register(reg::RTCWKDAY, wk & !WKDAY_PWRFAIL)?;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn enable_battery_backup(&mut self, on: bool) -> Result<(), Error<I2C::Error>> {
        let v = if on { WKDAY_VBATEN } else { 0 };
        self.iface.modify_register(reg::RTCWKDAY, WKDAY_VBATEN, v)?;
        self.config.battery_backup = on;
        Ok(())
    }

    /// Stops the oscillator, waits for OSCRUN to clear, writes all fields
    /// and restarts it.
    pub fn set_datetime(&mut self, dt: &DateTime) -> Result<(), Error<I2C::Error>> {
        if !dt.is_valid() {
            return Err(Error::InvalidArgument);
        }

        self.iface.write_register(reg::RTCSEC, 0)?;
        self.wait_stopped()?;

        let vbat = if self.config.battery_backup { WKDAY_VBATEN } else { 0 };
        let regs = [
            dec_to_bcd(dt.minutes),
            dec_to_bcd(dt.hours),
            dec_to_bcd(dt.weekday) | vbat,
            dec_to_bcd(dt.day),
            dec_to_bcd(dt.month),
            dec_to_bcd((dt.year - 2000) as u8),
        ];
        self.iface.write_registers(reg::RTCMIN, &regs)?;
        self.iface.write_register(reg::RTCSEC, dec_to_bcd(dt.seconds) | SEC_ST)?;
        debug!(
            "mcp7940n: set {}-{:02}-{:02} {:02}:{:02}:{:02}",
            dt.year, dt.month, dt.day, dt.hours, dt.minutes, dt.seconds
        );
        Ok(())
    }

    fn wait_stopped(&mut self) -> Result<(), Error<I2C::Error>> {
        for _ in 0..OSC_STOP_POLLS {
            if !self.is_running()? {
                return Ok(());
            }
        }
        warn!("mcp7940n: oscillator still running after ST cleared");
        Err(Error::Timeout)
    }

    pub fn read_datetime(&mut self) -> Result<DateTime, Error<I2C::Error>> {
        let mut r = [0u8; 7];
        self.iface.read_registers(reg::RTCSEC, &mut r)?;
        Ok(DateTime {
            seconds: bcd_to_dec(r[0] & 0x7F),
            minutes: bcd_to_dec(r[1] & 0x7F),
            hours: decode_hours(r[2]),
            weekday: r[3] & 0x07,
            day: bcd_to_dec(r[4] & 0x3F),
            month: bcd_to_dec(r[5] & 0x1F),
            year: 2000 + bcd_to_dec(r[6]) as u16,
        })
    }

    pub fn is_leap_year(&mut self) -> Result<bool, Error<I2C::Error>> {
        Ok(self.iface.read_register(reg::RTCMTH)? & MTH_LPYR != 0)
    }

    /// Signed digital trim applied every minute, 2 clock cycles per step.
    /// The register holds a 7 bit magnitude, so -127..=127.
    pub fn set_trim(&mut self, trim: i8) -> Result<(), Error<I2C::Error>> {
        if trim == i8::MIN {
            return Err(Error::InvalidArgument);
        }
        let sign = if trim < 0 { 0x00 } else { 0x80 };
        let mag = trim.unsigned_abs();
        Ok(self.iface.write_register(reg::OSCTRIM, sign | mag)?)
    }

    pub fn set_square_wave(&mut self, output: Option<SquareWave>) -> Result<(), Error<I2C::Error>> {
        let v = match output {
            Some(f) => CONTROL_SQWEN | f as u8,
            None => 0,
        };
        self.iface.modify_register(reg::CONTROL, CONTROL_SQWEN | 0b11, v)?;
        Ok(())
    }

    pub fn set_alarm0(&mut self, at: &DateTime, when: AlarmMatch) -> Result<(), Error<I2C::Error>> {
        if !at.is_valid() {
            return Err(Error::InvalidArgument);
        }
        let regs = [
            dec_to_bcd(at.seconds),
            dec_to_bcd(at.minutes),
            dec_to_bcd(at.hours),
            ((when as u8) << 4) | dec_to_bcd(at.weekday),
            dec_to_bcd(at.day),
            dec_to_bcd(at.month),
        ];
        self.iface.write_registers(reg::ALM0SEC, &regs)?;
        self.iface.modify_register(reg::CONTROL, CONTROL_ALM0EN, CONTROL_ALM0EN)?;
        Ok(())
    }

    pub fn alarm0_triggered(&mut self) -> Result<bool, Error<I2C::Error>> {
        Ok(self.iface.read_register(reg::ALM0WKDAY)? & ALM_IF != 0)
    }

    pub fn clear_alarm0(&mut self) -> Result<(), Error<I2C::Error>> {
        self.iface.modify_register(reg::ALM0WKDAY, ALM_IF, 0)?;
        Ok(())
    }

    pub fn disable_alarm0(&mut self) -> Result<(), Error<I2C::Error>> {
        self.iface.modify_register(reg::CONTROL, CONTROL_ALM0EN, 0)?;
        Ok(())
    }

    pub fn read_sram(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), Error<I2C::Error>> {
        if !fits_sram(offset, buf.len()) {
            return Err(Error::InvalidArgument);
        }
        Ok(self.iface.read_registers(reg::SRAM + offset as u8, buf)?)
    }

    pub fn write_sram(&mut self, offset: usize, data: &[u8]) -> Result<(), Error<I2C::Error>> {
        if !fits_sram(offset, data.len()) {
            return Err(Error::InvalidArgument);
        }
        Ok(self.iface.write_registers(reg::SRAM + offset as u8, data)?)
    }
}

fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        2 if year % 4 == 0 && (year % 100 != 0 || year % 400 == 0) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

fn fits_sram(offset: usize, len: usize) -> bool {
    offset.checked_add(len).is_some_and(|end| end <= SRAM_SIZE)
}

// 12 hour mode is never set by this driver but may be left by other firmware
fn decode_hours(raw: u8) -> u8 {
    if raw & HOUR_12H != 0 {
        let h = bcd_to_dec(raw & 0x1F) % 12;
        if raw & (1 << 5) != 0 { h + 12 } else { h }
    } else {
        bcd_to_dec(raw & 0x3F)
    }
}

pub const fn dec_to_bcd(v: u8) -> u8 {
    ((v / 10) << 4) | (v % 10)
}

pub const fn bcd_to_dec(v: u8) -> u8 {
    (v >> 4) * 10 + (v & 0x0F)
}
