// Polling demos for the sensor and I/O clicks.
//
// Each one brings its chip up in init, then reads and logs one sample
// per task. A failed read is logged and the next task tries again.

use core::fmt::Debug;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{info, warn};

use super::{AppError, Application};
use crate::bus::RegisterInterface;
use crate::drivers::adxl345::{Adxl345, Axes};
use crate::drivers::ina219::Ina219;
use crate::drivers::mcp23017::{Mcp23017, Port};
use crate::drivers::mcp7940n::{DateTime, Mcp7940n};
use crate::error::Error;

const ACCEL_INTERVAL_MS: u32 = 100;
const RTC_INTERVAL_MS: u32 = 200;
const POWER_INTERVAL_MS: u32 = 1_000;
const EXPANDER_INTERVAL_MS: u32 = 500;

// ── Accel ───────────────────────────────────────────────────────────────

pub struct AccelDemo<IFACE, D> {
    sensor: Adxl345<IFACE>,
    delay: D,
    last: Option<Axes>,
}

impl<IFACE, D, E> AccelDemo<IFACE, D>
where
    IFACE: RegisterInterface<Error = E>,
    D: DelayNs,
{
    pub fn new(sensor: Adxl345<IFACE>, delay: D) -> Self {
        Self { sensor, delay, last: None }
    }

    pub fn last(&self) -> Option<Axes> {
        self.last
    }

    pub fn release(self) -> (Adxl345<IFACE>, D) {
        (self.sensor, self.delay)
    }
}

impl<IFACE, D, E> Application for AccelDemo<IFACE, D>
where
    IFACE: RegisterInterface<Error = E>,
    D: DelayNs,
    E: Debug,
{
    fn init(&mut self) -> Result<(), AppError> {
        self.sensor.default_cfg(&mut self.delay)?;
        Ok(())
    }

    fn task(&mut self) {
        match self.sensor.data_ready() {
            Ok(true) => match self.sensor.read_accel_mg() {
                Ok(a) => {
                    info!("Accel X: {} mg | Y: {} mg | Z: {} mg", a.x, a.y, a.z);
                    self.last = Some(a);
                }
                Err(e) => warn!("accel: read failed: {:?}", e),
            },
            Ok(false) => {}
            Err(e) => warn!("accel: status read failed: {:?}", e),
        }
        self.delay.delay_ms(ACCEL_INTERVAL_MS);
    }
}

// ── RTC ─────────────────────────────────────────────────────────────────

pub struct RtcDemo<I2C, D> {
    rtc: Mcp7940n<I2C>,
    delay: D,
    start: Option<DateTime>,
    last: Option<DateTime>,
}

impl<I2C: I2c, D: DelayNs> RtcDemo<I2C, D> {
    /// `start` is written in init; `None` keeps the time already running.
    pub fn new(rtc: Mcp7940n<I2C>, delay: D, start: Option<DateTime>) -> Self {
        Self {
            rtc,
            delay,
            start,
            last: None,
        }
    }

    pub fn last(&self) -> Option<DateTime> {
        self.last
    }

    pub fn release(self) -> (Mcp7940n<I2C>, D) {
        (self.rtc, self.delay)
    }
}

impl<I2C: I2c, D: DelayNs> Application for RtcDemo<I2C, D> {
    fn init(&mut self) -> Result<(), AppError> {
        self.rtc.default_cfg()?;
        if let Some(dt) = self.start {
            self.rtc.set_datetime(&dt)?;
        }
        Ok(())
    }

    fn task(&mut self) {
        match self.rtc.read_datetime() {
            // once per second
            Ok(now) if self.last.is_some_and(|l| l.seconds == now.seconds) => {}
            Ok(now) => {
                info!(
                    "Time: {:02}:{:02}:{:02} Date: {:02}.{:02}.{}",
                    now.hours, now.minutes, now.seconds, now.day, now.month, now.year
                );
                self.last = Some(now);
            }
            Err(e) => warn!("rtc: read failed: {:?}", e),
        }
        self.delay.delay_ms(RTC_INTERVAL_MS);
    }
}

// ── Power monitor ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerReading {
    pub bus_mv: u32,
    pub shunt_uv: i32,
    pub current_ua: i32,
    pub power_uw: u32,
}

pub struct PowerMonitorDemo<I2C, D> {
    monitor: Ina219<I2C>,
    delay: D,
    last: Option<PowerReading>,
}

impl<I2C: I2c, D: DelayNs> PowerMonitorDemo<I2C, D> {
    pub fn new(monitor: Ina219<I2C>, delay: D) -> Self {
        Self {
            monitor,
            delay,
            last: None,
        }
    }

    pub fn last(&self) -> Option<PowerReading> {
        self.last
    }

    pub fn release(self) -> (Ina219<I2C>, D) {
        (self.monitor, self.delay)
    }

    fn sample(&mut self) -> Result<PowerReading, Error<I2C::Error>> {
        Ok(PowerReading {
            bus_mv: self.monitor.bus_voltage_mv()?,
            shunt_uv: self.monitor.shunt_voltage_uv()?,
            current_ua: self.monitor.current_ua()?,
            power_uw: self.monitor.power_uw()?,
        })
    }
}

impl<I2C: I2c, D: DelayNs> Application for PowerMonitorDemo<I2C, D> {
    fn init(&mut self) -> Result<(), AppError> {
        self.monitor.default_cfg()?;
        Ok(())
    }

    fn task(&mut self) {
        match self.sample() {
            Ok(r) => {
                info!(
                    "Bus: {} mV | Shunt: {} uV | Current: {} uA | Power: {} uW",
                    r.bus_mv, r.shunt_uv, r.current_ua, r.power_uw
                );
                self.last = Some(r);
            }
            Err(e) => warn!("power: read failed: {:?}", e),
        }
        self.delay.delay_ms(POWER_INTERVAL_MS);
    }
}

// ── Expander ────────────────────────────────────────────────────────────

/// Walks a single high bit across port A and reports port B.
pub struct ExpanderDemo<I2C, D> {
    io: Mcp23017<I2C>,
    delay: D,
    bit: u8,
    inputs: Option<u8>,
}

impl<I2C: I2c, D: DelayNs> ExpanderDemo<I2C, D> {
    pub fn new(io: Mcp23017<I2C>, delay: D) -> Self {
        Self {
            io,
            delay,
            bit: 0,
            inputs: None,
        }
    }

    /// Port B as of the last task.
    pub fn inputs(&self) -> Option<u8> {
        self.inputs
    }

    pub fn release(self) -> (Mcp23017<I2C>, D) {
        (self.io, self.delay)
    }
}

impl<I2C: I2c, D: DelayNs> Application for ExpanderDemo<I2C, D> {
    fn init(&mut self) -> Result<(), AppError> {
        self.io.default_cfg()?;
        self.io.set_direction(Port::A, 0x00)?;
        self.io.set_pull_ups(Port::B, 0xFF)?;
        Ok(())
    }

    fn task(&mut self) {
        let out = 1u8 << self.bit;
        if let Err(e) = self.io.write_port(Port::A, out) {
            warn!("expander: write failed: {:?}", e);
        }
        match self.io.read_port(Port::B) {
            Ok(b) => {
                info!("Port A: 0x{:02X} | Port B: 0x{:02X}", out, b);
                self.inputs = Some(b);
            }
            Err(e) => warn!("expander: read failed: {:?}", e),
        }
        self.bit = (self.bit + 1) % 8;
        self.delay.delay_ms(EXPANDER_INTERVAL_MS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::run;
    use crate::drivers::{adxl345, ina219, mcp23017, mcp7940n};
    use crate::testing::{MockDelay, MockI2c};
    use std::vec;

    #[test]
    fn accel_reads_only_when_data_ready() {
        let mut i2c = MockI2c::new();
        i2c.queue_read(&[adxl345::DEVICE_ID]);
        // not ready, then ready with x = 256 LSB, y = -256, z = 0
        i2c.queue_read(&[0x00, 0x80, 0x00, 0x01, 0x00, 0xFF, 0x00, 0x00]);
        let sensor = Adxl345::new_i2c(i2c, adxl345::ADDR_ALT_LOW, adxl345::Config::new());
        let mut app = AccelDemo::new(sensor, MockDelay::new());

        run(&mut app, 1).unwrap();
        assert_eq!(app.last(), None);
        app.task();
        assert_eq!(app.last(), Some(Axes { x: 998, y: -998, z: 0 }));
    }

    #[test]
    fn accel_init_rejects_wrong_chip() {
        let mut i2c = MockI2c::new();
        i2c.queue_read(&[0x33]);
        let sensor = Adxl345::new_i2c(i2c, adxl345::ADDR_ALT_LOW, adxl345::Config::new());
        let mut app = AccelDemo::new(sensor, MockDelay::new());
        assert_eq!(run(&mut app, 5), Err(AppError::Device));
    }

    #[test]
    fn rtc_logs_each_second_once() {
        let mut i2c = MockI2c::new();
        // WKDAY, CONTROL, RTCSEC read-modify-writes in default_cfg
        i2c.queue_read(&[0x08, 0x00, 0x80]);
        // 12:34:56 then the same second again
        let regs = [0xD6, 0x34, 0x12, 0x2B, 0x14, 0x10, 0x26];
        i2c.queue_read(&regs);
        i2c.queue_read(&regs);
        let rtc = Mcp7940n::new(i2c, mcp7940n::Config::new());
        let mut app = RtcDemo::new(rtc, MockDelay::new(), None);

        run(&mut app, 2).unwrap();
        let now = app.last().unwrap();
        assert_eq!((now.hours, now.minutes, now.seconds), (12, 34, 56));
        assert_eq!((now.day, now.month, now.year), (14, 10, 2026));

        let (rtc, delay) = app.release();
        // already configured: nothing written
        assert!(rtc.release().writes().is_empty());
        assert_eq!(delay.total_ms(), 400);
    }

    #[test]
    fn rtc_init_sets_start_time() {
        let start = DateTime {
            year: 2026,
            month: 10,
            day: 14,
            weekday: 3,
            hours: 9,
            minutes: 0,
            seconds: 0,
        };
        let rtc = Mcp7940n::new(MockI2c::new(), mcp7940n::Config::new());
        let mut app = RtcDemo::new(rtc, MockDelay::new(), Some(start));
        run(&mut app, 0).unwrap();

        let writes = app.release().0.release().writes();
        assert_eq!(writes.last(), Some(&vec![0x00, 0x80]));
    }

    #[test]
    fn power_monitor_sample() {
        let mut i2c = MockI2c::new();
        // bus 12000 mV with CNVR, shunt 100 LSB, current 1000 LSB, power 500 LSB
        i2c.queue_read(&[0x5D, 0xC2, 0x00, 0x64, 0x03, 0xE8, 0x01, 0xF4]);
        let ina = Ina219::new(i2c, ina219::ADDRESS, ina219::Config::new());
        let mut app = PowerMonitorDemo::new(ina, MockDelay::new());
        run(&mut app, 1).unwrap();

        let cal = app.monitor.calibration().unwrap();
        let r = app.last().unwrap();
        assert_eq!(r.bus_mv, (0x5DC2 >> 3) * 4);
        assert_eq!(r.shunt_uv, 1_000);
        assert_eq!(r.current_ua, 1_000 * cal.current_lsb_ua as i32);
        assert_eq!(r.power_uw, 500 * cal.power_lsb_uw());
    }

    #[test]
    fn power_monitor_keeps_last_good_sample_on_overflow() {
        let mut i2c = MockI2c::new();
        i2c.queue_read(&[0x5D, 0xC1]);
        let ina = Ina219::new(i2c, ina219::ADDRESS, ina219::Config::new());
        let mut app = PowerMonitorDemo::new(ina, MockDelay::new());
        run(&mut app, 1).unwrap();
        assert_eq!(app.last(), None);
    }

    #[test]
    fn power_monitor_survives_bus_dropout() {
        let mut i2c = MockI2c::new();
        i2c.queue_read(&[0x5D, 0xC2, 0x00, 0x64, 0x00, 0x0A, 0x00, 0x05]);
        // reset, config, calibration, then one sample of four reads
        i2c.fail_after(7);
        let ina = Ina219::new(i2c, ina219::ADDRESS, ina219::Config::new());
        let mut app = PowerMonitorDemo::new(ina, MockDelay::new());
        run(&mut app, 3).unwrap();

        let r = app.last().unwrap();
        assert_eq!((r.bus_mv, r.shunt_uv), (12_000, 1_000));
        let (_, delay) = app.release();
        assert_eq!(delay.total_ms(), 3 * POWER_INTERVAL_MS as u64);
    }

    #[test]
    fn expander_walks_port_a() {
        let mut i2c = MockI2c::new();
        i2c.queue_read(&[0xFE, 0xFD]);
        let io = Mcp23017::new(i2c, mcp23017::address(0), mcp23017::Config::new());
        let mut app = ExpanderDemo::new(io, MockDelay::new());
        run(&mut app, 2).unwrap();
        assert_eq!(app.inputs(), Some(0xFD));

        let writes = app.release().0.release().writes();
        // IOCON, IODIR, IODIRA, GPPUB, then OLATA per task
        assert_eq!(writes[2..], [vec![0x00, 0x00], vec![0x0D, 0xFF], vec![0x14, 0x01], vec![0x14, 0x02]]);
    }
}
