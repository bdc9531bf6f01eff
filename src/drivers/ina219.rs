// INA219 high-side current / power monitor
//
// 16-bit big endian registers. The chip only reports current and power
// once calibration is written; the calibration value is derived from the
// shunt and the largest current expected.

use embedded_hal::i2c::I2c;
use log::{debug, info};

use crate::bus::{I2cInterface, RegisterInterface};
use crate::error::Error;

pub const ADDRESS: u8 = 0x40;

mod reg {
    pub const CONFIG: u8 = 0x00;
    pub const SHUNT_VOLTAGE: u8 = 0x01;
    pub const BUS_VOLTAGE: u8 = 0x02;
    pub const POWER: u8 = 0x03;
    pub const CURRENT: u8 = 0x04;
    pub const CALIBRATION: u8 = 0x05;
}

const CONFIG_RESET: u16 = 1 << 15;
const MODE_MASK: u16 = 0b111;

const BUS_CNVR: u16 = 1 << 1;
const BUS_OVF: u16 = 1 << 0;

// 0.04096 scaled for µA and mΩ
const CAL_SCALE: u32 = 40_960_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusRange {
    V16 = 0,
    #[default]
    V32 = 1,
}

/// Shunt PGA, full scale ±40 / 80 / 160 / 320 mV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gain {
    Div1 = 0b00,
    Div2 = 0b01,
    Div4 = 0b10,
    #[default]
    Div8 = 0b11,
}

/// ADC resolution or sample averaging, BADC / SADC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Adc {
    Bits9 = 0b0000,
    Bits10 = 0b0001,
    Bits11 = 0b0010,
    #[default]
    Bits12 = 0b0011,
    Avg2 = 0b1001,
    Avg4 = 0b1010,
    Avg8 = 0b1011,
    Avg16 = 0b1100,
    Avg32 = 0b1101,
    Avg64 = 0b1110,
    Avg128 = 0b1111,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    PowerDown = 0b000,
    ShuntTriggered = 0b001,
    BusTriggered = 0b010,
    BothTriggered = 0b011,
    AdcOff = 0b100,
    ShuntContinuous = 0b101,
    BusContinuous = 0b110,
    #[default]
    BothContinuous = 0b111,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub bus_range: BusRange,
    pub gain: Gain,
    pub bus_adc: Adc,
    pub shunt_adc: Adc,
    pub mode: Mode,
    pub shunt_milliohms: u32,
    pub max_current_ua: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Power-on register defaults; 0.1 Ω shunt and 3.2 A max.
    pub const fn new() -> Self {
        Self {
            bus_range: BusRange::V32,
            gain: Gain::Div8,
            bus_adc: Adc::Bits12,
            shunt_adc: Adc::Bits12,
            mode: Mode::BothContinuous,
            shunt_milliohms: 100,
            max_current_ua: 3_200_000,
        }
    }

    pub const fn with_bus_range(mut self, range: BusRange) -> Self {
        self.bus_range = range;
        self
    }

    pub const fn with_gain(mut self, gain: Gain) -> Self {
        self.gain = gain;
        self
    }

    pub const fn with_adc(mut self, bus: Adc, shunt: Adc) -> Self {
        self.bus_adc = bus;
        self.shunt_adc = shunt;
        self
    }

    pub const fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub const fn with_shunt(mut self, milliohms: u32, max_current_ua: u32) -> Self {
        self.shunt_milliohms = milliohms;
        self.max_current_ua = max_current_ua;
        self
    }

    pub const fn register(&self) -> u16 {
        ((self.bus_range as u16) << 13)
            | ((self.gain as u16) << 11)
            | ((self.bus_adc as u16) << 7)
            | ((self.shunt_adc as u16) << 3)
            | self.mode as u16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    pub current_lsb_ua: u32,
    pub register: u16,
}

impl Calibration {
    pub const fn power_lsb_uw(&self) -> u32 {
        self.current_lsb_ua * 20
    }
}

/// Calibration for a shunt and the largest current to be measured.
pub fn calibration(shunt_milliohms: u32, max_current_ua: u32) -> Option<Calibration> {
    if shunt_milliohms == 0 || max_current_ua == 0 {
        return None;
    }
    let current_lsb_ua = max_current_ua.div_ceil(32768);
    let cal = CAL_SCALE / current_lsb_ua.checked_mul(shunt_milliohms)?;
    let register = u16::try_from(cal).ok()? & 0xFFFE;
    if register == 0 {
        return None;
    }
    Some(Calibration {
        current_lsb_ua,
        register,
    })
}

pub struct Ina219<I2C> {
    iface: I2cInterface<I2C>,
    config: Config,
    calibration: Option<Calibration>,
}

impl<I2C: I2c> Ina219<I2C> {
    pub fn new(i2c: I2C, address: u8, config: Config) -> Self {
        Self {
            iface: I2cInterface::new(i2c, address),
            config,
            calibration: None,
        }
    }

    pub fn release(self) -> I2C {
        self.iface.release()
    }

    /// Reset, write config and calibration.
    pub fn default_cfg(&mut self) -> Result<(), Error<I2C::Error>> {
        let Some(cal) = calibration(self.config.shunt_milliohms, self.config.max_current_ua) else {
            return Err(Error::InvalidArgument);
        };

        self.write_u16(reg::CONFIG, CONFIG_RESET)?;
        self.write_u16(reg::CONFIG, self.config.register())?;
        self.write_u16(reg::CALIBRATION, cal.register)?;
        self.calibration = Some(cal);

        info!(
            "ina219: cal {} ({} uA/bit), config 0x{:04X}",
            cal.register,
            cal.current_lsb_ua,
            self.config.register()
        );
        Ok(())
    }

    pub fn calibration(&self) -> Option<Calibration> {
        self.calibration
    }

    pub fn read_u16(&mut self, reg: u8) -> Result<u16, Error<I2C::Error>> {
        let mut buf = [0u8; 2];
        self.iface.read_registers(reg, &mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    pub fn write_u16(&mut self, reg: u8, value: u16) -> Result<(), Error<I2C::Error>> {
        Ok(self.iface.write_registers(reg, &value.to_be_bytes())?)
    }

    pub fn shunt_voltage_uv(&mut self) -> Result<i32, Error<I2C::Error>> {
        let raw = self.read_u16(reg::SHUNT_VOLTAGE)? as i16;
        Ok(raw as i32 * 10)
    }

    pub fn bus_voltage_mv(&mut self) -> Result<u32, Error<I2C::Error>> {
        let raw = self.read_u16(reg::BUS_VOLTAGE)?;
        if raw & BUS_OVF != 0 {
            debug!("ina219: math overflow, raw 0x{:04X}", raw);
            return Err(Error::Overflow);
        }
        Ok((raw >> 3) as u32 * 4)
    }

    pub fn conversion_ready(&mut self) -> Result<bool, Error<I2C::Error>> {
        Ok(self.read_u16(reg::BUS_VOLTAGE)? & BUS_CNVR != 0)
    }

    /// `Overflow` when a coarse LSB pushes the reading past `i32`.
    pub fn current_ua(&mut self) -> Result<i32, Error<I2C::Error>> {
        let lsb = self.calibrated()?.current_lsb_ua;
        let raw = self.read_u16(reg::CURRENT)? as i16;
        i32::try_from(i64::from(raw) * i64::from(lsb)).or(Err(Error::Overflow))
    }

    pub fn power_uw(&mut self) -> Result<u32, Error<I2C::Error>> {
        let lsb = self.calibrated()?.power_lsb_uw();
        let raw = self.read_u16(reg::POWER)?;
        u32::try_from(u64::from(raw) * u64::from(lsb)).or(Err(Error::Overflow))
    }

    pub fn power_down(&mut self) -> Result<(), Error<I2C::Error>> {
        self.set_mode(Mode::PowerDown)
    }

    pub fn set_mode(&mut self, mode: Mode) -> Result<(), Error<I2C::Error>> {
        let cfg = self.read_u16(reg::CONFIG)?;
        self.write_u16(reg::CONFIG, (cfg & !MODE_MASK) | mode as u16)?;
        self.config.mode = mode;
        Ok(())
    }

    // current and power read zero until calibration is programmed
    fn calibrated(&self) -> Result<Calibration, Error<I2C::Error>> {
        self.calibration.ok_or(Error::InvalidArgument)
    }
}
