// FDC1004 4-channel capacitance-to-digital converter
//
// Four measurement slots, each with its own CONF_MEAS register pairing a
// positive input with CAPDAC, another input or nothing. Results are
// 24-bit two's complement split over an MSB/LSB register pair, 2^19 LSB
// per pF. CAPDAC adds a 3.125 pF offset per step.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, info, warn};

use crate::bus::{I2cInterface, RegisterInterface};
use crate::error::Error;

pub const ADDRESS: u8 = 0x50;
pub const MANUFACTURER_ID: u16 = 0x5449;
pub const DEVICE_ID: u16 = 0x1004;

pub const CAPDAC_MAX: u8 = 31;
const CAPDAC_STEP_FF: i32 = 3125;

mod reg {
    pub const MEAS1_MSB: u8 = 0x00;
    pub const CONF_MEAS1: u8 = 0x08;
    pub const FDC_CONF: u8 = 0x0C;
    pub const MANUFACTURER_ID: u8 = 0xFE;
    pub const DEVICE_ID: u8 = 0xFF;
}

const FDC_RESET: u16 = 1 << 15;
const FDC_REPEAT: u16 = 1 << 8;

const CHB_CAPDAC: u16 = 0b100;
const CHB_DISABLED: u16 = 0b111;

// DONE polling for measure_ff; one 100 S/s conversion is 10 ms
const POLL_INTERVAL_MS: u32 = 2;
const POLL_RETRIES: u32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measurement {
    Meas1 = 0,
    Meas2 = 1,
    Meas3 = 2,
    Meas4 = 3,
}

impl Measurement {
    const fn index(self) -> usize {
        self as usize
    }

    const fn enable_bit(self) -> u16 {
        1 << (7 - self as u16)
    }

    const fn done_bit(self) -> u16 {
        1 << (3 - self as u16)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Cin1 = 0,
    Cin2 = 1,
    Cin3 = 2,
    Cin4 = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rate {
    #[default]
    S100 = 0b01,
    S200 = 0b10,
    S400 = 0b11,
}

pub struct Fdc1004<I2C> {
    iface: I2cInterface<I2C>,
    capdac: [u8; 4],
}

impl<I2C: I2c> Fdc1004<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self {
            iface: I2cInterface::new(i2c, ADDRESS),
            capdac: [0; 4],
        }
    }

    pub fn release(self) -> I2C {
        self.iface.release()
    }

    pub fn default_cfg(&mut self) -> Result<(), Error<I2C::Error>> {
        let manufacturer = self.read_u16(reg::MANUFACTURER_ID)?;
        let device = self.read_u16(reg::DEVICE_ID)?;
        if manufacturer != MANUFACTURER_ID {
            warn!("fdc1004: manufacturer id 0x{:04X}", manufacturer);
            return Err(Error::InvalidDevice(manufacturer));
        }
        if device != DEVICE_ID {
            warn!("fdc1004: device id 0x{:04X}", device);
            return Err(Error::InvalidDevice(device));
        }
        self.reset()?;
        info!("fdc1004: ready");
        Ok(())
    }

    pub fn read_u16(&mut self, reg: u8) -> Result<u16, Error<I2C::Error>> {
        let mut buf = [0u8; 2];
        self.iface.read_registers(reg, &mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    pub fn write_u16(&mut self, reg: u8, value: u16) -> Result<(), Error<I2C::Error>> {
        Ok(self.iface.write_registers(reg, &value.to_be_bytes())?)
    }

    pub fn reset(&mut self) -> Result<(), Error<I2C::Error>> {
        self.capdac = [0; 4];
        self.write_u16(reg::FDC_CONF, FDC_RESET)
    }

    /// Single-ended measurement of `channel`, offset by `capdac` steps.
    pub fn configure_measurement(
        &mut self,
        meas: Measurement,
        channel: Channel,
        capdac: u8,
    ) -> Result<(), Error<I2C::Error>> {
        if capdac > CAPDAC_MAX {
            return Err(Error::InvalidArgument);
        }
        let chb = if capdac > 0 { CHB_CAPDAC } else { CHB_DISABLED };
        let conf = ((channel as u16) << 13) | (chb << 10) | ((capdac as u16) << 5);
        self.write_u16(reg::CONF_MEAS1 + meas as u8, conf)?;
        self.capdac[meas.index()] = capdac;
        Ok(())
    }

    /// `positive - negative`, no CAPDAC. Inputs must differ and the
    /// positive one must be the lower.
    pub fn configure_differential(
        &mut self,
        meas: Measurement,
        positive: Channel,
        negative: Channel,
    ) -> Result<(), Error<I2C::Error>> {
        if (positive as u8) >= (negative as u8) {
            return Err(Error::InvalidArgument);
        }
        let conf = ((positive as u16) << 13) | ((negative as u16) << 10);
        self.write_u16(reg::CONF_MEAS1 + meas as u8, conf)?;
        self.capdac[meas.index()] = 0;
        Ok(())
    }

    pub fn trigger(&mut self, meas: Measurement, rate: Rate, repeat: bool) -> Result<(), Error<I2C::Error>> {
        let mut v = ((rate as u16) << 10) | meas.enable_bit();
        if repeat {
            v |= FDC_REPEAT;
        }
        self.write_u16(reg::FDC_CONF, v)
    }

    pub fn measurement_done(&mut self, meas: Measurement) -> Result<bool, Error<I2C::Error>> {
        Ok(self.read_u16(reg::FDC_CONF)? & meas.done_bit() != 0)
    }

    pub fn read_raw(&mut self, meas: Measurement) -> Result<i32, Error<I2C::Error>> {
        let msb_reg = reg::MEAS1_MSB + 2 * meas as u8;
        let msb = self.read_u16(msb_reg)?;
        let lsb = self.read_u16(msb_reg + 1)?;
        Ok(combine_raw(msb, lsb))
    }

    /// Result in femtofarads including the CAPDAC offset.
    pub fn read_capacitance_ff(&mut self, meas: Measurement) -> Result<i32, Error<I2C::Error>> {
        let raw = self.read_raw(meas)?;
        Ok(raw_to_ff(raw, self.capdac[meas.index()]))
    }

    /// Configure, trigger one conversion, wait for it and read it back.
    pub fn measure_ff<D: DelayNs>(
        &mut self,
        delay: &mut D,
        meas: Measurement,
        channel: Channel,
        capdac: u8,
    ) -> Result<i32, Error<I2C::Error>> {
        self.configure_measurement(meas, channel, capdac)?;
        self.trigger(meas, Rate::S100, false)?;

        for _ in 0..POLL_RETRIES {
            delay.delay_ms(POLL_INTERVAL_MS);
            if self.measurement_done(meas)? {
                let ff = self.read_capacitance_ff(meas)?;
                debug!("fdc1004: {:?} {:?} = {} fF", meas, channel, ff);
                return Ok(ff);
            }
        }
        warn!("fdc1004: {:?} never completed", meas);
        Err(Error::Timeout)
    }
}

/// Sign-extend the 24-bit result held in MSB[15:0] and LSB[15:8].
pub fn combine_raw(msb: u16, lsb: u16) -> i32 {
    let raw = ((msb as u32) << 8) | ((lsb as u32) >> 8);
    ((raw << 8) as i32) >> 8
}

pub fn raw_to_ff(raw: i32, capdac: u8) -> i32 {
    let ff = (raw as i64 * 1000) >> 19;
    ff as i32 + capdac as i32 * CAPDAC_STEP_FF
}
