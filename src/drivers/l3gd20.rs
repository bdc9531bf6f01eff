// L3GD20 3-axis gyroscope (Gyro click)
//
// I2C sub-address bit 7 enables auto increment; on SPI bit 7 is read and
// bit 6 is auto increment. Output is little endian i16.

use embedded_hal::i2c::I2c;
use embedded_hal::spi::SpiDevice;
use log::{info, warn};

use crate::bus::{I2cInterface, RegisterInterface, SpiFlags, SpiInterface};
use crate::error::Error;

pub const ADDR_SA0_LOW: u8 = 0x6A;
pub const ADDR_SA0_HIGH: u8 = 0x6B;

pub const WHO_AM_I_L3GD20: u8 = 0xD4;
pub const WHO_AM_I_L3GD20H: u8 = 0xD7;

const I2C_AUTO_INCREMENT: u8 = 0x80;

mod reg {
    pub const WHO_AM_I: u8 = 0x0F;
    pub const CTRL_REG1: u8 = 0x20;
    pub const CTRL_REG4: u8 = 0x23;
    pub const OUT_TEMP: u8 = 0x26;
    pub const STATUS: u8 = 0x27;
    pub const OUT_X_L: u8 = 0x28;
}

// CTRL_REG1: DR[7:6] BW[5:4] PD[3] Zen Yen Xen
const CTRL1_POWER: u8 = 1 << 3;
const CTRL1_ALL_AXES: u8 = 0b111;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FullScale {
    #[default]
    Dps250 = 0,
    Dps500 = 1,
    Dps2000 = 2,
}

impl FullScale {
    /// Sensitivity in milli-dps per digit, ×100.
    const fn mdps_x100(self) -> i32 {
        match self {
            FullScale::Dps250 => 875,
            FullScale::Dps500 => 1750,
            FullScale::Dps2000 => 7000,
        }
    }
}

/// Output data rate, CTRL_REG1[7:6] (95 / 190 / 380 / 760 Hz).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataRate {
    #[default]
    Hz95 = 0,
    Hz190 = 1,
    Hz380 = 2,
    Hz760 = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Config {
    pub full_scale: FullScale,
    pub data_rate: DataRate,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            full_scale: FullScale::Dps250,
            data_rate: DataRate::Hz95,
        }
    }

    pub const fn with_full_scale(mut self, fs: FullScale) -> Self {
        self.full_scale = fs;
        self
    }

    pub const fn with_data_rate(mut self, dr: DataRate) -> Self {
        self.data_rate = dr;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub u8);

impl Status {
    /// New X, Y and Z sample available.
    pub fn xyz_available(self) -> bool {
        self.0 & (1 << 3) != 0
    }

    /// A sample was overwritten before being read.
    pub fn overrun(self) -> bool {
        self.0 & (1 << 7) != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rates {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

pub struct L3gd20<IFACE> {
    iface: IFACE,
    config: Config,
}

impl<I2C: I2c> L3gd20<I2cInterface<I2C>> {
    pub fn new_i2c(i2c: I2C, address: u8, config: Config) -> Self {
        let iface = I2cInterface::new(i2c, address).with_auto_increment(I2C_AUTO_INCREMENT);
        Self::new(iface, config)
    }
}

impl<SPI: SpiDevice> L3gd20<SpiInterface<SPI>> {
    pub fn new_spi(spi: SPI, config: Config) -> Self {
        Self::new(SpiInterface::new(spi, SpiFlags::READ_MSB_MULTI_BIT6), config)
    }
}

impl<IFACE, E> L3gd20<IFACE>
where
    IFACE: RegisterInterface<Error = E>,
{
    pub fn new(iface: IFACE, config: Config) -> Self {
        Self { iface, config }
    }

    pub fn release(self) -> IFACE {
        self.iface
    }

    pub fn default_cfg(&mut self) -> Result<(), Error<E>> {
        let id = self.iface.read_register(reg::WHO_AM_I)?;
        if id != WHO_AM_I_L3GD20 && id != WHO_AM_I_L3GD20H {
            warn!("l3gd20: unexpected WHO_AM_I 0x{:02X}", id);
            return Err(Error::InvalidDevice(id as u16));
        }

        let ctrl1 = ((self.config.data_rate as u8) << 6) | CTRL1_POWER | CTRL1_ALL_AXES;
        self.iface.write_register(reg::CTRL_REG1, ctrl1)?;
        self.set_full_scale(self.config.full_scale)?;
        info!("l3gd20: ready, {:?}", self.config.full_scale);
        Ok(())
    }

    pub fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Error<E>> {
        Ok(self.iface.read_registers(reg, buf)?)
    }

    pub fn write_registers(&mut self, reg: u8, data: &[u8]) -> Result<(), Error<E>> {
        Ok(self.iface.write_registers(reg, data)?)
    }

    pub fn set_full_scale(&mut self, fs: FullScale) -> Result<(), Error<E>> {
        self.iface.modify_register(reg::CTRL_REG4, 0b0011_0000, (fs as u8) << 4)?;
        self.config.full_scale = fs;
        Ok(())
    }

    pub fn power_down(&mut self) -> Result<(), Error<E>> {
        self.iface.modify_register(reg::CTRL_REG1, CTRL1_POWER, 0)?;
        Ok(())
    }

    pub fn status(&mut self) -> Result<Status, Error<E>> {
        Ok(Status(self.iface.read_register(reg::STATUS)?))
    }

    pub fn read_raw(&mut self) -> Result<(i16, i16, i16), Error<E>> {
        let mut buf = [0u8; 6];
        self.iface.read_registers(reg::OUT_X_L, &mut buf)?;
        Ok((
            i16::from_le_bytes([buf[0], buf[1]]),
            i16::from_le_bytes([buf[2], buf[3]]),
            i16::from_le_bytes([buf[4], buf[5]]),
        ))
    }

    /// Angular rate in milli-degrees per second.
    pub fn read_mdps(&mut self) -> Result<Rates, Error<E>> {
        let (x, y, z) = self.read_raw()?;
        let s = self.config.full_scale;
        Ok(Rates {
            x: raw_to_mdps(x, s),
            y: raw_to_mdps(y, s),
            z: raw_to_mdps(z, s),
        })
    }

    /// Uncalibrated die temperature, -1 LSB/°C.
    pub fn read_temperature_raw(&mut self) -> Result<i8, Error<E>> {
        Ok(self.iface.read_register(reg::OUT_TEMP)? as i8)
    }
}

pub fn raw_to_mdps(raw: i16, fs: FullScale) -> i32 {
    raw as i32 * fs.mdps_x100() / 100
}
