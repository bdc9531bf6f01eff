// ADXL345 3-axis accelerometer (Accel click)
//
// Same register map on I2C and SPI (mode 3, 5MHz max). Data registers are
// little endian i16. Full resolution keeps 3.9 mg/LSB at every range;
// fixed 10-bit mode doubles the step for each range up.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use embedded_hal::spi::SpiDevice;
use log::{info, warn};

use crate::bus::{I2cInterface, RegisterInterface, SpiFlags, SpiInterface};
use crate::error::Error;

pub const ADDR_ALT_LOW: u8 = 0x53;
pub const ADDR_ALT_HIGH: u8 = 0x1D;
pub const DEVICE_ID: u8 = 0xE5;

mod reg {
    pub const DEVID: u8 = 0x00;
    pub const OFSX: u8 = 0x1E;
    pub const BW_RATE: u8 = 0x2C;
    pub const POWER_CTL: u8 = 0x2D;
    pub const INT_ENABLE: u8 = 0x2E;
    pub const INT_SOURCE: u8 = 0x30;
    pub const DATA_FORMAT: u8 = 0x31;
    pub const DATAX0: u8 = 0x32;
}

const POWER_CTL_MEASURE: u8 = 1 << 3;
const DATA_FORMAT_FULL_RES: u8 = 1 << 3;
const INT_DATA_READY: u8 = 1 << 7;

// ×10 to stay integer: 3.9 mg/LSB
const FULL_RES_MG_X10: i32 = 39;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Range {
    #[default]
    G2 = 0,
    G4 = 1,
    G8 = 2,
    G16 = 3,
}

/// Output data rate, BW_RATE[3:0].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataRate {
    Hz12_5 = 0x07,
    Hz25 = 0x08,
    Hz50 = 0x09,
    #[default]
    Hz100 = 0x0A,
    Hz200 = 0x0B,
    Hz400 = 0x0C,
    Hz800 = 0x0D,
    Hz1600 = 0x0E,
    Hz3200 = 0x0F,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub range: Range,
    pub data_rate: DataRate,
    pub full_resolution: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub const fn new() -> Self {
        Self {
            range: Range::G2,
            data_rate: DataRate::Hz100,
            full_resolution: true,
        }
    }

    pub const fn with_range(mut self, range: Range) -> Self {
        self.range = range;
        self
    }

    pub const fn with_data_rate(mut self, rate: DataRate) -> Self {
        self.data_rate = rate;
        self
    }

    pub const fn with_full_resolution(mut self, on: bool) -> Self {
        self.full_resolution = on;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Axes {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

pub struct Adxl345<IFACE> {
    iface: IFACE,
    config: Config,
}

impl<I2C: I2c> Adxl345<I2cInterface<I2C>> {
    pub fn new_i2c(i2c: I2C, address: u8, config: Config) -> Self {
        Self::new(I2cInterface::new(i2c, address), config)
    }
}

impl<SPI: SpiDevice> Adxl345<SpiInterface<SPI>> {
    pub fn new_spi(spi: SPI, config: Config) -> Self {
        Self::new(SpiInterface::new(spi, SpiFlags::READ_MSB_MULTI_BIT6), config)
    }
}

impl<IFACE, E> Adxl345<IFACE>
where
    IFACE: RegisterInterface<Error = E>,
{
    pub fn new(iface: IFACE, config: Config) -> Self {
        Self { iface, config }
    }

    pub fn release(self) -> IFACE {
        self.iface
    }

    /// Checks DEVID, applies the config and starts measuring.
    pub fn default_cfg<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), Error<E>> {
        let id = self.device_id()?;
        if id != DEVICE_ID {
            warn!("adxl345: unexpected DEVID 0x{:02X}", id);
            return Err(Error::InvalidDevice(id as u16));
        }

        // standby while configuring
        self.iface.write_register(reg::POWER_CTL, 0x00)?;
        self.iface.write_register(reg::BW_RATE, self.config.data_rate as u8)?;
        self.write_data_format()?;
        self.iface.write_register(reg::INT_ENABLE, INT_DATA_READY)?;
        self.iface.write_register(reg::POWER_CTL, POWER_CTL_MEASURE)?;
        delay.delay_ms(2);

        info!("adxl345: ready, range {:?}, {:?}", self.config.range, self.config.data_rate);
        Ok(())
    }

    pub fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Error<E>> {
        Ok(self.iface.read_registers(reg, buf)?)
    }

    pub fn write_registers(&mut self, reg: u8, data: &[u8]) -> Result<(), Error<E>> {
        Ok(self.iface.write_registers(reg, data)?)
    }

    pub fn device_id(&mut self) -> Result<u8, Error<E>> {
        Ok(self.iface.read_register(reg::DEVID)?)
    }

    pub fn set_range(&mut self, range: Range) -> Result<(), Error<E>> {
        self.config.range = range;
        self.write_data_format()
    }

    pub fn set_data_rate(&mut self, rate: DataRate) -> Result<(), Error<E>> {
        self.config.data_rate = rate;
        Ok(self.iface.write_register(reg::BW_RATE, rate as u8)?)
    }

    /// Per-axis offsets, 15.6 mg/LSB, added to every sample by the chip.
    pub fn set_offsets(&mut self, x: i8, y: i8, z: i8) -> Result<(), Error<E>> {
        Ok(self
            .iface
            .write_registers(reg::OFSX, &[x as u8, y as u8, z as u8])?)
    }

    pub fn interrupt_source(&mut self) -> Result<u8, Error<E>> {
        Ok(self.iface.read_register(reg::INT_SOURCE)?)
    }

    pub fn data_ready(&mut self) -> Result<bool, Error<E>> {
        Ok(self.interrupt_source()? & INT_DATA_READY != 0)
    }

    pub fn read_raw(&mut self) -> Result<(i16, i16, i16), Error<E>> {
        let mut buf = [0u8; 6];
        self.iface.read_registers(reg::DATAX0, &mut buf)?;
        Ok((
            i16::from_le_bytes([buf[0], buf[1]]),
            i16::from_le_bytes([buf[2], buf[3]]),
            i16::from_le_bytes([buf[4], buf[5]]),
        ))
    }

    /// Acceleration in milli-g.
    pub fn read_accel_mg(&mut self) -> Result<Axes, Error<E>> {
        let (x, y, z) = self.read_raw()?;
        Ok(Axes {
            x: raw_to_mg(x, self.config),
            y: raw_to_mg(y, self.config),
            z: raw_to_mg(z, self.config),
        })
    }

    fn write_data_format(&mut self) -> Result<(), Error<E>> {
        let mut v = self.config.range as u8;
        if self.config.full_resolution {
            v |= DATA_FORMAT_FULL_RES;
        }
        Ok(self.iface.write_register(reg::DATA_FORMAT, v)?)
    }
}

pub fn raw_to_mg(raw: i16, config: Config) -> i32 {
    let scale = if config.full_resolution {
        FULL_RES_MG_X10
    } else {
        FULL_RES_MG_X10 << (config.range as u8)
    };
    raw as i32 * scale / 10
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockDelay, MockI2c, MockSpi};
    use std::vec;

    #[test]
    fn default_cfg_programs_registers_in_order() {
        let mut i2c = MockI2c::new();
        i2c.queue_read(&[DEVICE_ID]);
        let mut accel = Adxl345::new_i2c(i2c, ADDR_ALT_LOW, Config::new().with_range(Range::G4));
        accel.default_cfg(&mut MockDelay::new()).unwrap();

        let writes = accel.release().release().writes();
        assert_eq!(
            writes,
            vec![
                vec![reg::POWER_CTL, 0x00],
                vec![reg::BW_RATE, 0x0A],
                vec![reg::DATA_FORMAT, 0x09],
                vec![reg::INT_ENABLE, 0x80],
                vec![reg::POWER_CTL, 0x08],
            ]
        );
    }

    #[test]
    fn wrong_device_id_is_rejected() {
        let mut i2c = MockI2c::new();
        i2c.queue_read(&[0x00]);
        let mut accel = Adxl345::new_i2c(i2c, ADDR_ALT_LOW, Config::new());
        assert_eq!(
            accel.default_cfg(&mut MockDelay::new()),
            Err(Error::InvalidDevice(0))
        );
    }

    #[test]
    fn converts_full_resolution_samples() {
        let mut i2c = MockI2c::new();
        // x = 256 (~1 g), y = -256, z = 0
        i2c.queue_read(&[0x00, 0x01, 0x00, 0xFF, 0x00, 0x00]);
        let mut accel = Adxl345::new_i2c(i2c, ADDR_ALT_HIGH, Config::new());
        let a = accel.read_accel_mg().unwrap();
        assert_eq!(a, Axes { x: 998, y: -998, z: 0 });
    }

    #[test]
    fn fixed_resolution_scales_with_range() {
        let cfg = Config::new().with_full_resolution(false).with_range(Range::G16);
        assert_eq!(raw_to_mg(100, cfg), 100 * 312 / 10);
        let cfg = cfg.with_range(Range::G2);
        assert_eq!(raw_to_mg(100, cfg), 390);
    }

    #[test]
    fn spi_burst_read_uses_multibyte_header() {
        let mut spi = MockSpi::new();
        spi.queue_read(&[1, 0, 2, 0, 3, 0]);
        let mut accel = Adxl345::new_spi(spi, Config::new());
        assert_eq!(accel.read_raw().unwrap(), (1, 2, 3));
        assert_eq!(accel.release().release().transactions()[0][0], 0xF2);
    }

    #[test]
    fn data_ready_reads_int_source() {
        let mut i2c = MockI2c::new();
        i2c.queue_read(&[0x83, 0x03]);
        let mut accel = Adxl345::new_i2c(i2c, ADDR_ALT_LOW, Config::new());
        assert_eq!(accel.data_ready(), Ok(true));
        assert_eq!(accel.data_ready(), Ok(false));
    }
}
