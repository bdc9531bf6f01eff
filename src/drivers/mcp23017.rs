// MCP23017 16-bit I/O expander (Expand 2 click)
//
// IOCON.BANK = 0: every port A register is followed by its port B twin,
// so 16-bit accesses are a two-byte sequential transfer starting at A.
// Pins 0..7 are GPA0..7, 8..15 are GPB0..7.

use embedded_hal::i2c::I2c;
use log::info;

use crate::bus::{I2cInterface, RegisterInterface};
use crate::error::Error;

pub const BASE_ADDRESS: u8 = 0x20;

mod reg {
    pub const IODIRA: u8 = 0x00;
    pub const IPOLA: u8 = 0x02;
    pub const GPINTENA: u8 = 0x04;
    pub const DEFVALA: u8 = 0x06;
    pub const INTCONA: u8 = 0x08;
    pub const IOCON: u8 = 0x0A;
    pub const GPPUA: u8 = 0x0C;
    pub const INTFA: u8 = 0x0E;
    pub const INTCAPA: u8 = 0x10;
    pub const GPIOA: u8 = 0x12;
    pub const OLATA: u8 = 0x14;
}

const IOCON_MIRROR: u8 = 1 << 6;
const IOCON_ODR: u8 = 1 << 2;
const IOCON_INTPOL: u8 = 1 << 1;

/// Address with the A2..A0 straps.
pub const fn address(a2_a0: u8) -> u8 {
    BASE_ADDRESS | (a2_a0 & 0x07)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    A = 0,
    B = 1,
}

/// What a pin with interrupts enabled compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptOn {
    /// Any change from the previous value.
    Change,
    /// Differs from the given DEFVAL bits.
    Compare(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Config {
    /// INTA and INTB both fire for either port.
    pub mirror_interrupts: bool,
    pub interrupt_open_drain: bool,
    pub interrupt_active_high: bool,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            mirror_interrupts: false,
            interrupt_open_drain: false,
            interrupt_active_high: false,
        }
    }

    pub const fn with_mirror_interrupts(mut self, on: bool) -> Self {
        self.mirror_interrupts = on;
        self
    }

    pub const fn with_interrupt_open_drain(mut self, on: bool) -> Self {
        self.interrupt_open_drain = on;
        self
    }

    pub const fn with_interrupt_active_high(mut self, on: bool) -> Self {
        self.interrupt_active_high = on;
        self
    }

    const fn iocon(self) -> u8 {
        let mut v = 0;
        if self.mirror_interrupts {
            v |= IOCON_MIRROR;
        }
        if self.interrupt_open_drain {
            v |= IOCON_ODR;
        }
        if self.interrupt_active_high {
            v |= IOCON_INTPOL;
        }
        v
    }
}

const fn port_reg(base: u8, port: Port) -> u8 {
    base + port as u8
}

fn split_pin(pin: u8) -> Option<(Port, u8)> {
    match pin {
        0..=7 => Some((Port::A, 1 << pin)),
        8..=15 => Some((Port::B, 1 << (pin - 8))),
        _ => None,
    }
}

pub struct Mcp23017<I2C> {
    iface: I2cInterface<I2C>,
    config: Config,
}

impl<I2C: I2c> Mcp23017<I2C> {
    pub fn new(i2c: I2C, address: u8, config: Config) -> Self {
        Self {
            iface: I2cInterface::new(i2c, address),
            config,
        }
    }

    pub fn release(self) -> I2C {
        self.iface.release()
    }

    /// BANK = 0, sequential addressing, every pin an input.
    pub fn default_cfg(&mut self) -> Result<(), Error<I2C::Error>> {
        self.iface.write_register(reg::IOCON, self.config.iocon())?;
        self.iface.write_registers(reg::IODIRA, &[0xFF, 0xFF])?;
        info!("mcp23017: 0x{:02X} ready", self.iface.address());
        Ok(())
    }

    pub fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Error<I2C::Error>> {
        Ok(self.iface.read_registers(reg, buf)?)
    }

    pub fn write_registers(&mut self, reg: u8, data: &[u8]) -> Result<(), Error<I2C::Error>> {
        Ok(self.iface.write_registers(reg, data)?)
    }

    /// Set bits are inputs, clear bits outputs.
    pub fn set_direction(&mut self, port: Port, inputs: u8) -> Result<(), Error<I2C::Error>> {
        Ok(self.iface.write_register(port_reg(reg::IODIRA, port), inputs)?)
    }

    pub fn set_pull_ups(&mut self, port: Port, mask: u8) -> Result<(), Error<I2C::Error>> {
        Ok(self.iface.write_register(port_reg(reg::GPPUA, port), mask)?)
    }

    /// Set bits read back inverted.
    pub fn set_polarity(&mut self, port: Port, inverted: u8) -> Result<(), Error<I2C::Error>> {
        Ok(self.iface.write_register(port_reg(reg::IPOLA, port), inverted)?)
    }

    pub fn write_port(&mut self, port: Port, value: u8) -> Result<(), Error<I2C::Error>> {
        Ok(self.iface.write_register(port_reg(reg::OLATA, port), value)?)
    }

    pub fn read_port(&mut self, port: Port) -> Result<u8, Error<I2C::Error>> {
        Ok(self.iface.read_register(port_reg(reg::GPIOA, port))?)
    }

    /// Both ports at once, A in the low byte.
    pub fn write_all(&mut self, value: u16) -> Result<(), Error<I2C::Error>> {
        Ok(self.iface.write_registers(reg::OLATA, &value.to_le_bytes())?)
    }

    pub fn read_all(&mut self) -> Result<u16, Error<I2C::Error>> {
        let mut buf = [0u8; 2];
        self.iface.read_registers(reg::GPIOA, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn set_pin(&mut self, pin: u8, high: bool) -> Result<(), Error<I2C::Error>> {
        let Some((port, bit)) = split_pin(pin) else {
            return Err(Error::InvalidArgument);
        };
        let value = if high { bit } else { 0 };
        self.iface.modify_register(port_reg(reg::OLATA, port), bit, value)?;
        Ok(())
    }

    pub fn read_pin(&mut self, pin: u8) -> Result<bool, Error<I2C::Error>> {
        let Some((port, bit)) = split_pin(pin) else {
            return Err(Error::InvalidArgument);
        };
        Ok(self.read_port(port)? & bit != 0)
    }

    pub fn toggle_pin(&mut self, pin: u8) -> Result<(), Error<I2C::Error>> {
        let Some((port, bit)) = split_pin(pin) else {
            return Err(Error::InvalidArgument);
        };
        let olat = port_reg(reg::OLATA, port);
        let v = self.iface.read_register(olat)?;
        Ok(self.iface.write_register(olat, v ^ bit)?)
    }

    pub fn enable_interrupts(&mut self, port: Port, mask: u8, on: InterruptOn) -> Result<(), Error<I2C::Error>> {
        match on {
            InterruptOn::Change => {
                self.iface.modify_register(port_reg(reg::INTCONA, port), mask, 0)?;
            }
            InterruptOn::Compare(defval) => {
                self.iface.write_register(port_reg(reg::DEFVALA, port), defval)?;
                self.iface.modify_register(port_reg(reg::INTCONA, port), mask, mask)?;
            }
        }
        self.iface.modify_register(port_reg(reg::GPINTENA, port), mask, mask)?;
        Ok(())
    }

    pub fn disable_interrupts(&mut self, port: Port, mask: u8) -> Result<(), Error<I2C::Error>> {
        self.iface.modify_register(port_reg(reg::GPINTENA, port), mask, 0)?;
        Ok(())
    }

    /// Pins that caused the pending interrupt.
    pub fn interrupt_flags(&mut self, port: Port) -> Result<u8, Error<I2C::Error>> {
        Ok(self.iface.read_register(port_reg(reg::INTFA, port))?)
    }

    /// Port state latched at the interrupt; reading it clears the interrupt.
    pub fn interrupt_capture(&mut self, port: Port) -> Result<u8, Error<I2C::Error>> {
        Ok(self.iface.read_register(port_reg(reg::INTCAPA, port))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockI2c;
    use std::vec;

    fn expander(i2c: MockI2c) -> Mcp23017<MockI2c> {
        Mcp23017::new(i2c, address(0b001), Config::new())
    }

    #[test]
    fn default_cfg_makes_everything_input() {
        let mut io = Mcp23017::new(MockI2c::new(), address(0), Config::new().with_mirror_interrupts(true));
        io.default_cfg().unwrap();
        let i2c = io.release();
        assert_eq!(i2c.writes(), vec![vec![0x0A, 0x40], vec![0x00, 0xFF, 0xFF]]);
        assert_eq!(i2c.transactions()[0].addr, 0x20);
    }

    #[test]
    fn port_b_registers_follow_port_a() {
        let mut io = expander(MockI2c::new());
        io.set_direction(Port::B, 0x0F).unwrap();
        io.set_pull_ups(Port::A, 0x03).unwrap();
        io.write_port(Port::B, 0xAA).unwrap();
        io.set_polarity(Port::B, 0x01).unwrap();
        assert_eq!(
            io.release().writes(),
            vec![vec![0x01, 0x0F], vec![0x0C, 0x03], vec![0x15, 0xAA], vec![0x03, 0x01]]
        );
    }

    #[test]
    fn pin_writes_touch_one_bit() {
        let mut i2c = MockI2c::new();
        // OLATB for set_pin(9), then OLATA for toggle_pin(0)
        i2c.queue_read(&[0b0000_0001, 0b1000_0000]);
        let mut io = expander(i2c);
        io.set_pin(9, true).unwrap();
        io.toggle_pin(0).unwrap();
        assert_eq!(io.set_pin(16, true), Err(Error::InvalidArgument));
        assert_eq!(
            io.release().writes(),
            vec![vec![0x15, 0b0000_0011], vec![0x14, 0b1000_0001]]
        );
    }

    #[test]
    fn read_pin_and_all() {
        let mut i2c = MockI2c::new();
        i2c.queue_read(&[0x00, 0x80, 0x34, 0x12]);
        let mut io = expander(i2c);
        assert_eq!(io.read_pin(3), Ok(false));
        assert_eq!(io.read_pin(15), Ok(true));
        assert_eq!(io.read_all(), Ok(0x1234));
    }

    #[test]
    fn compare_interrupts_program_defval() {
        let mut io = expander(MockI2c::new());
        io.enable_interrupts(Port::A, 0x0F, InterruptOn::Compare(0x05)).unwrap();
        assert_eq!(
            io.release().writes(),
            vec![vec![0x06, 0x05], vec![0x08, 0x0F], vec![0x04, 0x0F]]
        );
    }

    #[test]
    fn change_interrupts_skip_unchanged_intcon() {
        let mut io = expander(MockI2c::new());
        io.enable_interrupts(Port::B, 0x01, InterruptOn::Change).unwrap();
        assert_eq!(io.release().writes(), vec![vec![0x05, 0x01]]);
    }
}
