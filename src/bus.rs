// Register access over I2C or SPI
//
// Many Click chips expose the same register map on both buses and the
// board picks one with jumpers. Drivers take any `RegisterInterface`, and
// the two backends below do the per-bus framing:
//   I2C: [reg | auto_inc] then repeated-start read, or [reg, data..] write
//   SPI: first byte is reg | read flag | multi-byte flag

use embedded_hal::i2c::{I2c, Operation as I2cOperation};
use embedded_hal::spi::{Operation as SpiOperation, SpiDevice};

pub trait RegisterInterface {
    type Error;

    fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Self::Error>;

    fn write_registers(&mut self, reg: u8, data: &[u8]) -> Result<(), Self::Error>;

    fn read_register(&mut self, reg: u8) -> Result<u8, Self::Error> {
        let mut buf = [0u8; 1];
        self.read_registers(reg, &mut buf)?;
        Ok(buf[0])
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), Self::Error> {
        self.write_registers(reg, &[value])
    }

    /// Read-modify-write: bits in `mask` take the matching bits of `value`.
    fn modify_register(&mut self, reg: u8, mask: u8, value: u8) -> Result<u8, Self::Error> {
        let old = self.read_register(reg)?;
        let new = (old & !mask) | (value & mask);
        if new != old {
            self.write_register(reg, new)?;
        }
        Ok(new)
    }
}

pub struct I2cInterface<I2C> {
    i2c: I2C,
    address: u8,
    auto_increment: u8,
}

impl<I2C: I2c> I2cInterface<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self {
            i2c,
            address,
            auto_increment: 0,
        }
    }

    /// Bits OR'd into the register address on multi-byte reads and writes.
    pub fn with_auto_increment(mut self, mask: u8) -> Self {
        self.auto_increment = mask;
        self
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn bus(&mut self) -> &mut I2C {
        &mut self.i2c
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    #[inline]
    fn sub_address(&self, reg: u8, len: usize) -> u8 {
        if len > 1 { reg | self.auto_increment } else { reg }
    }
}

impl<I2C: I2c> RegisterInterface for I2cInterface<I2C> {
    type Error = I2C::Error;

    fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
        let sub = self.sub_address(reg, buf.len());
        self.i2c.write_read(self.address, &[sub], buf)
    }

    // adjacent writes go out back to back, no repeated start
    fn write_registers(&mut self, reg: u8, data: &[u8]) -> Result<(), Self::Error> {
        let sub = [self.sub_address(reg, data.len())];
        self.i2c.transaction(
            self.address,
            &mut [I2cOperation::Write(&sub), I2cOperation::Write(data)],
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiFlags {
    pub read: u8,
    pub multi: u8,
}

impl SpiFlags {
    /// Bit 7 = read, bit 6 = address increment (ST / ADI style).
    pub const READ_MSB_MULTI_BIT6: Self = Self {
        read: 0x80,
        multi: 0x40,
    };
}

pub struct SpiInterface<SPI> {
    spi: SPI,
    flags: SpiFlags,
}

impl<SPI: SpiDevice> SpiInterface<SPI> {
    pub fn new(spi: SPI, flags: SpiFlags) -> Self {
        Self { spi, flags }
    }

    pub fn release(self) -> SPI {
        self.spi
    }

    #[inline]
    fn header(&self, reg: u8, read: bool, len: usize) -> u8 {
        let mut b = reg & !(self.flags.read | self.flags.multi);
        if read {
            b |= self.flags.read;
        }
        if len > 1 {
            b |= self.flags.multi;
        }
        b
    }
}

impl<SPI: SpiDevice> RegisterInterface for SpiInterface<SPI> {
    type Error = SPI::Error;

    fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
        let header = [self.header(reg, true, buf.len())];
        self.spi
            .transaction(&mut [SpiOperation::Write(&header), SpiOperation::Read(buf)])
    }

    fn write_registers(&mut self, reg: u8, data: &[u8]) -> Result<(), Self::Error> {
        let header = [self.header(reg, false, data.len())];
        self.spi
            .transaction(&mut [SpiOperation::Write(&header), SpiOperation::Write(data)])
    }
}
