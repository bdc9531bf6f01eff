// SC18IS602B I2C to SPI bridge (I2C to SPI click)
//
// Every I2C write starts with a function id. 0x01..0x0F is an SPI
// transfer with that SS mask: the bridge clocks the payload out, keeps
// what came back in its 200-byte buffer, and the next I2C read returns
// it. Unused SS lines can be turned into GPIOs.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use embedded_hal::spi::{self, Operation, SpiDevice};
use log::debug;

use crate::error::Error;

pub const BASE_ADDRESS: u8 = 0x28;
pub const BUFFER_SIZE: usize = 200;

mod func {
    pub const CONFIGURE: u8 = 0xF0;
    pub const CLEAR_INTERRUPT: u8 = 0xF1;
    pub const IDLE: u8 = 0xF2;
    pub const GPIO_WRITE: u8 = 0xF4;
    pub const GPIO_READ: u8 = 0xF5;
    pub const GPIO_ENABLE: u8 = 0xF6;
    pub const GPIO_CONFIG: u8 = 0xF7;
}

const CONF_LSB_FIRST: u8 = 1 << 5;

// fixed bridge overhead on top of the bit time
const TRANSFER_OVERHEAD_US: u32 = 20;

/// Address with the A2..A0 straps.
pub const fn address(a2_a0: u8) -> u8 {
    BASE_ADDRESS | (a2_a0 & 0x07)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitOrder {
    #[default]
    MsbFirst,
    LsbFirst,
}

/// SPI clock from the 7.3728 MHz oscillator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clock {
    #[default]
    Khz1843 = 0b00,
    Khz461 = 0b01,
    Khz115 = 0b10,
    Khz58 = 0b11,
}

impl Clock {
    pub const fn khz(self) -> u32 {
        match self {
            Clock::Khz1843 => 1843,
            Clock::Khz461 => 461,
            Clock::Khz115 => 115,
            Clock::Khz58 => 58,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Mode0 = 0,
    Mode1 = 1,
    Mode2 = 2,
    Mode3 = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioMode {
    QuasiBidirectional = 0b00,
    PushPull = 0b01,
    InputOnly = 0b10,
    OpenDrain = 0b11,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Config {
    pub order: BitOrder,
    pub mode: Mode,
    pub clock: Clock,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            order: BitOrder::MsbFirst,
            mode: Mode::Mode0,
            clock: Clock::Khz1843,
        }
    }

    pub const fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub const fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub const fn with_order(mut self, order: BitOrder) -> Self {
        self.order = order;
        self
    }

    const fn byte(self) -> u8 {
        let order = match self.order {
            BitOrder::MsbFirst => 0,
            BitOrder::LsbFirst => CONF_LSB_FIRST,
        };
        order | ((self.mode as u8) << 2) | self.clock as u8
    }
}

pub struct Sc18is602<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
    config: Config,
    gpio_modes: u8,
}

impl<I2C: I2c, D: DelayNs> Sc18is602<I2C, D> {
    pub fn new(i2c: I2C, delay: D, address: u8, config: Config) -> Self {
        Self {
            i2c,
            delay,
            address,
            config,
            gpio_modes: 0,
        }
    }

    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    pub fn default_cfg(&mut self) -> Result<(), Error<I2C::Error>> {
        self.configure_spi(self.config)?;
        self.clear_interrupt()
    }

    pub fn configure_spi(&mut self, config: Config) -> Result<(), Error<I2C::Error>> {
        self.i2c.write(self.address, &[func::CONFIGURE, config.byte()])?;
        self.config = config;
        Ok(())
    }

    pub fn clear_interrupt(&mut self) -> Result<(), Error<I2C::Error>> {
        Ok(self.i2c.write(self.address, &[func::CLEAR_INTERRUPT])?)
    }

    pub fn idle(&mut self) -> Result<(), Error<I2C::Error>> {
        Ok(self.i2c.write(self.address, &[func::IDLE])?)
    }

    /// Full-duplex exchange on the SS lines in `ss_mask`; `buf` is
    /// replaced with the bytes clocked in.
    pub fn transfer(&mut self, ss_mask: u8, buf: &mut [u8]) -> Result<(), Error<I2C::Error>> {
        self.write(ss_mask, buf)?;
        self.i2c.read(self.address, buf)?;
        Ok(())
    }

    /// Clock `data` out and leave the received bytes in the bridge.
    pub fn write(&mut self, ss_mask: u8, data: &[u8]) -> Result<(), Error<I2C::Error>> {
        let ss = ss_mask & 0x0F;
        if ss == 0 || data.is_empty() || data.len() > BUFFER_SIZE {
            return Err(Error::InvalidArgument);
        }

        let mut frame = [0u8; BUFFER_SIZE + 1];
        frame[0] = ss;
        frame[1..=data.len()].copy_from_slice(data);
        self.i2c.write(self.address, &frame[..=data.len()])?;
        self.delay.delay_us(self.transfer_time_us(data.len()));
        debug!("sc18is602: {} bytes on SS 0x{:X}", data.len(), ss);
        Ok(())
    }

    /// Time the bridge needs to clock `len` bytes at the current rate.
    pub fn transfer_time_us(&self, len: usize) -> u32 {
        let bits = len as u32 * 8;
        bits * 1000 / self.config.clock.khz() + TRANSFER_OVERHEAD_US
    }

    /// Hand SS lines in `mask` over to GPIO use.
    pub fn gpio_enable(&mut self, mask: u8) -> Result<(), Error<I2C::Error>> {
        Ok(self.i2c.write(self.address, &[func::GPIO_ENABLE, mask & 0x0F])?)
    }

    pub fn gpio_configure(&mut self, pin: u8, mode: GpioMode) -> Result<(), Error<I2C::Error>> {
        if pin > 3 {
            return Err(Error::InvalidArgument);
        }
        // register is write-only, so the other pins' modes are kept here
        let shift = pin * 2;
        let cfg = (self.gpio_modes & !(0b11 << shift)) | ((mode as u8) << shift);
        self.i2c.write(self.address, &[func::GPIO_CONFIG, cfg])?;
        self.gpio_modes = cfg;
        Ok(())
    }

    pub fn gpio_write(&mut self, levels: u8) -> Result<(), Error<I2C::Error>> {
        Ok(self.i2c.write(self.address, &[func::GPIO_WRITE, levels & 0x0F])?)
    }

    pub fn gpio_read(&mut self) -> Result<u8, Error<I2C::Error>> {
        self.i2c.write(self.address, &[func::GPIO_READ])?;
        let mut buf = [0u8; 1];
        self.i2c.read(self.address, &mut buf)?;
        Ok(buf[0] & 0x0F)
    }

    /// An `SpiDevice` on one slave select, for drivers that want a plain
    /// SPI bus.
    pub fn device(&mut self, ss: u8) -> Result<BridgedDevice<'_, I2C, D>, Error<I2C::Error>> {
        if ss > 3 {
            return Err(Error::InvalidArgument);
        }
        Ok(BridgedDevice {
            bridge: self,
            ss_mask: 1 << ss,
        })
    }
}

pub struct BridgedDevice<'a, I2C, D> {
    bridge: &'a mut Sc18is602<I2C, D>,
    ss_mask: u8,
}

impl<I2C: I2c, D: DelayNs> spi::ErrorType for BridgedDevice<'_, I2C, D> {
    type Error = Error<I2C::Error>;
}

impl<I2C: I2c, D: DelayNs> SpiDevice for BridgedDevice<'_, I2C, D> {
    // SS only stays asserted inside one bridge frame, so the whole
    // transaction is flattened into a single transfer
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        let mut frame = [0u8; BUFFER_SIZE];
        let mut len = 0usize;

        for op in operations.iter() {
            let n = match op {
                Operation::Write(data) => data.len(),
                Operation::Read(buf) => buf.len(),
                Operation::Transfer(read, write) => read.len().max(write.len()),
                Operation::TransferInPlace(buf) => buf.len(),
                Operation::DelayNs(_) => 0,
            };
            if len + n > BUFFER_SIZE {
                return Err(Error::Overflow);
            }
            match op {
                Operation::Write(data) => frame[len..len + n].copy_from_slice(data),
                Operation::Transfer(_, write) => frame[len..len + write.len()].copy_from_slice(write),
                Operation::TransferInPlace(buf) => frame[len..len + n].copy_from_slice(buf),
                Operation::Read(_) | Operation::DelayNs(_) => {}
            }
            len += n;
        }

        if len == 0 {
            return Ok(());
        }
        self.bridge.transfer(self.ss_mask, &mut frame[..len])?;

        let mut at = 0usize;
        for op in operations.iter_mut() {
            match op {
                Operation::Write(data) => at += data.len(),
                Operation::Read(buf) => {
                    let n = buf.len();
                    buf.copy_from_slice(&frame[at..at + n]);
                    at += n;
                }
                Operation::Transfer(read, write) => {
                    let n = read.len().max(write.len());
                    let r = read.len();
                    read.copy_from_slice(&frame[at..at + r]);
                    at += n;
                }
                Operation::TransferInPlace(buf) => {
                    let n = buf.len();
                    buf.copy_from_slice(&frame[at..at + n]);
                    at += n;
                }
                Operation::DelayNs(_) => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockDelay, MockI2c};
    use std::vec;

    fn bridge(i2c: MockI2c) -> Sc18is602<MockI2c, MockDelay> {
        Sc18is602::new(i2c, MockDelay::new(), address(0), Config::new())
    }

    #[test]
    fn configure_byte_layout() {
        let mut b = bridge(MockI2c::new());
        let cfg = Config::new()
            .with_order(BitOrder::LsbFirst)
            .with_mode(Mode::Mode3)
            .with_clock(Clock::Khz58);
        b.configure_spi(cfg).unwrap();
        let (i2c, _) = b.release();
        assert_eq!(i2c.writes(), vec![vec![0xF0, 0b0010_1111]]);
        assert_eq!(i2c.transactions()[0].addr, 0x28);
    }

    #[test]
    fn transfer_writes_frame_then_reads_back() {
        let mut i2c = MockI2c::new();
        i2c.queue_read(&[0xAA, 0xBB]);
        let mut b = bridge(i2c);
        let mut buf = [0x9F, 0x00];
        b.transfer(0b0100, &mut buf).unwrap();
        assert_eq!(buf, [0xAA, 0xBB]);

        let (i2c, delay) = b.release();
        let t = i2c.transactions();
        assert_eq!(t[0].written, vec![0x04, 0x9F, 0x00]);
        assert_eq!(t[1].read_len, 2);
        assert!(delay.total_ns > 0);
    }

    #[test]
    fn transfer_limits() {
        let mut b = bridge(MockI2c::new());
        let mut big = [0u8; BUFFER_SIZE + 1];
        assert_eq!(b.transfer(1, &mut big), Err(Error::InvalidArgument));
        assert_eq!(b.transfer(0, &mut [1]), Err(Error::InvalidArgument));
        assert!(b.release().0.transactions().is_empty());
    }

    #[test]
    fn transfer_time_follows_clock() {
        let b = Sc18is602::new(MockI2c::new(), MockDelay::new(), address(0), Config::new().with_clock(Clock::Khz115));
        assert_eq!(b.transfer_time_us(10), 80 * 1000 / 115 + TRANSFER_OVERHEAD_US);
    }

    #[test]
    fn bridged_device_merges_operations() {
        let mut i2c = MockI2c::new();
        i2c.queue_read(&[0xFF, 0x01, 0x02, 0x03]);
        let mut b = bridge(i2c);
        {
            let mut dev = b.device(1).unwrap();
            let mut rx = [0u8; 3];
            dev.transaction(&mut [Operation::Write(&[0x03]), Operation::Read(&mut rx)])
                .unwrap();
            assert_eq!(rx, [0x01, 0x02, 0x03]);
        }
        let (i2c, _) = b.release();
        assert_eq!(i2c.transactions()[0].written, vec![0x02, 0x03, 0, 0, 0]);
    }

    #[test]
    fn bridged_transaction_past_buffer_is_overflow() {
        let mut b = bridge(MockI2c::new());
        {
            let mut dev = b.device(0).unwrap();
            let cmd = [0x02u8; 150];
            let mut rx = [0u8; 60];
            assert_eq!(
                dev.transaction(&mut [Operation::Write(&cmd), Operation::Read(&mut rx)]),
                Err(Error::Overflow)
            );
            // exactly one buffer still goes through
            let mut rx = [0u8; BUFFER_SIZE - 150];
            assert!(dev.transaction(&mut [Operation::Write(&cmd), Operation::Read(&mut rx)]).is_ok());
        }
        let (i2c, _) = b.release();
        let t = i2c.transactions();
        assert_eq!(t.len(), 2);
        assert_eq!(t[0].written.len(), 1 + BUFFER_SIZE);
    }

    #[test]
    fn gpio_config_keeps_other_pins() {
        let mut b = bridge(MockI2c::new());
        b.gpio_configure(0, GpioMode::PushPull).unwrap();
        b.gpio_configure(3, GpioMode::InputOnly).unwrap();
        assert_eq!(b.gpio_configure(4, GpioMode::PushPull), Err(Error::InvalidArgument));
        let (i2c, _) = b.release();
        assert_eq!(i2c.writes(), vec![vec![0xF7, 0b01], vec![0xF7, 0b1000_0001]]);
    }

    #[test]
    fn gpio_read_masks_low_nibble() {
        let mut i2c = MockI2c::new();
        i2c.queue_read(&[0xF5]);
        let mut b = bridge(i2c);
        assert_eq!(b.gpio_read(), Ok(0x05));
    }
}
