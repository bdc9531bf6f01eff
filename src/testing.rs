// Host-side stand-ins for the bus, pin, delay and UART traits.
//
// Mocks record every transaction for verification and replay
// pre-programmed read data in FIFO order.

use core::convert::Infallible;
use std::collections::VecDeque;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType as PinErrorType, OutputPin};
use embedded_hal::i2c::{self, I2c};
use embedded_hal::spi::{self, SpiDevice};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockError;

impl i2c::Error for MockError {
    fn kind(&self) -> i2c::ErrorKind {
        i2c::ErrorKind::NoAcknowledge(i2c::NoAcknowledgeSource::Address)
    }
}

impl spi::Error for MockError {
    fn kind(&self) -> spi::ErrorKind {
        spi::ErrorKind::Other
    }
}

// ── I2C ─────────────────────────────────────────────────────────────────

/// One bus transaction: all written bytes concatenated, total bytes read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I2cTransaction {
    pub addr: u8,
    pub written: Vec<u8>,
    pub read_len: usize,
}

#[derive(Debug, Default)]
pub struct MockI2c {
    transactions: Vec<I2cTransaction>,
    read_data: VecDeque<u8>,
    fail_after: Option<usize>,
}

impl MockI2c {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_read(&mut self, data: &[u8]) {
        self.read_data.extend(data.iter().copied());
    }

    /// Let `n` more transactions succeed, then NACK everything.
    pub fn fail_after(&mut self, n: usize) {
        self.fail_after = Some(self.transactions.len() + n);
    }

    pub fn transactions(&self) -> Vec<I2cTransaction> {
        self.transactions.clone()
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.transactions
            .iter()
            .filter(|t| t.read_len == 0)
            .map(|t| t.written.clone())
            .collect()
    }

}

impl i2c::ErrorType for MockI2c {
    type Error = MockError;
}

impl I2c for MockI2c {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [i2c::Operation<'_>],
    ) -> Result<(), Self::Error> {
        if self.fail_after.is_some_and(|n| self.transactions.len() >= n) {
            return Err(MockError);
        }

        let mut t = I2cTransaction {
            addr: address,
            written: Vec::new(),
            read_len: 0,
        };
        for op in operations.iter_mut() {
            match op {
                i2c::Operation::Write(data) => t.written.extend_from_slice(data),
                i2c::Operation::Read(buf) => {
                    t.read_len += buf.len();
                    for b in buf.iter_mut() {
                        *b = self.read_data.pop_front().unwrap_or(0);
                    }
                }
            }
        }
        self.transactions.push(t);
        Ok(())
    }
}

// ── SPI ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MockSpi {
    transactions: Vec<Vec<u8>>,
    read_data: VecDeque<u8>,
}

impl MockSpi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_read(&mut self, data: &[u8]) {
        self.read_data.extend(data.iter().copied());
    }

    /// Bytes clocked out per chip-select frame.
    pub fn transactions(&self) -> Vec<Vec<u8>> {
        self.transactions.clone()
    }

    fn next(&mut self) -> u8 {
        self.read_data.pop_front().unwrap_or(0)
    }
}

impl spi::ErrorType for MockSpi {
    type Error = MockError;
}

impl SpiDevice for MockSpi {
    fn transaction(&mut self, operations: &mut [spi::Operation<'_, u8>]) -> Result<(), Self::Error> {
        let mut out = Vec::new();
        for op in operations.iter_mut() {
            match op {
                spi::Operation::Write(data) => out.extend_from_slice(data),
                spi::Operation::Read(buf) => {
                    out.extend(core::iter::repeat_n(0u8, buf.len()));
                    for b in buf.iter_mut() {
                        *b = self.next();
                    }
                }
                spi::Operation::Transfer(read, write) => {
                    out.extend_from_slice(write);
                    for b in read.iter_mut() {
                        *b = self.next();
                    }
                }
                spi::Operation::TransferInPlace(buf) => {
                    out.extend_from_slice(buf);
                    for b in buf.iter_mut() {
                        *b = self.next();
                    }
                }
                spi::Operation::DelayNs(_) => {}
            }
        }
        self.transactions.push(out);
        Ok(())
    }
}

// ── GPIO ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MockPin {
    high: bool,
    history: Vec<bool>,
}

impl MockPin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set_high(&self) -> bool {
        self.high
    }

    /// Every level driven, in order.
    pub fn history(&self) -> Vec<bool> {
        self.history.clone()
    }

    pub fn rising_edges(&self) -> usize {
        let mut prev = false;
        let mut n = 0;
        for &lvl in &self.history {
            if lvl && !prev {
                n += 1;
            }
            prev = lvl;
        }
        n
    }
}

impl PinErrorType for MockPin {
    type Error = Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        self.history.push(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high = true;
        self.history.push(true);
        Ok(())
    }
}

// ── Delay ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MockDelay {
    pub total_ns: u64,
    pub calls: usize,
}

impl MockDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_ms(&self) -> u64 {
        self.total_ns / 1_000_000
    }
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += ns as u64;
        self.calls += 1;
    }
}

#[cfg(feature = "async")]
impl embedded_hal_async::delay::DelayNs for MockDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.total_ns += ns as u64;
        self.calls += 1;
    }
}

// ── UART ────────────────────────────────────────────────────────────────

/// Serial line with a scripted peer.
///
/// Each `flush()` releases the next scripted reply. A reply becomes
/// readable after its configured number of `read_ready` polls.
#[derive(Debug, Default)]
pub struct MockSerial {
    tx: Vec<u8>,
    rx: VecDeque<u8>,
    script: VecDeque<(usize, Vec<u8>)>,
    pending: Option<(usize, Vec<u8>)>,
    chunk: Option<usize>,
}

impl MockSerial {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply immediately after the next command.
    pub fn reply(&mut self, data: &[u8]) {
        self.reply_after(0, data);
    }

    /// Reply after `polls` readiness checks.
    pub fn reply_after(&mut self, polls: usize, data: &[u8]) {
        self.script.push_back((polls, data.to_vec()));
    }

    /// Bytes already on the line (e.g. an unsolicited result code).
    pub fn queue_rx(&mut self, data: &[u8]) {
        self.rx.extend(data.iter().copied());
    }

    /// Limit each `read` to `n` bytes.
    pub fn read_chunk(&mut self, n: usize) {
        self.chunk = Some(n);
    }

    pub fn sent(&self) -> Vec<u8> {
        self.tx.clone()
    }

    pub fn sent_str(&self) -> std::string::String {
        std::string::String::from_utf8_lossy(&self.tx).into_owned()
    }

    fn poll_pending(&mut self) {
        if let Some((polls, _)) = self.pending.as_mut() {
            if *polls == 0 {
                if let Some((_, data)) = self.pending.take() {
                    self.rx.extend(data);
                }
            } else {
                *polls -= 1;
            }
        }
    }

    fn read_into(&mut self, buf: &mut [u8]) -> usize {
        let max = self.chunk.unwrap_or(buf.len()).min(buf.len());
        let mut n = 0;
        while n < max {
            match self.rx.pop_front() {
                Some(b) => {
                    buf[n] = b;
                    n += 1;
                }
                None => break,
            }
        }
        n
    }

    fn on_flush(&mut self) {
        if let Some((_, data)) = self.pending.take() {
            self.rx.extend(data);
        }
        self.pending = self.script.pop_front();
        if matches!(self.pending, Some((0, _))) {
            self.poll_pending();
        }
    }
}

impl embedded_io::ErrorType for MockSerial {
    type Error = Infallible;
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        Ok(self.read_into(buf))
    }
}

impl embedded_io::ReadReady for MockSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        if self.rx.is_empty() {
            self.poll_pending();
        }
        Ok(!self.rx.is_empty())
    }
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.tx.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.on_flush();
        Ok(())
    }
}

#[cfg(feature = "async")]
impl embedded_io_async::Read for MockSerial {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        Ok(self.read_into(buf))
    }
}

#[cfg(feature = "async")]
impl embedded_io_async::Write for MockSerial {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.tx.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.on_flush();
        Ok(())
    }
}

/// Drives a future to completion on the test thread.
#[cfg(feature = "async")]
pub fn block_on<F: core::future::Future>(fut: F) -> F::Output {
    use core::task::{Context, Poll, Waker};

    let mut fut = core::pin::pin!(fut);
    let mut cx = Context::from_waker(Waker::noop());
    loop {
        if let Poll::Ready(out) = fut.as_mut().poll(&mut cx) {
            return out;
        }
    }
}
