// Blocking AT command engine
//
// Half duplex: clear buffer -> send -> poll (drain UART, classify) every
// poll_interval_ms until a result arrives or the budget runs out.
// Budget = timeout_ms / poll_interval_ms iterations; 120 000 x 1ms by
// default, long enough for network attach commands.

use embedded_hal::delay::DelayNs;
use embedded_io::{Read, ReadReady, Write};
use log::{debug, warn};

use super::buffer::ResponseBuffer;
use super::response::{Outcome, Tokens, classify};
use crate::error::Error;

pub const DEFAULT_TIMEOUT_MS: u32 = 120_000;
pub const DEFAULT_POLL_INTERVAL_MS: u32 = 1;
pub const DEFAULT_BUFFER_SIZE: usize = 512;

const RX_CHUNK: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub timeout_ms: u32,
    pub poll_interval_ms: u32,
    /// Appended after every command.
    pub terminator: &'static str,
    pub tokens: Tokens,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub const fn new() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            terminator: "\r\n",
            tokens: Tokens::V25,
        }
    }

    pub const fn with_timeout_ms(mut self, ms: u32) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub const fn with_poll_interval_ms(mut self, ms: u32) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub const fn with_terminator(mut self, terminator: &'static str) -> Self {
        self.terminator = terminator;
        self
    }

    pub const fn with_tokens(mut self, tokens: Tokens) -> Self {
        self.tokens = tokens;
        self
    }

    /// Polling iterations that fit in `timeout_ms`.
    pub const fn budget(&self, timeout_ms: u32) -> u32 {
        let n = match timeout_ms.checked_div(self.poll_interval_ms) {
            Some(n) => n,
            None => timeout_ms,
        };
        if n == 0 { 1 } else { n }
    }
}

pub struct AtEngine<UART, D, const N: usize = DEFAULT_BUFFER_SIZE> {
    uart: UART,
    delay: D,
    buffer: ResponseBuffer<N>,
    config: Config,
}

impl<UART, D, const N: usize> AtEngine<UART, D, N>
where
    UART: Read + ReadReady + Write,
    D: DelayNs,
{
    pub fn new(uart: UART, delay: D, config: Config) -> Self {
        Self {
            uart,
            delay,
            buffer: ResponseBuffer::new(),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn set_timeout_ms(&mut self, ms: u32) {
        self.config.timeout_ms = ms;
    }

    pub fn delay_mut(&mut self) -> &mut D {
        &mut self.delay
    }

    pub fn buffer(&self) -> &ResponseBuffer<N> {
        &self.buffer
    }

    /// Everything received since the last exchange started.
    pub fn response(&self) -> &str {
        self.buffer.text()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn release(self) -> (UART, D) {
        (self.uart, self.delay)
    }

    // ── Transmit ────────────────────────────────────────────────────

    pub fn send(&mut self, cmd: &str) -> Result<(), Error<UART::Error>> {
        debug!("at> {}", cmd);
        self.write_parts(&[cmd])
    }

    /// `cmd=param`
    pub fn send_with_parameter(&mut self, cmd: &str, param: &str) -> Result<(), Error<UART::Error>> {
        debug!("at> {}={}", cmd, param);
        self.write_parts(&[cmd, "=", param])
    }

    /// `cmd=?`
    pub fn send_test(&mut self, cmd: &str) -> Result<(), Error<UART::Error>> {
        debug!("at> {}=?", cmd);
        self.write_parts(&[cmd, "=?"])
    }

    /// `cmd?`
    pub fn send_query(&mut self, cmd: &str) -> Result<(), Error<UART::Error>> {
        debug!("at> {}?", cmd);
        self.write_parts(&[cmd, "?"])
    }

    /// Bytes as-is, no terminator.
    pub fn send_raw(&mut self, data: &[u8]) -> Result<(), Error<UART::Error>> {
        self.uart.write_all(data)?;
        self.uart.flush()?;
        Ok(())
    }

    /// Payload then a single end byte (Ctrl-Z / ESC) in one flush.
    pub fn send_terminated(&mut self, data: &[u8], end: u8) -> Result<(), Error<UART::Error>> {
        debug!("at> <{} bytes> 0x{:02X}", data.len(), end);
        self.uart.write_all(data)?;
        self.uart.write_all(&[end])?;
        self.uart.flush()?;
        Ok(())
    }

    fn write_parts(&mut self, parts: &[&str]) -> Result<(), Error<UART::Error>> {
        for part in parts {
            self.uart.write_all(part.as_bytes())?;
        }
        self.uart.write_all(self.config.terminator.as_bytes())?;
        self.uart.flush()?;
        Ok(())
    }

    // ── Receive ─────────────────────────────────────────────────────

    /// Moves every byte the UART has ready into the buffer.
    pub fn process(&mut self) -> Result<usize, Error<UART::Error>> {
        let mut total = 0;
        let mut chunk = [0u8; RX_CHUNK];
        while self.uart.read_ready()? {
            let n = self.uart.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            total += self.buffer.append(&chunk[..n]);
        }
        Ok(total)
    }

    /// Waits for a result code with the configured timeout.
    pub fn read_response(&mut self) -> Result<Outcome, Error<UART::Error>> {
        self.read_response_within(self.config.timeout_ms)
    }

    /// `Ok` or `Prompt` on success; an error result maps to `CommandError`.
    pub fn read_response_within(&mut self, timeout_ms: u32) -> Result<Outcome, Error<UART::Error>> {
        let tokens = self.config.tokens;
        match self.poll(timeout_ms, |data| classify(data, &tokens)) {
            Ok(Outcome::Error) => {
                debug!("at< {}", self.buffer.text().trim());
                Err(Error::CommandError)
            }
            Ok(outcome) => {
                debug!("at< {}", self.buffer.text().trim());
                Ok(outcome)
            }
            Err(Error::Timeout) if !self.buffer.is_empty() => {
                warn!("at: no result code in {:?}", self.buffer.text().trim());
                Err(Error::UnknownResponse)
            }
            Err(e) => {
                if e.is_timeout() {
                    warn!("at: timeout after {}ms", timeout_ms);
                }
                Err(e)
            }
        }
    }

    /// Waits until `token` appears anywhere in the buffer (URCs, banners).
    /// The buffer is not cleared first.
    pub fn wait_for(&mut self, token: &str, timeout_ms: u32) -> Result<(), Error<UART::Error>> {
        let needle = token.as_bytes();
        match self.poll(timeout_ms, |data| super::buffer::contains(data, needle).then_some(())) {
            Ok(()) => {
                debug!("at< {}", token);
                Ok(())
            }
            Err(e) => {
                if e.is_timeout() {
                    warn!("at: {} not seen in {}ms", token, timeout_ms);
                }
                Err(e)
            }
        }
    }

    pub fn wait_prompt(&mut self, timeout_ms: u32) -> Result<(), Error<UART::Error>> {
        match self.read_response_within(timeout_ms)? {
            Outcome::Prompt => Ok(()),
            _ => Err(Error::UnknownResponse),
        }
    }

    fn poll<R, F>(&mut self, timeout_ms: u32, check: F) -> Result<R, Error<UART::Error>>
    where
        F: Fn(&[u8]) -> Option<R>,
    {
        for _ in 0..self.config.budget(timeout_ms) {
            self.process()?;
            if let Some(r) = check(self.buffer.as_bytes()) {
                return Ok(r);
            }
            self.delay.delay_ms(self.config.poll_interval_ms);
        }
        self.process()?;
        check(self.buffer.as_bytes()).ok_or(Error::Timeout)
    }

    // ── Exchanges ───────────────────────────────────────────────────

    /// Clears the buffer, sends `cmd`, waits for the result and returns
    /// the whole response text.
    pub fn command(&mut self, cmd: &str) -> Result<&str, Error<UART::Error>> {
        self.buffer.clear();
        self.send(cmd)?;
        self.read_response()?;
        Ok(self.buffer.text())
    }

    pub fn command_with_parameter(
        &mut self,
        cmd: &str,
        param: &str,
    ) -> Result<&str, Error<UART::Error>> {
        self.buffer.clear();
        self.send_with_parameter(cmd, param)?;
        self.read_response()?;
        Ok(self.buffer.text())
    }

    pub fn command_query(&mut self, cmd: &str) -> Result<&str, Error<UART::Error>> {
        self.buffer.clear();
        self.send_query(cmd)?;
        self.read_response()?;
        Ok(self.buffer.text())
    }

    pub fn command_test(&mut self, cmd: &str) -> Result<&str, Error<UART::Error>> {
        self.buffer.clear();
        self.send_test(cmd)?;
        self.read_response()?;
        Ok(self.buffer.text())
    }

    /// Like `command`, with its own timeout.
    pub fn command_within(&mut self, cmd: &str, timeout_ms: u32) -> Result<&str, Error<UART::Error>> {
        self.buffer.clear();
        self.send(cmd)?;
        self.read_response_within(timeout_ms)?;
        Ok(self.buffer.text())
    }
}
