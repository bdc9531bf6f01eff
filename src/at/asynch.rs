// Async AT command engine
//
// Same exchange rules as the blocking engine; the poll delay is awaited so
// the executor can sleep between UART checks. ReadReady keeps `read` from
// parking forever on a silent line.

use embedded_hal_async::delay::DelayNs;
use embedded_io::ReadReady;
use embedded_io_async::{Read, Write};
use log::{debug, warn};

use super::buffer::{ResponseBuffer, contains};
use super::engine::{Config, DEFAULT_BUFFER_SIZE};
use super::response::{Outcome, classify};
use crate::error::Error;

const RX_CHUNK: usize = 64;

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

    pub async fn send(&mut self, cmd: &str) -> Result<(), Error<UART::Error>> {
        debug!("at> {}", cmd);
        self.write_parts(&[cmd]).await
    }

    pub async fn send_with_parameter(
        &mut self,
        cmd: &str,
        param: &str,
    ) -> Result<(), Error<UART::Error>> {
        debug!("at> {}={}", cmd, param);
        self.write_parts(&[cmd, "=", param]).await
    }

    pub async fn send_test(&mut self, cmd: &str) -> Result<(), Error<UART::Error>> {
        debug!("at> {}=?", cmd);
        self.write_parts(&[cmd, "=?"]).await
    }

    pub async fn send_query(&mut self, cmd: &str) -> Result<(), Error<UART::Error>> {
        debug!("at> {}?", cmd);
        self.write_parts(&[cmd, "?"]).await
    }

    pub async fn send_raw(&mut self, data: &[u8]) -> Result<(), Error<UART::Error>> {
        self.uart.write_all(data).await?;
        self.uart.flush().await?;
        Ok(())
    }

    pub async fn send_terminated(&mut self, data: &[u8], end: u8) -> Result<(), Error<UART::Error>> {
        debug!("at> <{} bytes> 0x{:02X}", data.len(), end);
        self.uart.write_all(data).await?;
        self.uart.write_all(&[end]).await?;
        self.uart.flush().await?;
        Ok(())
    }

    async fn write_parts(&mut self, parts: &[&str]) -> Result<(), Error<UART::Error>> {
        for part in parts {
            self.uart.write_all(part.as_bytes()).await?;
        }
        self.uart.write_all(self.config.terminator.as_bytes()).await?;
        self.uart.flush().await?;
        Ok(())
    }

    // ── Receive ─────────────────────────────────────────────────────

    pub async fn process(&mut self) -> Result<usize, Error<UART::Error>> {
        let mut total = 0;
        let mut chunk = [0u8; RX_CHUNK];
        while self.uart.read_ready()? {
            let n = self.uart.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            total += self.buffer.append(&chunk[..n]);
        }
        Ok(total)
    }

    pub async fn read_response(&mut self) -> Result<Outcome, Error<UART::Error>> {
        self.read_response_within(self.config.timeout_ms).await
    }

    pub async fn read_response_within(
        &mut self,
        timeout_ms: u32,
    ) -> Result<Outcome, Error<UART::Error>> {
        let tokens = self.config.tokens;
        match self.poll(timeout_ms, |data| classify(data, &tokens)).await {
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

    pub async fn wait_for(&mut self, token: &str, timeout_ms: u32) -> Result<(), Error<UART::Error>> {
        let needle = token.as_bytes();
        match self.poll(timeout_ms, |data| contains(data, needle).then_some(())).await {
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

    pub async fn wait_prompt(&mut self, timeout_ms: u32) -> Result<(), Error<UART::Error>> {
        match self.read_response_within(timeout_ms).await? {
            Outcome::Prompt => Ok(()),
            _ => Err(Error::UnknownResponse),
        }
    }

    // bytes landing during the last delay still count
    async fn poll<R, F>(&mut self, timeout_ms: u32, check: F) -> Result<R, Error<UART::Error>>
    where
        F: Fn(&[u8]) -> Option<R>,
    {
        for _ in 0..self.config.budget(timeout_ms) {
            self.process().await?;
            if let Some(r) = check(self.buffer.as_bytes()) {
                return Ok(r);
            }
            self.delay.delay_ms(self.config.poll_interval_ms).await;
        }
        self.process().await?;
        check(self.buffer.as_bytes()).ok_or(Error::Timeout)
    }

    // ── Exchanges ───────────────────────────────────────────────────

    pub async fn command(&mut self, cmd: &str) -> Result<&str, Error<UART::Error>> {
        self.buffer.clear();
        self.send(cmd).await?;
        self.read_response().await?;
        Ok(self.buffer.text())
    }

    pub async fn command_with_parameter(
        &mut self,
        cmd: &str,
        param: &str,
    ) -> Result<&str, Error<UART::Error>> {
        self.buffer.clear();
        self.send_with_parameter(cmd, param).await?;
        self.read_response().await?;
        Ok(self.buffer.text())
    }

    pub async fn command_query(&mut self, cmd: &str) -> Result<&str, Error<UART::Error>> {
        self.buffer.clear();
        self.send_query(cmd).await?;
        self.read_response().await?;
        Ok(self.buffer.text())
    }

    pub async fn command_test(&mut self, cmd: &str) -> Result<&str, Error<UART::Error>> {
        self.buffer.clear();
        self.send_test(cmd).await?;
        self.read_response().await?;
        Ok(self.buffer.text())
    }

    pub async fn command_within(
        &mut self,
        cmd: &str,
        timeout_ms: u32,
    ) -> Result<&str, Error<UART::Error>> {
        self.buffer.clear();
        self.send(cmd).await?;
        self.read_response_within(timeout_ms).await?;
        Ok(self.buffer.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockDelay, MockSerial, block_on};

    #[test]
    fn async_command_round_trip() {
        let mut serial = MockSerial::new();
        serial.reply_after(3, b"\r\nRDY\r\n");
        serial.reply(b"\r\n+CGSN: 490154203237518\r\nOK\r\n");
        let mut at: AtEngine<_, _, 128> =
            AtEngine::new(serial, MockDelay::new(), Config::new().with_timeout_ms(20));

        block_on(async {
            at.send("AT").await.unwrap();
            at.wait_for("RDY", 20).await.unwrap();
            let rsp = at.command("AT+CGSN=1").await.unwrap();
            assert!(rsp.contains("490154203237518"));
            assert!(!rsp.contains("RDY"));
        });
    }

    #[test]
    fn async_timeout_and_error() {
        let mut serial = MockSerial::new();
        serial.reply(b"\r\nERROR\r\n");
        let mut at: AtEngine<_, _, 64> =
            AtEngine::new(serial, MockDelay::new(), Config::new().with_timeout_ms(5));

        block_on(async {
            assert_eq!(at.command("AT+X").await, Err(Error::CommandError));
            assert_eq!(at.command("AT").await, Err(Error::Timeout));
        });
        let (_, delay) = at.release();
        assert_eq!(delay.calls, 5);
    }

    #[test]
    fn async_query_and_test_forms() {
        let mut serial = MockSerial::new();
        serial.reply(b"\r\n+CREG: 0,1\r\nOK\r\n");
        serial.reply(b"\r\n+CMGF: (0,1)\r\nOK\r\n");
        let mut at: AtEngine<_, _, 128> =
            AtEngine::new(serial, MockDelay::new(), Config::new().with_timeout_ms(10));

        block_on(async {
            assert!(at.command_query("AT+CREG").await.unwrap().contains("+CREG: 0,1"));
            assert!(at.command_test("AT+CMGF").await.unwrap().contains("(0,1)"));
        });
        let (serial, _) = at.release();
        assert_eq!(serial.sent_str(), "AT+CREG?\r\nAT+CMGF=?\r\n");
    }

    #[test]
    fn async_prompt_then_body() {
        let mut serial = MockSerial::new();
        serial.reply(b"\r\n> ");
        serial.reply(b"\r\n+CMGS: 7\r\n\r\nOK\r\n");
        let mut at: AtEngine<_, _, 128> =
            AtEngine::new(serial, MockDelay::new(), Config::new().with_timeout_ms(10));

        block_on(async {
            at.clear();
            at.send_with_parameter("AT+CMGS", "\"123\"").await.unwrap();
            at.wait_prompt(10).await.unwrap();
            at.clear();
            at.send_terminated(b"hello", 0x1A).await.unwrap();
            assert_eq!(at.read_response().await, Ok(Outcome::Ok));
            assert!(at.response().contains("+CMGS: 7"));
        });
        let (serial, _) = at.release();
        assert_eq!(serial.sent(), b"AT+CMGS=\"123\"\r\nhello\x1A");
    }

    #[test]
    fn async_wait_prompt_rejects_plain_ok() {
        let mut serial = MockSerial::new();
        serial.reply(b"\r\nOK\r\n");
        let mut at: AtEngine<_, _, 64> =
            AtEngine::new(serial, MockDelay::new(), Config::new().with_timeout_ms(5));

        block_on(async {
            at.send("AT+CMGS=\"1\"").await.unwrap();
            assert_eq!(at.wait_prompt(5).await, Err(Error::UnknownResponse));
        });
    }

    #[test]
    fn async_reply_after_last_delay_still_counts() {
        let mut serial = MockSerial::new();
        // readable only on the check after the fifth delay
        serial.reply_after(5, b"\r\nOK\r\n");
        let mut at: AtEngine<_, _, 64> =
            AtEngine::new(serial, MockDelay::new(), Config::new().with_timeout_ms(5));

        block_on(async {
            assert!(at.command_within("AT", 5).await.is_ok());
        });
        let (_, delay) = at.release();
        assert_eq!(delay.calls, 5);
    }

    #[test]
    fn async_partial_reply_is_unknown_response() {
        let mut serial = MockSerial::new();
        serial.reply(b"\r\n+CSQ: 17,");
        let mut at: AtEngine<_, _, 64> = AtEngine::new(serial, MockDelay::new(), Config::new());
        at.set_timeout_ms(3);
        assert_eq!(at.config().timeout_ms, 3);

        block_on(async {
            assert_eq!(at.command("AT+CSQ").await, Err(Error::UnknownResponse));
        });
        assert_eq!(at.buffer().text(), "\r\n+CSQ: 17,");
    }
}
