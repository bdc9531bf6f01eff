// No-alloc command line builder.
//
// Unlike a display label a truncated AT command is never useful, so
// writes past capacity fail instead of clipping.

use core::fmt;

/// Longest arguments the modem drivers build.
pub const LINE_CAPACITY: usize = 192;

pub struct StackFmt<const N: usize = LINE_CAPACITY> {
    buf: [u8; N],
    len: usize,
}

impl<const N: usize> Default for StackFmt<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> StackFmt<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0u8; N],
            len: 0,
        }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl<const N: usize> fmt::Write for StackFmt<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        if bytes.len() > N - self.len {
            return Err(fmt::Error);
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }
}

/// Formats `args` into a fresh buffer; `None` if they do not fit.
pub fn format<const N: usize>(args: fmt::Arguments<'_>) -> Option<StackFmt<N>> {
    let mut line = StackFmt::new();
    fmt::write(&mut line, args).ok()?;
    Some(line)
}
