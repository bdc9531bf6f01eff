// Linear receive buffer for AT responses.
// NUL bytes are dropped on the way in. When full, the oldest bytes go
// first: result codes arrive last, so the tail is what matters.

pub struct ResponseBuffer<const N: usize> {
    buf: [u8; N],
    len: usize,
    dropped: usize,
}

impl<const N: usize> Default for ResponseBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ResponseBuffer<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0u8; N],
            len: 0,
            dropped: 0,
        }
    }

    /// Appends `data` minus NUL bytes; returns how many bytes were kept.
    pub fn append(&mut self, data: &[u8]) -> usize {
        let incoming = data.iter().filter(|&&b| b != 0).count();
        let overflow = (self.len + incoming).saturating_sub(N);
        let from_old = overflow.min(self.len);

        if overflow > 0 {
            self.buf.copy_within(from_old..self.len, 0);
            self.len -= from_old;
            self.dropped += overflow;
            log::warn!("at: rx buffer full, dropped {} bytes", overflow);
        }

        // new bytes that cannot fit even with the buffer emptied
        let mut skip = overflow - from_old;
        let mut kept = 0;
        for &b in data.iter().filter(|&&b| b != 0) {
            if skip > 0 {
                skip -= 1;
                continue;
            }
            self.buf[self.len] = b;
            self.len += 1;
            kept += 1;
        }
        kept
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.dropped = 0;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Contents up to the first invalid UTF-8 sequence.
    pub fn text(&self) -> &str {
        let bytes = self.as_bytes();
        match core::str::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or(""),
        }
    }

    pub fn contains(&self, needle: &[u8]) -> bool {
        contains(self.as_bytes(), needle)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Bytes discarded by overflow since the last clear.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

pub(crate) fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_nul_bytes() {
        let mut b = ResponseBuffer::<16>::new();
        assert_eq!(b.append(b"O\0K\0\r\n"), 4);
        assert_eq!(b.as_bytes(), b"OK\r\n");
    }

    #[test]
    fn overflow_keeps_the_tail() {
        let mut b = ResponseBuffer::<8>::new();
        b.append(b"abcdef");
        b.append(b"\r\nOK");
        assert_eq!(b.as_bytes(), b"cdef\r\nOK");
        assert_eq!(b.dropped(), 2);
    }

    #[test]
    fn oversized_chunk_keeps_its_last_bytes() {
        let mut b = ResponseBuffer::<4>::new();
        b.append(b"xy");
        assert_eq!(b.append(b"123456"), 4);
        assert_eq!(b.as_bytes(), b"3456");
        assert_eq!(b.dropped(), 4);
    }

    #[test]
    fn clear_resets_length_and_overflow_count() {
        let mut b = ResponseBuffer::<4>::new();
        b.append(b"123456");
        b.clear();
        assert!(b.is_empty());
        assert_eq!(b.dropped(), 0);
    }

    #[test]
    fn text_stops_at_invalid_utf8() {
        let mut b = ResponseBuffer::<16>::new();
        b.append(b"RDY\xFF\xFE");
        assert_eq!(b.text(), "RDY");
    }

    #[test]
    fn contains_finds_substrings() {
        let mut b = ResponseBuffer::<32>::new();
        b.append(b"\r\n+CME ERROR: 10\r\n");
        assert!(b.contains(b"ERROR"));
        assert!(!b.contains(b"OK"));
    }
}
