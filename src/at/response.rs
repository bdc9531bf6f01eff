// Response classification and field parsing.
//
// A response is complete once a terminated line matches a result token
// or the data prompt shows up at the end. Echoed commands, information
// lines and URCs in between are left for the caller to parse.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Error,
    /// `>` data prompt (SMS body, raw data mode).
    Prompt,
}

/// Result tokens a module answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tokens {
    pub ok: &'static str,
    pub error: &'static str,
    pub prompt: &'static str,
}

impl Tokens {
    pub const V25: Self = Self {
        ok: "OK",
        error: "ERROR",
        prompt: ">",
    };
}

impl Default for Tokens {
    fn default() -> Self {
        Self::V25
    }
}

/// Iterates terminated lines; an unterminated tail is not yielded.
pub fn complete_lines(data: &[u8]) -> impl Iterator<Item = &[u8]> {
    let end = data
        .iter()
        .rposition(|&b| b == b'\r' || b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    data[..end]
        .split(|&b| b == b'\r' || b == b'\n')
        .filter(|l| !l.is_empty())
}

pub fn classify(data: &[u8], tokens: &Tokens) -> Option<Outcome> {
    for line in complete_lines(data) {
        let line = trim(line);
        if line == tokens.ok.as_bytes() {
            return Some(Outcome::Ok);
        }
        if is_error(line, tokens.error.as_bytes()) {
            return Some(Outcome::Error);
        }
    }

    if is_prompt(data, tokens.prompt.as_bytes()) {
        return Some(Outcome::Prompt);
    }
    None
}

// The token opens the line, optionally behind `+CME `/`+CMS `. A token
// that does not end in a separator must be the whole line or be followed
// by `:` or a tab, so text that merely mentions it (SMS echo, operator names)
// does not count.
fn is_error(line: &[u8], error: &[u8]) -> bool {
    if error.is_empty() {
        return false;
    }
    let rest = line
        .strip_prefix(b"+CME ")
        .or_else(|| line.strip_prefix(b"+CMS "))
        .unwrap_or(line);
    let Some(tail) = rest.strip_prefix(error) else {
        return false;
    };
    let open = matches!(error.last(), Some(b'\t' | b' ' | b':'));
    open || matches!(tail.first(), None | Some(b':' | b'\t'))
}

// prompt sits alone at the start of the last line, maybe followed by a space
fn is_prompt(data: &[u8], prompt: &[u8]) -> bool {
    if prompt.is_empty() {
        return false;
    }
    let mut end = data.len();
    while end > 0 && data[end - 1] == b' ' {
        end -= 1;
    }
    let data = &data[..end];
    if !data.ends_with(prompt) {
        return false;
    }
    let start = data.len() - prompt.len();
    start == 0 || matches!(data[start - 1], b'\r' | b'\n')
}

fn trim(line: &[u8]) -> &[u8] {
    let start = line.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map(|i| i + 1)
        .unwrap_or(start);
    &line[start..end]
}

/// Text following `prefix` on the first line that starts with it.
///
/// `field_after("\r\n+CSQ: 20,99\r\nOK\r\n", "+CSQ:")` is `Some("20,99")`.
pub fn field_after<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    text.split(['\r', '\n'])
        .map(str::trim)
        .find_map(|line| line.strip_prefix(prefix))
        .map(str::trim)
}

/// Comma separated values with surrounding quotes stripped.
pub fn fields(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(|f| f.trim().trim_matches('"'))
}

pub fn parse_field<T: core::str::FromStr>(list: &str, index: usize) -> Option<T> {
    fields(list).nth(index)?.parse().ok()
}

/// Numeric code of a `+CME ERROR: n` / `+CMS ERROR: n` line.
pub fn error_code(text: &str) -> Option<u16> {
    field_after(text, "+CME ERROR:")
        .or_else(|| field_after(text, "+CMS ERROR:"))
        .and_then(|code| code.parse().ok())
}
