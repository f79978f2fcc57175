//! Reply parsing for the submission client.

use super::error::{ClientError, Result};

/// One physical line of a (possibly multi-line) SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    pub code: u16,
    /// `true` for `250 text`, `false` for the `250-text` continuation form.
    pub is_last: bool,
    pub text: String,
}

/// A complete SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// Reply text with the lines joined by a single space.
    #[must_use]
    pub fn text(&self) -> String {
        self.lines.join(" ")
    }

    /// 2xx
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// 3xx, e.g. `354 Start mail input` or `334` during AUTH.
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    /// 4xx
    #[must_use]
    pub const fn is_temporary_error(&self) -> bool {
        self.code >= 400 && self.code < 500
    }

    /// 5xx
    #[must_use]
    pub const fn is_permanent_error(&self) -> bool {
        self.code >= 500 && self.code < 600
    }

    /// Whether an EHLO reply advertises `keyword`, optionally with `param`
    /// among its arguments (`AUTH PLAIN LOGIN` advertises `AUTH` with `LOGIN`).
    #[must_use]
    pub fn advertises(&self, keyword: &str, param: Option<&str>) -> bool {
        self.lines.iter().any(|line| {
            let mut words = line.split_ascii_whitespace();
            words.next().is_some_and(|w| w.eq_ignore_ascii_case(keyword))
                && param.is_none_or(|param| words.any(|w| w.eq_ignore_ascii_case(param)))
        })
    }

    /// Parse one reply line (without its line terminator).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Parse`] if the line is not `NNN`, `NNN text` or
    /// `NNN-text`.
    pub fn parse_line(line: &str) -> Result<ResponseLine> {
        let (code, rest) = line
            .split_at_checked(3)
            .ok_or_else(|| ClientError::Parse(format!("Reply line too short: '{line}'")))?;

        let code = code
            .parse::<u16>()
            .map_err(|_| ClientError::Parse(format!("Invalid reply code: '{code}'")))?;

        let mut chars = rest.chars();
        let is_last = match chars.next() {
            None | Some(' ') => true,
            Some('-') => false,
            Some(other) => {
                return Err(ClientError::Parse(format!(
                    "Invalid separator '{other}' in reply line"
                )));
            }
        };

        Ok(ResponseLine {
            code,
            is_last,
            text: chars.as_str().to_string(),
        })
    }

    /// Try to parse one complete reply from the front of `buffer`.
    ///
    /// Returns the reply and the number of bytes it occupied, or `None` if the
    /// buffer does not yet hold a complete reply.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed lines, mismatched codes inside a
    /// multi-line reply, or invalid UTF-8.
    pub fn parse_response(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let text = std::str::from_utf8(buffer)?;
        let mut consumed = 0;
        let mut code = None;
        let mut lines = Vec::new();

        while let Some(end) = text[consumed..].find('\n') {
            let raw = &text[consumed..consumed + end];
            consumed += end + 1;

            let raw = raw.strip_suffix('\r').unwrap_or(raw);
            if raw.is_empty() {
                continue;
            }

            let line = Self::parse_line(raw)?;
            match code {
                Some(expected) if expected != line.code => {
                    return Err(ClientError::Parse(format!(
                        "Reply code changed mid-reply: expected {expected}, got {}",
                        line.code
                    )));
                }
                Some(_) => {}
                None => code = Some(line.code),
            }

            lines.push(line.text);
            if line.is_last {
                return Ok(code.map(|code| (Self::new(code, lines), consumed)));
            }
        }

        Ok(None)
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code, self.text())
    }
}
