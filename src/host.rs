//! Host Bridge Protocol
//!
//! Line-oriented ASCII exchanged with the cloud glue process over the USB
//! serial port. Every line ends with `\n` or `\r`.
//!
//! Host to gateway:
//!
//! ```text
//! 05 01 01        command: module, opcode, args (hex, spaces optional)
//! 050101          same command, packed
//! KEY 05 3C       force module 0x05 to token 0x3C
//! ```
//!
//! Gateway to host:
//!
//! ```text
//! TX 05 01 01 55
//! RX 04 01 55
//! KEY 05 3C
//! DESYNC 05
//! REJECT CRC
//! ERR <reason>
//! ERR command queue full
//! ```

use core::fmt::{self, Write as _};

use heapless::{String, Vec};

use crate::config::{HOST_LINE_BUFFER_SIZE, MAX_COMMAND_ARGS};
use crate::error::{LinkError, RejectReason};
use crate::protocol::{Command, InboundFrame, OutboundFrame};
use crate::radio::report::LinkReport;
use crate::types::ModuleId;

/// Longest response line, terminator included
pub const MAX_RESPONSE_LEN: usize = 96;

/// One complete host line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostLine {
    /// Deliver a command to a module
    Command(Command),
    /// Force a module's token
    Resync {
        /// Target module
        module: ModuleId,
        /// Token to install
        key: u8,
    },
    /// Line could not be understood
    Invalid,
}

#[cfg(feature = "embedded")]
impl defmt::Format for HostLine {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::Command(command) => defmt::write!(f, "{}", command),
            Self::Resync { module, key } => defmt::write!(f, "Resync({}, {=u8:#x})", module, key),
            Self::Invalid => defmt::write!(f, "Invalid"),
        }
    }
}

/// Byte-at-a-time host line parser
pub struct HostParser {
    buffer: Vec<u8, HOST_LINE_BUFFER_SIZE>,
    overflowed: bool,
}

impl HostParser {
    /// Create an empty parser
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            overflowed: false,
        }
    }

    /// Feed one byte, returns a line once its terminator arrives
    ///
    /// Blank lines are ignored. A line that does not fit the buffer is
    /// dropped in full.
    pub fn feed(&mut self, byte: u8) -> Option<HostLine> {
        if byte == b'\n' || byte == b'\r' {
            let line = if self.overflowed || self.buffer.is_empty() {
                None
            } else {
                Some(parse_line(&self.buffer))
            };
            self.clear();
            return line;
        }

        if !self.overflowed && self.buffer.push(byte).is_err() {
            warn!("Host line too long, discarded");
            self.overflowed = true;
            self.buffer.clear();
        }
        None
    }

    /// Drop any partial line
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.overflowed = false;
    }
}

impl Default for HostParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse one line without its terminator
#[must_use]
pub fn parse_line(line: &[u8]) -> HostLine {
    let Ok(text) = core::str::from_utf8(line) else {
        return HostLine::Invalid;
    };
    let text = text.trim();

    let parsed = match text.get(..3) {
        Some(word) if word.eq_ignore_ascii_case("KEY") => parse_resync(&text[3..]),
        _ => parse_command(text),
    };
    parsed.unwrap_or(HostLine::Invalid)
}

fn parse_resync(text: &str) -> Option<HostLine> {
    let bytes = parse_hex::<2>(text)?;
    match bytes.as_slice() {
        &[module, key] => Some(HostLine::Resync {
            module: ModuleId::from_byte(module)?,
            key,
        }),
        _ => None,
    }
}

fn parse_command(text: &str) -> Option<HostLine> {
    let bytes = parse_hex::<{ MAX_COMMAND_ARGS + 2 }>(text)?;
    let (&module, rest) = bytes.split_first()?;
    let (&opcode, args) = rest.split_first()?;
    let command = Command::new(ModuleId::from_byte(module)?, opcode, args)?;
    Some(HostLine::Command(command))
}

/// Hex pairs with optional whitespace between them
fn parse_hex<const N: usize>(text: &str) -> Option<Vec<u8, N>> {
    let mut bytes = Vec::new();
    let mut high: Option<u8> = None;
    for c in text.chars() {
        if c.is_ascii_whitespace() {
            if high.is_some() {
                return None;
            }
            continue;
        }
        // to_digit(16) is below 16, so the cast is lossless
        #[allow(clippy::cast_possible_truncation)]
        let nibble = c.to_digit(16)? as u8;
        match high.take() {
            Some(h) => bytes.push((h << 4) | nibble).ok()?,
            None => high = Some(nibble),
        }
    }
    if high.is_some() {
        return None;
    }
    Some(bytes)
}

/// Host line formatter
pub struct HostResponse {
    buffer: String<MAX_RESPONSE_LEN>,
}

impl HostResponse {
    /// Create an empty formatter
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    /// `TX <frame>`
    pub fn sent(&mut self, frame: &OutboundFrame) {
        self.line(format_args!("TX {frame}"));
    }

    /// `RX <frame>`
    pub fn received(&mut self, frame: &InboundFrame) {
        self.line(format_args!("RX {frame}"));
    }

    /// `KEY <module> <key>`
    pub fn key(&mut self, module: ModuleId, key: u8) {
        self.line(format_args!("KEY {:02X} {key:02X}", module.as_byte()));
    }

    /// `DESYNC <module>`
    pub fn desync(&mut self, module: ModuleId) {
        self.line(format_args!("DESYNC {:02X}", module.as_byte()));
    }

    /// `REJECT <reason>`
    pub fn rejected(&mut self, reason: RejectReason) {
        let word = match reason {
            RejectReason::Oversized(_) => "OVERSIZED",
            RejectReason::Timeout => "TIMEOUT",
            RejectReason::CrcError => "CRC",
        };
        self.line(format_args!("REJECT {word}"));
    }

    /// `ERR <error>`
    pub fn error(&mut self, err: &LinkError) {
        self.line(format_args!("ERR {err}"));
    }

    /// `ERR invalid line`
    pub fn invalid(&mut self) {
        self.line(format_args!("ERR invalid line"));
    }

    /// `ERR command queue full`
    pub fn queue_full(&mut self) {
        self.line(format_args!("ERR command queue full"));
    }

    /// Format a link report
    pub fn report(&mut self, report: &LinkReport) {
        match report {
            LinkReport::FrameSent(frame) => self.sent(frame),
            LinkReport::FrameReceived(frame) => self.received(frame),
            LinkReport::FrameRejected(reason) => self.rejected(*reason),
            LinkReport::KeyRotated { module, key } => self.key(*module, *key),
            LinkReport::KeyDesync { module } => self.desync(*module),
            LinkReport::CommandFailed(err) => self.error(err),
        }
    }

    /// Get the response string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    /// Get the response bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.as_bytes()
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn line(&mut self, args: fmt::Arguments<'_>) {
        // Overlong text is cut short, the terminator always fits
        let mut text: String<{ MAX_RESPONSE_LEN - 2 }> = String::new();
        let _ = text.write_fmt(args);
        self.buffer.clear();
        let _ = self.buffer.push_str(&text);
        let _ = self.buffer.push_str("\r\n");
    }
}

impl Default for HostResponse {
    fn default() -> Self {
        Self::new()
    }
}
