use std::io::BufRead;

use crate::error::SimError;
use crate::hex::{HEX_NIBBLE, INVALID_NIBBLE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
}

impl Operation {
    /// The single-character form used by the trace format
    pub fn symbol(self) -> char {
        match self {
            Self::Read => 'r',
            Self::Write => 'w',
        }
    }
}

/// Third token of the single-level trace format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Instruction,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEvent {
    pub op: Operation,
    pub addr: u32,
    pub kind: Option<AccessKind>,
}

/// Line-oriented trace parser: `<op> <hex_addr>` or `<op> <hex_addr> <I|D>`,
/// addresses in hex without a 0x prefix. Blank lines are skipped; anything
/// else malformed is an error
pub struct TraceReader<R> {
    reader: R,
    line: u64,
    buf: String,
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            buf: String::new(),
        }
    }

    fn error(&self, message: impl Into<String>) -> SimError {
        SimError::Trace {
            line: self.line,
            message: message.into(),
        }
    }

    fn parse_line(&self) -> Result<Option<TraceEvent>, SimError> {
        let mut tokens = self.buf.split_whitespace();
        let Some(op) = tokens.next() else {
            return Ok(None);
        };
        let op = match op {
            "r" => Operation::Read,
            "w" => Operation::Write,
            other => return Err(self.error(format!("unrecognised operation '{other}'"))),
        };
        let addr = tokens
            .next()
            .ok_or_else(|| self.error("missing address"))?;
        let addr =
            parse_addr(addr).ok_or_else(|| self.error(format!("invalid hex address '{addr}'")))?;
        let kind = match tokens.next() {
            None => None,
            Some("I") => Some(AccessKind::Instruction),
            Some("D") => Some(AccessKind::Data),
            Some(other) => return Err(self.error(format!("unrecognised access type '{other}'"))),
        };
        if tokens.next().is_some() {
            return Err(self.error("trailing tokens"));
        }
        Ok(Some(TraceEvent { op, addr, kind }))
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<TraceEvent, SimError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            self.line += 1;
            match self.parse_line() {
                Ok(None) => continue,
                Ok(Some(event)) => return Some(Ok(event)),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Parses a 32-bit value from variable-width hexadecimal
///
/// The per-byte nibble table is generated by the build script; the sentinel
/// rejects non-hex bytes, so this both validates and converts in one pass
fn parse_addr(token: &str) -> Option<u32> {
    let bytes = token.as_bytes();
    if bytes.is_empty() || bytes.len() > 8 {
        return None;
    }
    let mut value: u32 = 0;
    for &b in bytes {
        let nibble = HEX_NIBBLE[b as usize];
        if nibble == INVALID_NIBBLE {
            return None;
        }
        value = (value << 4) | u32::from(nibble);
    }
    debug_assert_eq!(u32::from_str_radix(token, 16).ok(), Some(value));
    Some(value)
}
