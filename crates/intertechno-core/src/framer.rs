use crate::cultx::{self, CultxPacket};
use crate::intertechno::{self, IntertechnoPacket};
use crate::packet::{Packet, Protocol};
use crate::DecodeError;
use core::fmt;

/// Line sent by a dongle that refuses to transmit because the 1% duty-cycle
/// budget is spent.
pub const DUTY_CYCLE_MARKER: &str = "LOVF";

/// Marker repeated in front of lines addressed to daisy-chained dongles.
pub const STACK_MARKER: char = '*';

const CULTX_MIN_LEN: usize = 10;
const INTERTECHNO_MIN_LEN: usize = 7;

/// The `'*'` run identifying one dongle in a daisy chain on a shared line.
///
/// Position 1 (the first dongle) has an empty prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct StackPrefix(String);

impl StackPrefix {
    pub fn for_position(position: u8) -> Self {
        let depth = usize::from(position.saturating_sub(1));
        Self(STACK_MARKER.to_string().repeat(depth))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for StackPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of classifying one received line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Packet(Packet),
    /// The dongle reported `LOVF`.
    DutyCycleLimit,
    /// Not a known protocol line. Carries the line without prefix.
    Unrecognized(String),
    /// Belongs to another stack position, or is empty.
    Ignored,
    /// Looked like a protocol line but failed to decode.
    Malformed {
        protocol: Protocol,
        error: DecodeError,
    },
}

/// Classifies received lines for one interface.
#[derive(Debug, Clone, Default)]
pub struct Framer {
    prefix: StackPrefix,
}

impl Framer {
    pub fn new(prefix: StackPrefix) -> Self {
        Self { prefix }
    }

    pub fn prefix(&self) -> &StackPrefix {
        &self.prefix
    }

    pub fn classify(&self, line: &str) -> Frame {
        let line = line.trim_end_matches(['\r', '\n']);
        let Some(line) = self.strip_prefix(line) else {
            return Frame::Ignored;
        };
        if line.is_empty() {
            return Frame::Ignored;
        }

        if is_cultx(line) {
            return match CultxPacket::decode_line(line) {
                Ok(p) => Frame::Packet(Packet::Cultx(p)),
                Err(error) => Frame::Malformed {
                    protocol: Protocol::Cultx,
                    error,
                },
            };
        }
        if line.len() >= INTERTECHNO_MIN_LEN && line.starts_with(intertechno::LINE_MARKER) {
            return match IntertechnoPacket::decode_line(line) {
                Ok(p) => Frame::Packet(Packet::Intertechno(p)),
                Err(error) => Frame::Malformed {
                    protocol: Protocol::Intertechno,
                    error,
                },
            };
        }
        if line == DUTY_CYCLE_MARKER {
            return Frame::DutyCycleLimit;
        }
        Frame::Unrecognized(line.to_string())
    }

    fn strip_prefix<'a>(&self, line: &'a str) -> Option<&'a str> {
        if self.prefix.is_empty() {
            return (!line.starts_with(STACK_MARKER)).then_some(line);
        }
        let rest = line.strip_prefix(self.prefix.as_str())?;
        (!rest.starts_with(STACK_MARKER)).then_some(rest)
    }
}

/// CULTX lines repeat a nibble: either characters 5 and 8 or 6 and 9 agree.
fn is_cultx(line: &str) -> bool {
    let b = line.as_bytes();
    b.len() >= CULTX_MIN_LEN
        && line.starts_with(cultx::LINE_MARKER)
        && (b[5] == b[8] || b[6] == b[9])
}
