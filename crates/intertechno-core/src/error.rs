use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    PayloadTooLong { len: usize, max: usize },
    InvalidBit(char),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PayloadTooLong { len, max } => {
                write!(f, "wire form of {len} characters exceeds {max}")
            }
            Self::InvalidBit(c) => write!(f, "invalid bit character '{c}'"),
        }
    }
}

impl std::error::Error for EncodeError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    UnexpectedEof,
    InvalidMarker,
    InvalidLength,
    UnsupportedLength(usize),
    InvalidSymbol(u8),
    InvalidHex(u8),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => f.write_str("unexpected end of input"),
            Self::InvalidMarker => f.write_str("invalid protocol marker"),
            Self::InvalidLength => f.write_str("invalid length"),
            Self::UnsupportedLength(len) => write!(f, "unsupported line length {len}"),
            Self::InvalidSymbol(b) => write!(f, "invalid symbol 0x{b:02x}"),
            Self::InvalidHex(b) => write!(f, "invalid hex digit 0x{b:02x}"),
        }
    }
}

impl std::error::Error for DecodeError {}
