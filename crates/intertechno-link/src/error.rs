use intertechno_core::EncodeError;
use thiserror::Error;

/// Errors raised while opening or driving a radio interface.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serial error: {0}")]
    Serial(#[from] tokio_serial::Error),
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("device is not open")]
    NotOpen,
    #[error("no device configured")]
    MissingDevice,
    #[error("chip not ready after command 0x{opcode:02x}")]
    ChipNotReady { opcode: u8 },
    #[error("register 0x{register:02x} reads back 0x{actual:02x}, expected 0x{expected:02x}")]
    RegisterVerify {
        register: u8,
        expected: u8,
        actual: u8,
    },
    #[error("unsupported oscillator frequency {0} Hz")]
    UnsupportedOscillator(u32),
    #[error("packet of {len} bytes exceeds {max}")]
    PacketTooLarge { len: usize, max: usize },
}
