//! Intertechno and CULTX 433 MHz packet codecs in pure Rust.
//!
//! `intertechno-core` decodes the text lines emitted by CUL-family radio
//! dongles into typed packets, encodes Intertechno packets into the bit
//! strings those dongles transmit, and classifies received lines for a
//! transport. It performs no I/O.
//!
//! # Feature flags
//!
//! - **`serde`** — derives `Serialize`/`Deserialize` on packet types.

/// Fixed-offset bit reader and hex helpers.
pub mod bits;
/// CULTX sensor beacon decoding.
pub mod cultx;
/// Error types for encoding and decoding operations.
pub mod error;
/// Line classification and daisy-chain stack prefixes.
pub mod framer;
/// Intertechno remote-switch packet codec.
pub mod intertechno;
/// Tagged union over the supported packet types.
pub mod packet;

pub use cultx::CultxPacket;
pub use error::{DecodeError, EncodeError};
pub use framer::{Frame, Framer, StackPrefix};
pub use intertechno::{IntertechnoPacket, LineForm, WireDialect};
pub use packet::{Packet, Protocol};
