//! Line-oriented dongles: CUL and COC on a serial port, CUNX over TCP.

pub mod assembler;
pub mod interface;

pub use assembler::{LineAssembler, MAX_PENDING_BYTES};
pub use interface::{CocLines, LineDevice, LineInterface, INIT_COMMAND};
