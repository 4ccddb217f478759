//! Register-level driver for a CC1100 transceiver on SPI.
//!
//! The chip is programmed from a [`RegisterConfig`], then a blocking poller
//! waits on the packet interrupt line. Received CRC-valid frames are
//! published as [`InterfaceEvent::RadioFrame`](crate::InterfaceEvent).

use std::io;
use std::time::Duration;

pub mod chip;
pub mod interface;
pub mod registers;

pub use chip::Cc1100Chip;
pub use interface::Cc1100Interface;
pub use registers::{RegisterConfig, Strobe};

/// Full-duplex SPI access to the transceiver.
pub trait SpiBus: Send {
    fn open(&mut self) -> io::Result<()>;
    fn close(&mut self);
    fn is_open(&self) -> bool;
    /// Clocks `data` out and overwrites it with the bytes clocked in.
    fn transfer(&mut self, data: &mut [u8]) -> io::Result<()>;
}

/// The GDO line the chip raises around packet reception and transmission.
pub trait InterruptLine: Send {
    fn open(&mut self) -> io::Result<()>;
    fn close(&mut self);
    fn is_open(&self) -> bool;
    /// Blocks up to `timeout` for an edge and returns the level after it.
    /// A low level means a packet is still arriving. `None` on timeout.
    fn wait_for_edge(&mut self, timeout: Duration) -> io::Result<Option<bool>>;
}
