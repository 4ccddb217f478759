//! CC1100 register map, command strobes and the configuration tables.

use crate::settings::InterruptPin;
use crate::LinkError;

/// Header bit selecting a single-register read.
pub const READ_SINGLE: u8 = 0x80;
/// Header bits selecting a burst read (also used for status registers).
pub const READ_BURST: u8 = 0xC0;
pub const WRITE_BURST: u8 = 0x40;

/// Status byte bit that stays set while the crystal is not yet stable.
pub const CHIP_RDYN: u8 = 0x80;

/// Status register bit 7 of LQI: the last frame passed its CRC.
pub const CRC_OK: u8 = 0x80;

pub const IOCFG2: u8 = 0x00;
pub const IOCFG0: u8 = 0x02;
pub const FSTEST: u8 = 0x29;
pub const TEST2: u8 = 0x2C;
pub const TEST1: u8 = 0x2D;
pub const PATABLE: u8 = 0x3E;
pub const FIFO: u8 = 0x3F;
/// Link quality status register (read with [`READ_BURST`]).
pub const LQI: u8 = 0x33;

/// Single-byte commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Strobe {
    Sres = 0x30,
    Srx = 0x34,
    Stx = 0x35,
    Sidle = 0x36,
    Sfrx = 0x3A,
    Sftx = 0x3B,
}

impl Strobe {
    pub const fn opcode(self) -> u8 {
        self as u8
    }
}

/// GDOx_CFG value asserting on sync word and deasserting at packet end.
const GDO_PACKET: u8 = 0x46;
/// GDOx_CFG value for the unused GDO pin.
const GDO_UNUSED: u8 = 0x5B;

/// Values written after the main table, each verified on read-back.
pub const FSTEST_VALUE: u8 = 0x59;
pub const TEST2_VALUE: u8 = 0x81;
pub const TEST1_VALUE: u8 = 0x35;

/// 0x00..=0x28 for a 26 MHz crystal, 433.92 MHz OOK.
const TABLE_26MHZ: [u8; 0x29] = [
    GDO_PACKET, // IOCFG2, patched per interrupt pin
    0x2E,       // IOCFG1
    GDO_UNUSED, // IOCFG0, patched per interrupt pin
    0x07,       // FIFOTHR
    0xD3,       // SYNC1
    0x91,       // SYNC0
    0x3D,       // PKTLEN
    0x04,       // PKTCTRL1
    0x32,       // PKTCTRL0
    0x00,       // ADDR
    0x00,       // CHANNR
    0x06,       // FSCTRL1
    0x00,       // FSCTRL0
    0x10,       // FREQ2
    0xB0,       // FREQ1
    0x71,       // FREQ0
    0x55,       // MDMCFG4
    0xE4,       // MDMCFG3
    0x30,       // MDMCFG2
    0x23,       // MDMCFG1
    0xB9,       // MDMCFG0
    0x00,       // DEVIATN
    0x07,       // MCSM2
    0x30,       // MCSM1: idle after RX, RX after TX
    0x18,       // MCSM0
    0x14,       // FOCCFG
    0x6C,       // BSCFG
    0x07,       // AGCCTRL2
    0x00,       // AGCCTRL1
    0x90,       // AGCCTRL0
    0x87,       // WOREVT1
    0x6B,       // WOREVT0
    0xF8,       // WORCTRL
    0x56,       // FREND1
    0x11,       // FREND0
    0xE9,       // FSCAL3
    0x2A,       // FSCAL2
    0x00,       // FSCAL1
    0x1F,       // FSCAL0
    0x41,       // RCCTRL1
    0x00,       // RCCTRL0
];

/// Ordered `(register, value)` pairs making up one chip configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterConfig {
    entries: Vec<(u8, u8)>,
}

impl RegisterConfig {
    /// Selects the table for `oscillator_hz`.
    pub fn for_oscillator(oscillator_hz: u32, pin: InterruptPin) -> Result<Self, LinkError> {
        match oscillator_hz {
            26_000_000 => {
                let mut table = TABLE_26MHZ;
                let (gdo2, gdo0) = match pin {
                    InterruptPin::Gdo2 => (GDO_PACKET, GDO_UNUSED),
                    InterruptPin::Gdo0 => (GDO_UNUSED, GDO_PACKET),
                };
                table[usize::from(IOCFG2)] = gdo2;
                table[usize::from(IOCFG0)] = gdo0;
                Ok(Self {
                    entries: (0u8..).zip(table).collect(),
                })
            }
            27_000_000 => {
                log::error!("oscillator frequency 27000000 is not supported yet, use 26000000");
                Err(LinkError::UnsupportedOscillator(oscillator_hz))
            }
            other => {
                log::error!("unknown oscillator frequency {other}, the only valid value is 26000000");
                Err(LinkError::UnsupportedOscillator(other))
            }
        }
    }

    pub fn entries(&self) -> &[(u8, u8)] {
        &self.entries
    }

    pub fn value(&self, register: u8) -> Option<u8> {
        self.entries
            .iter()
            .find(|(r, _)| *r == register)
            .map(|(_, v)| *v)
    }
}
