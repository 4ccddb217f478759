use crate::cultx::CultxPacket;
use crate::intertechno::IntertechnoPacket;
use core::fmt;
use std::time::SystemTime;

/// Protocol discriminator carried next to every decoded packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Protocol {
    Intertechno,
    Cultx,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Intertechno => f.write_str("intertechno"),
            Self::Cultx => f.write_str("cultx"),
        }
    }
}

/// A decoded datagram of either supported protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "protocol", rename_all = "lowercase"))]
pub enum Packet {
    Intertechno(IntertechnoPacket),
    Cultx(CultxPacket),
}

impl Packet {
    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Intertechno(_) => Protocol::Intertechno,
            Self::Cultx(_) => Protocol::Cultx,
        }
    }

    pub fn sender_address(&self) -> u32 {
        match self {
            Self::Intertechno(p) => p.sender_address(),
            Self::Cultx(p) => p.sender_address(),
        }
    }

    pub fn payload(&self) -> &str {
        match self {
            Self::Intertechno(p) => p.payload(),
            Self::Cultx(p) => p.payload(),
        }
    }

    pub fn rssi(&self) -> u8 {
        match self {
            Self::Intertechno(p) => p.rssi(),
            Self::Cultx(p) => p.rssi(),
        }
    }

    pub fn received_at(&self) -> Option<SystemTime> {
        match self {
            Self::Intertechno(p) => p.received_at(),
            Self::Cultx(p) => p.received_at(),
        }
    }
}

impl From<IntertechnoPacket> for Packet {
    fn from(value: IntertechnoPacket) -> Self {
        Self::Intertechno(value)
    }
}

impl From<CultxPacket> for Packet {
    fn from(value: CultxPacket) -> Self {
        Self::Cultx(value)
    }
}
