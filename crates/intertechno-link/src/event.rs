//! Events handed from interfaces to the host's dispatcher.

use intertechno_core::Packet;
use tokio::sync::mpsc;

/// Something an interface observed that the dispatcher should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InterfaceEvent {
    /// A decoded packet.
    Packet { interface_id: String, packet: Packet },
    /// The dongle refuses to transmit until its 1% duty-cycle budget recovers.
    DutyCycleLimit { interface_id: String },
    /// A CRC-valid frame read from a CC1100 FIFO: length byte, payload and
    /// the trailing status bytes.
    RadioFrame { interface_id: String, frame: Vec<u8> },
}

impl InterfaceEvent {
    pub fn interface_id(&self) -> &str {
        match self {
            Self::Packet { interface_id, .. }
            | Self::DutyCycleLimit { interface_id }
            | Self::RadioFrame { interface_id, .. } => interface_id,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<InterfaceEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<InterfaceEvent>;

/// Creates the channel interfaces publish into.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
