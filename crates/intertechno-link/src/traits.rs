use crate::ConnectionState;
use intertechno_core::IntertechnoPacket;
use std::time::SystemTime;

/// A physical radio interface the dispatcher can listen on and send through.
///
/// Implementors are [`LineInterface`](crate::LineInterface) for CUL, COC and
/// CUNX dongles and [`Cc1100Interface`](crate::Cc1100Interface) for an SPI
/// attached transceiver. Lifecycle calls never fail: problems are logged and
/// handled by the interface's own reconnect logic.
pub trait RadioInterface: Send + Sync {
    fn id(&self) -> &str;

    /// Starts the background listener. Restarts it if already running.
    async fn start_listening(&self);

    /// Stops the listener and closes the device. Safe to call repeatedly.
    async fn stop_listening(&self);

    /// Transmits `packet`, or drops it with a warning when not connected.
    async fn send_packet(&self, packet: &IntertechnoPacket);

    fn is_open(&self) -> bool;

    fn state(&self) -> ConnectionState;

    fn last_packet_received(&self) -> Option<SystemTime>;

    fn last_packet_sent(&self) -> Option<SystemTime>;
}
