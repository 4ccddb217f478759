use super::chip::Cc1100Chip;
use super::registers::RegisterConfig;
use super::{InterruptLine, SpiBus};
use crate::event::{EventSender, InterfaceEvent};
use crate::gpio::{self, OutputLine};
use crate::lifecycle::ConnectionState;
use crate::settings::{Cc1100Settings, InterfaceSettings, Verbosity};
use crate::{lock, LinkError, RadioInterface};
use intertechno_core::{EncodeError, IntertechnoPacket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;

const POLL_TIMEOUT: Duration = Duration::from_millis(100);
/// Longest frame the FIFO can legitimately hold. Anything bigger means the
/// length byte was read out of sync.
pub const MAX_FRAME_LEN: usize = 100;
const SLOW_LOCK_WARNING: Duration = Duration::from_millis(100);
const ABORTED_SEND_DELAY: Duration = Duration::from_secs(2);
const REINIT_DELAY: Duration = Duration::from_secs(1);

const GATE_RETRY: Duration = Duration::from_millis(5);

/// Who currently parks the transmit gate. Dropping the hold reopens the gate.
enum TxHold {
    /// The poller saw a packet arriving and keeps senders off the air.
    Receiving { _guard: OwnedMutexGuard<()> },
    /// A send is on air until the poller observes its completion.
    Sending { _guard: OwnedMutexGuard<()> },
}

struct Shared<S, I> {
    settings: InterfaceSettings,
    config: RegisterConfig,
    tx_power: u8,
    chip: StdMutex<Cc1100Chip<S>>,
    interrupt: StdMutex<I>,
    high_gain: StdMutex<Option<Box<dyn OutputLine>>>,
    /// Serializes the air. Acquired by senders, parked in `tx_hold` and
    /// released by the poller thread.
    tx_gate: Arc<Mutex<()>>,
    tx_hold: StdMutex<Option<TxHold>>,
    sending: AtomicBool,
    send_pending: AtomicBool,
    /// The device was lost and is not usable until reinitialized.
    stopped: AtomicBool,
    shutdown: AtomicBool,
    first_packet: AtomicBool,
    state: StdMutex<ConnectionState>,
    last_received: StdMutex<Option<SystemTime>>,
    last_sent: StdMutex<Option<SystemTime>>,
    events: EventSender,
}

/// A CC1100 transceiver on SPI with its packet interrupt on a GPIO.
///
/// Reception runs on a blocking poller thread. Received frames are published
/// raw as [`InterfaceEvent::RadioFrame`].
pub struct Cc1100Interface<S, I> {
    shared: Arc<Shared<S, I>>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl<S, I> Cc1100Interface<S, I>
where
    S: SpiBus + 'static,
    I: InterruptLine + 'static,
{
    /// Builds the interface. Fails without touching hardware when the
    /// oscillator frequency has no register table.
    pub fn new(
        settings: InterfaceSettings,
        radio: &Cc1100Settings,
        spi: S,
        interrupt: I,
        high_gain: Option<Box<dyn OutputLine>>,
        events: EventSender,
    ) -> Result<Self, LinkError> {
        let config = RegisterConfig::for_oscillator(radio.oscillator_hz, radio.interrupt_pin)?;
        let tx_power = radio.effective_tx_power(high_gain.is_some());
        Ok(Self {
            shared: Arc::new(Shared {
                settings,
                config,
                tx_power,
                chip: StdMutex::new(Cc1100Chip::new(spi)),
                interrupt: StdMutex::new(interrupt),
                high_gain: StdMutex::new(high_gain),
                tx_gate: Arc::new(Mutex::new(())),
                tx_hold: StdMutex::new(None),
                sending: AtomicBool::new(false),
                send_pending: AtomicBool::new(false),
                stopped: AtomicBool::new(true),
                shutdown: AtomicBool::new(false),
                first_packet: AtomicBool::new(true),
                state: StdMutex::new(ConnectionState::Disconnected),
                last_received: StdMutex::new(None),
                last_sent: StdMutex::new(None),
                events,
            }),
            poller: Mutex::new(None),
        })
    }

    pub fn tx_power(&self) -> u8 {
        self.shared.tx_power
    }

    /// Runs `f` against the chip, e.g. to inspect a test bus.
    pub fn with_chip<R>(&self, f: impl FnOnce(&mut Cc1100Chip<S>) -> R) -> R {
        f(&mut lock(&self.shared.chip))
    }
}

impl<S, I> RadioInterface for Cc1100Interface<S, I>
where
    S: SpiBus + 'static,
    I: InterruptLine + 'static,
{
    fn id(&self) -> &str {
        &self.shared.settings.id
    }

    async fn start_listening(&self) {
        self.stop_listening().await;
        let shared = &self.shared;
        let mut slot = self.poller.lock().await;
        shared.set_state(ConnectionState::Connecting);

        let init = {
            let shared = shared.clone();
            tokio::task::spawn_blocking(move || shared.init_device()).await
        };
        match init {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                log::error!("{}: could not initialize CC1100: {e}", shared.settings.id);
                shared.close_device();
                shared.set_state(ConnectionState::Disconnected);
                return;
            }
            Err(e) => {
                log::error!("{}: initialization task failed: {e}", shared.settings.id);
                shared.close_device();
                shared.set_state(ConnectionState::Disconnected);
                return;
            }
        }
        {
            let _gate = shared.tx_gate.lock().await;
            let enabled = lock(&shared.chip).enable_rx(true);
            if let Err(e) = enabled {
                log::error!("{}: could not enable receive: {e}", shared.settings.id);
                shared.close_device();
                shared.set_state(ConnectionState::Disconnected);
                return;
            }
        }

        shared.shutdown.store(false, Ordering::Release);
        shared.stopped.store(false, Ordering::Release);
        shared.set_state(ConnectionState::Listening);
        log::info!("{}: CC1100 initialized", shared.settings.id);
        let poller = shared.clone();
        *slot = Some(tokio::task::spawn_blocking(move || poll_loop(&poller)));
    }

    async fn stop_listening(&self) {
        let shared = &self.shared;
        let poller = self.poller.lock().await.take();
        shared.shutdown.store(true, Ordering::Release);
        if let Some(handle) = poller {
            if let Err(e) = handle.await {
                log::warn!("{}: poller ended abnormally: {e}", shared.settings.id);
            }
        }
        shared.release_tx();
        shared.sending.store(false, Ordering::Release);
        shared.close_device();
        shared.set_state(ConnectionState::Disconnected);
    }

    async fn send_packet(&self, packet: &IntertechnoPacket) {
        let shared = &self.shared;
        let id = &shared.settings.id;
        let wire = packet.wire_form();
        if !self.is_open() {
            log::warn!("{id}: not sending {wire}, device is not open");
            return;
        }
        let bytes = match radio_frame(packet) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("{id}: not sending {wire}: {e}");
                return;
            }
        };

        let waited = Instant::now();
        shared.send_pending.store(true, Ordering::Release);
        let gate = shared.tx_gate.clone().lock_owned().await;
        shared.send_pending.store(false, Ordering::Release);
        if waited.elapsed() > SLOW_LOCK_WARNING {
            log::warn!(
                "{id}: waited {:?} to send, Intertechno transmissions take long so avoid sending many packets at once",
                waited.elapsed()
            );
        }
        if shared.shutdown.load(Ordering::Acquire) || !self.is_open() {
            log::warn!("{id}: not sending {wire}, device closed while waiting");
            return;
        }

        log::info!("{id}: sending {wire}");
        shared.sending.store(true, Ordering::Release);
        *lock(&shared.tx_hold) = Some(TxHold::Sending { _guard: gate });
        // Recovery may have drained the holds before ours was parked.
        if shared.stopped.load(Ordering::Acquire)
            || shared.shutdown.load(Ordering::Acquire)
            || !lock(&shared.chip).is_open()
        {
            log::warn!("{id}: not sending {wire}, device lost before transmit");
            shared.sending.store(false, Ordering::Release);
            shared.release_tx();
            return;
        }
        let result = {
            let shared = shared.clone();
            tokio::task::spawn_blocking(move || lock(&shared.chip).transmit(&bytes)).await
        };
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                log::error!("{id}: transmit failed: {e}");
                shared.abort_send();
            }
            Err(e) => {
                log::error!("{id}: transmit task failed: {e}");
                shared.abort_send();
            }
        }
    }

    fn is_open(&self) -> bool {
        !self.shared.stopped.load(Ordering::Acquire) && lock(&self.shared.chip).is_open()
    }

    fn state(&self) -> ConnectionState {
        *lock(&self.shared.state)
    }

    fn last_packet_received(&self) -> Option<SystemTime> {
        *lock(&self.shared.last_received)
    }

    fn last_packet_sent(&self) -> Option<SystemTime> {
        *lock(&self.shared.last_sent)
    }
}

impl<S, I> Drop for Cc1100Interface<S, I> {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
    }
}

impl<S: SpiBus, I: InterruptLine> Shared<S, I> {
    fn set_state(&self, state: ConnectionState) {
        let mut current = lock(&self.state);
        if *current != state {
            log::debug!("{}: {:?} -> {state:?}", self.settings.id, *current);
            *current = state;
        }
    }

    /// Opens the bus, programs the chip, then opens the interrupt line and
    /// raises the high-gain line. Receive is enabled separately.
    fn init_device(&self) -> Result<(), LinkError> {
        {
            let mut chip = lock(&self.chip);
            chip.open()?;
            chip.init(&self.config, self.tx_power)?;
        }
        {
            let mut interrupt = lock(&self.interrupt);
            if !interrupt.is_open() {
                interrupt.open()?;
            }
        }
        if let Some(line) = lock(&self.high_gain).as_mut() {
            gpio::ensure_high(line.as_mut())?;
        }
        self.first_packet.store(true, Ordering::Release);
        Ok(())
    }

    fn close_device(&self) {
        self.stopped.store(true, Ordering::Release);
        lock(&self.chip).close();
        lock(&self.interrupt).close();
    }

    fn device_open(&self) -> bool {
        lock(&self.chip).is_open() && lock(&self.interrupt).is_open()
    }

    fn release_tx(&self) {
        lock(&self.tx_hold).take();
    }

    fn release_receive_hold(&self) {
        let mut hold = lock(&self.tx_hold);
        if matches!(*hold, Some(TxHold::Receiving { .. })) {
            *hold = None;
        }
    }

    fn hold_for_receive(&self) {
        let mut hold = lock(&self.tx_hold);
        if hold.is_none() {
            if let Ok(gate) = self.tx_gate.clone().try_lock_owned() {
                *hold = Some(TxHold::Receiving { _guard: gate });
            }
        }
    }

    /// Takes the transmit gate from the poller thread. A send that parked
    /// its hold while the device was down is dropped so the gate reopens.
    /// `None` once shutdown is requested.
    fn take_gate(&self) -> Option<OwnedMutexGuard<()>> {
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return None;
            }
            self.release_tx();
            if let Ok(gate) = self.tx_gate.clone().try_lock_owned() {
                return Some(gate);
            }
            thread::sleep(GATE_RETRY);
        }
    }

    fn abort_send(&self) {
        self.sending.store(false, Ordering::Release);
        self.release_tx();
        lock(&self.chip).close();
    }

    fn end_send(&self) {
        self.sending.store(false, Ordering::Release);
        let ended = lock(&self.chip).end_transmit();
        match ended {
            Ok(()) => *lock(&self.last_sent) = Some(SystemTime::now()),
            Err(e) => log::error!("{}: could not return to receive: {e}", self.settings.id),
        }
    }

    /// Handles a completed reception: checks the CRC, reads the frame and
    /// publishes it. A desynchronized FIFO closes the bus.
    fn receive(&self) {
        let id = &self.settings.id;
        let mut chip = lock(&self.chip);
        if self.first_packet.swap(false, Ordering::AcqRel) {
            log::debug!("{id}: discarding first packet after initialization");
        } else {
            match chip.crc_ok() {
                Ok(true) => match chip.read_fifo_frame() {
                    Ok(frame) if frame.len() > MAX_FRAME_LEN || frame[0] == 0 => {
                        log::warn!(
                            "{id}: read {} bytes from FIFO, lost sync with the chip",
                            frame.len()
                        );
                        chip.close();
                        return;
                    }
                    Ok(frame) => {
                        if self.settings.verbosity >= Verbosity::Debug {
                            log::debug!("{id}: received frame {frame:02x?}");
                        }
                        *lock(&self.last_received) = Some(SystemTime::now());
                        if self
                            .events
                            .send(InterfaceEvent::RadioFrame {
                                interface_id: id.clone(),
                                frame,
                            })
                            .is_err()
                        {
                            log::debug!("{id}: event receiver dropped");
                        }
                    }
                    Err(e) => {
                        log::error!("{id}: could not read FIFO: {e}");
                        chip.close();
                        return;
                    }
                },
                Ok(false) => log::debug!("{id}: packet received, but CRC failed"),
                Err(e) => {
                    log::error!("{id}: could not read CRC status: {e}");
                    chip.close();
                    return;
                }
            }
        }
        if !self.send_pending.load(Ordering::Acquire) {
            if let Err(e) = chip.enable_rx(true) {
                log::error!("{id}: could not re-enable receive: {e}");
                chip.close();
            }
        }
    }

    /// Brings the device back after it was lost. Returns false when the
    /// device could not be reinitialized.
    fn recover(&self) -> bool {
        let id = &self.settings.id;
        log::error!("{id}: connection to CC1100 lost, reinitializing");
        self.stopped.store(true, Ordering::Release);
        self.set_state(ConnectionState::Reconnecting);
        if self.sending.swap(false, Ordering::AcqRel) {
            thread::sleep(ABORTED_SEND_DELAY);
        }
        self.release_tx();
        lock(&self.interrupt).close();

        if let Err(e) = self.init_device() {
            log::error!("{id}: reinitialization failed: {e}");
            self.close_device();
            self.set_state(ConnectionState::Disconnected);
            return false;
        }
        thread::sleep(REINIT_DELAY);
        {
            let Some(_gate) = self.take_gate() else {
                log::debug!("{id}: shut down during reinitialization");
                self.close_device();
                self.set_state(ConnectionState::Disconnected);
                return false;
            };
            let enabled = lock(&self.chip).enable_rx(true);
            if let Err(e) = enabled {
                log::error!("{id}: could not enable receive: {e}");
                self.close_device();
                self.set_state(ConnectionState::Disconnected);
                return false;
            }
        }
        self.stopped.store(false, Ordering::Release);
        self.set_state(ConnectionState::Listening);
        true
    }
}

/// The bytes clocked into the TX FIFO for `packet`.
fn radio_frame(packet: &IntertechnoPacket) -> Result<Vec<u8>, LinkError> {
    match packet.radio_bytes() {
        Ok(bytes) => Ok(bytes),
        Err(EncodeError::PayloadTooLong { len, max }) => Err(LinkError::PacketTooLarge { len, max }),
        Err(e) => Err(e.into()),
    }
}

fn poll_loop<S: SpiBus, I: InterruptLine>(shared: &Shared<S, I>) {
    let id = &shared.settings.id;
    while !shared.shutdown.load(Ordering::Acquire) {
        if !shared.device_open() {
            if shared.recover() {
                continue;
            }
            break;
        }

        let edge = lock(&shared.interrupt).wait_for_edge(POLL_TIMEOUT);
        match edge {
            Ok(None) => shared.release_receive_hold(),
            // Low: a packet is still arriving.
            Ok(Some(false)) => {
                if !shared.sending.load(Ordering::Acquire) {
                    shared.hold_for_receive();
                }
            }
            Ok(Some(true)) => {
                if shared.sending.load(Ordering::Acquire) {
                    shared.end_send();
                } else {
                    shared.receive();
                }
                shared.release_tx();
            }
            Err(e) => {
                log::error!("{id}: could not poll interrupt line: {e}");
                shared.release_tx();
                lock(&shared.interrupt).close();
            }
        }
    }
    log::debug!("{id}: poller stopped");
}

#[cfg(test)]
mod tests {
    use super::{radio_frame, Cc1100Interface, TxHold};
    use crate::cc1100::{InterruptLine, SpiBus};
    use crate::settings::{Cc1100Settings, InterfaceSettings};
    use crate::{event_channel, lock, ConnectionState, LinkError, RadioInterface};
    use intertechno_core::{EncodeError, IntertechnoPacket};
    use std::io;
    use std::sync::{mpsc, Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    type Hook = Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>;

    /// Register file that runs a one-shot hook when the bus is opened.
    struct HookedSpi {
        open: bool,
        registers: Vec<u8>,
        on_open: Hook,
    }

    impl SpiBus for HookedSpi {
        fn open(&mut self) -> io::Result<()> {
            self.open = true;
            let hook = lock(&self.on_open).take();
            if let Some(hook) = hook {
                hook();
            }
            Ok(())
        }

        fn close(&mut self) {
            self.open = false;
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn transfer(&mut self, data: &mut [u8]) -> io::Result<()> {
            let header = data[0];
            let register = usize::from(header & 0x3F);
            if data.len() > 1 && header & 0x80 == 0 {
                self.registers[register] = data[1];
                data[1] = 0;
            } else {
                for (i, b) in data.iter_mut().enumerate().skip(1) {
                    *b = self.registers[(register + i - 1) % 0x40];
                }
            }
            data[0] = 0;
            Ok(())
        }
    }

    #[derive(Default)]
    struct QuietLine {
        open: bool,
    }

    impl InterruptLine for QuietLine {
        fn open(&mut self) -> io::Result<()> {
            self.open = true;
            Ok(())
        }

        fn close(&mut self) {
            self.open = false;
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn wait_for_edge(&mut self, timeout: Duration) -> io::Result<Option<bool>> {
            thread::sleep(timeout);
            Ok(None)
        }
    }

    fn interface(on_open: Hook) -> Cc1100Interface<HookedSpi, QuietLine> {
        let spi = HookedSpi {
            open: false,
            registers: vec![0; 0x40],
            on_open,
        };
        Cc1100Interface::new(
            InterfaceSettings::new("cc1100"),
            &Cc1100Settings::new("/dev/spidev0.0", 25),
            spi,
            QuietLine::default(),
            None,
            event_channel().0,
        )
        .unwrap()
    }

    #[test]
    fn recovery_drains_a_send_hold_parked_during_reinit() {
        let hook: Hook = Arc::new(Mutex::new(None));
        let iface = interface(hook.clone());
        let shared = iface.shared.clone();

        // A sender that took the gate just before the device dropped parks
        // its hold while the chip is being reprogrammed.
        let late_sender = shared.clone();
        *lock(&hook) = Some(Box::new(move || {
            let gate = late_sender.tx_gate.clone().try_lock_owned().unwrap();
            *lock(&late_sender.tx_hold) = Some(TxHold::Sending { _guard: gate });
        }));

        let (done_tx, done_rx) = mpsc::channel();
        let recovering = shared.clone();
        thread::spawn(move || done_tx.send(recovering.recover()).unwrap());

        assert!(done_rx.recv_timeout(Duration::from_secs(5)).unwrap());
        assert_eq!(iface.state(), ConnectionState::Listening);
        assert!(lock(&shared.tx_hold).is_none());
        assert!(shared.tx_gate.clone().try_lock_owned().is_ok());
    }

    #[test]
    fn recovery_gives_up_the_gate_wait_on_shutdown() {
        let hook: Hook = Arc::new(Mutex::new(None));
        let iface = interface(hook.clone());
        let shared = iface.shared.clone();

        // The gate stays taken outside `tx_hold`, so only shutdown ends the wait.
        let held = shared.tx_gate.clone().try_lock_owned().unwrap();
        let (done_tx, done_rx) = mpsc::channel();
        let recovering = shared.clone();
        thread::spawn(move || done_tx.send(recovering.recover()).unwrap());

        thread::sleep(Duration::from_millis(1500));
        shared.shutdown.store(true, std::sync::atomic::Ordering::Release);
        assert!(!done_rx.recv_timeout(Duration::from_secs(5)).unwrap());
        assert_eq!(iface.state(), ConnectionState::Disconnected);
        drop(held);
    }

    #[test]
    fn radio_frame_maps_encode_failures() {
        let frame = radio_frame(&IntertechnoPacket::new(75, "FF")).unwrap();
        assert_eq!(frame.len(), 2);

        let oversized = radio_frame(&IntertechnoPacket::new(75, "F".repeat(130)));
        assert!(matches!(
            oversized,
            Err(LinkError::PacketTooLarge { len: 140, .. })
        ));

        let invalid = radio_frame(&IntertechnoPacket::new(75, "FX"));
        assert!(matches!(
            invalid,
            Err(LinkError::Encode(EncodeError::InvalidBit('X')))
        ));
    }
}
