use super::assembler::LineAssembler;
use crate::event::{EventSender, InterfaceEvent};
use crate::gpio::{self, OutputLine};
use crate::lifecycle::{ConnectionState, Lifecycle, LinkAction, LinkEvent, RetryPolicy};
use crate::settings::{InterfaceSettings, LineTiming, SerialSettings, TcpSettings, Verbosity};
use crate::{lock, LinkError, RadioInterface};
use intertechno_core::{Frame, Framer, IntertechnoPacket};
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, SystemTime};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_serial::SerialPortBuilderExt;

/// Switches a CUL-family dongle into raw Intertechno receive mode.
pub const INIT_COMMAND: &str = "X21\r\n";

const READ_CHUNK: usize = 2048;
const RESET_PULSE: Duration = Duration::from_secs(1);
const RESET_RECOVERY: Duration = Duration::from_secs(2);

type LineReader = Box<dyn AsyncRead + Send + Unpin>;
type LineWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Control lines of a COC board.
#[derive(Default)]
pub struct CocLines {
    pub reset: Option<Box<dyn OutputLine>>,
    pub enable: Option<Box<dyn OutputLine>>,
}

impl fmt::Debug for CocLines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CocLines")
            .field("reset", &self.reset.is_some())
            .field("enable", &self.enable.is_some())
            .finish()
    }
}

/// Which dongle a [`LineInterface`] talks to.
#[derive(Debug)]
pub enum LineDevice {
    Cul(SerialSettings),
    Coc(SerialSettings, CocLines),
    Cunx(TcpSettings),
}

impl LineDevice {
    pub fn default_timing(&self) -> LineTiming {
        match self {
            Self::Cul(_) => LineTiming::cul(),
            Self::Coc(..) => LineTiming::coc(),
            Self::Cunx(_) => LineTiming::cunx(),
        }
    }
}

#[derive(Debug)]
enum Endpoint {
    Serial(SerialSettings),
    Tcp(TcpSettings),
}

impl Endpoint {
    async fn open(&self) -> Result<(LineReader, LineWriter), LinkError> {
        match self {
            Self::Serial(s) => {
                if s.device.is_empty() {
                    return Err(LinkError::MissingDevice);
                }
                let stream = tokio_serial::new(&s.device, s.baud_rate).open_native_async()?;
                let (r, w) = tokio::io::split(stream);
                Ok((Box::new(r), Box::new(w)))
            }
            Self::Tcp(t) => {
                if t.host.is_empty() {
                    return Err(LinkError::MissingDevice);
                }
                let stream = TcpStream::connect((t.host.as_str(), t.port)).await?;
                let (r, w) = stream.into_split();
                Ok((Box::new(r), Box::new(w)))
            }
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial(s) => write!(f, "{} at {} baud", s.device, s.baud_rate),
            Self::Tcp(t) => write!(f, "{}:{}", t.host, t.port),
        }
    }
}

struct Shared {
    settings: InterfaceSettings,
    endpoint: Endpoint,
    coc_lines: Option<Mutex<CocLines>>,
    timing: LineTiming,
    framer: Framer,
    events: EventSender,
    /// Write half of the open connection. Held for the whole of a send.
    writer: Mutex<Option<LineWriter>>,
    open: AtomicBool,
    /// Wakes an initial connect that is still in progress when a stop comes in.
    stop_signal: Notify,
    lifecycle: StdMutex<Lifecycle>,
    last_received: StdMutex<Option<SystemTime>>,
    last_sent: StdMutex<Option<SystemTime>>,
}

struct Listener {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

/// A CUL, COC or CUNX dongle speaking the line protocol.
///
/// One background task per interface reads lines, classifies them and
/// publishes [`InterfaceEvent`]s. Sends are serialized on the connection's
/// write half.
pub struct LineInterface {
    shared: Arc<Shared>,
    listener: Mutex<Option<Listener>>,
}

impl LineInterface {
    pub fn new(
        settings: InterfaceSettings,
        device: LineDevice,
        timing: LineTiming,
        events: EventSender,
    ) -> Self {
        let (endpoint, coc_lines) = match device {
            LineDevice::Cul(serial) => (Endpoint::Serial(serial), None),
            LineDevice::Coc(serial, lines) => (Endpoint::Serial(serial), Some(Mutex::new(lines))),
            LineDevice::Cunx(tcp) => (Endpoint::Tcp(tcp), None),
        };
        let policy = RetryPolicy {
            backoff: timing.reconnect_backoff,
            retry_failed_open: timing.retry_failed_open,
        };
        Self {
            shared: Arc::new(Shared {
                framer: Framer::new(settings.stack_prefix()),
                settings,
                endpoint,
                coc_lines,
                timing,
                events,
                writer: Mutex::new(None),
                open: AtomicBool::new(false),
                stop_signal: Notify::new(),
                lifecycle: StdMutex::new(Lifecycle::new(policy)),
                last_received: StdMutex::new(None),
                last_sent: StdMutex::new(None),
            }),
            listener: Mutex::new(None),
        }
    }

    /// CUL stick on a serial port (57600 baud).
    pub fn cul(settings: InterfaceSettings, serial: SerialSettings, events: EventSender) -> Self {
        let device = LineDevice::Cul(serial);
        let timing = device.default_timing();
        Self::new(settings, device, timing, events)
    }

    /// COC board on a serial port (38400 baud) with optional reset and
    /// enable lines.
    pub fn coc(
        settings: InterfaceSettings,
        serial: SerialSettings,
        lines: CocLines,
        events: EventSender,
    ) -> Self {
        let device = LineDevice::Coc(serial, lines);
        let timing = device.default_timing();
        Self::new(settings, device, timing, events)
    }

    /// CUNX network bridge.
    pub fn cunx(settings: InterfaceSettings, tcp: TcpSettings, events: EventSender) -> Self {
        let device = LineDevice::Cunx(tcp);
        let timing = device.default_timing();
        Self::new(settings, device, timing, events)
    }

    pub fn timing(&self) -> LineTiming {
        self.shared.timing
    }
}

impl RadioInterface for LineInterface {
    fn id(&self) -> &str {
        &self.shared.settings.id
    }

    async fn start_listening(&self) {
        self.stop_listening().await;
        let shared = &self.shared;
        let mut slot = self.listener.lock().await;
        let stopped = shared.stop_signal.notified();
        tokio::pin!(stopped);
        stopped.as_mut().enable();

        if shared.transition(LinkEvent::StartRequested) != LinkAction::Open {
            return;
        }
        let connected = tokio::select! {
            connected = shared.connect() => connected,
            _ = stopped => {
                log::debug!("{}: stopped while connecting", shared.settings.id);
                return;
            }
        };
        let (reader, action) = match connected {
            Ok(reader) => (Some(reader), shared.transition(LinkEvent::Opened)),
            Err(e) => {
                log::error!(
                    "{}: could not open {}: {e}",
                    shared.settings.id,
                    shared.endpoint
                );
                (None, shared.transition(LinkEvent::OpenFailed))
            }
        };
        if action == LinkAction::Close {
            return;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_listener(shared.clone(), shutdown_rx, reader, action));
        *slot = Some(Listener { handle, shutdown });
    }

    async fn stop_listening(&self) {
        self.shared.stop_signal.notify_waiters();
        let listener = self.listener.lock().await.take();
        if let Some(listener) = listener {
            let _ = listener.shutdown.send(true);
            if let Err(e) = listener.handle.await {
                log::warn!("{}: listener task ended abnormally: {e}", self.id());
            }
        }
        self.shared.close().await;
    }

    async fn send_packet(&self, packet: &IntertechnoPacket) {
        let shared = &self.shared;
        let dialect = shared.settings.dialect;
        let wire = packet.wire_form_for(dialect);
        if !shared.open.load(Ordering::Acquire) {
            log::warn!(
                "{}: not sending {wire}, device is not open",
                shared.settings.id
            );
            return;
        }

        let line = packet.transmit_line(shared.framer.prefix().as_str(), dialect);
        let mut writer = shared.writer.lock().await;
        let Some(w) = writer.as_mut() else {
            log::warn!(
                "{}: not sending {wire}, device is not open",
                shared.settings.id
            );
            return;
        };
        log::info!("{}: sending {wire}", shared.settings.id);
        if let Err(e) = write_line(w, &line).await {
            log::error!("{}: write failed: {e}", shared.settings.id);
            shared.open.store(false, Ordering::Release);
            *writer = None;
            return;
        }
        *lock(&shared.last_sent) = Some(SystemTime::now());

        if !shared.timing.post_send_delay.is_zero() {
            sleep(shared.timing.post_send_delay).await;
        }
    }

    fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }

    fn state(&self) -> ConnectionState {
        lock(&self.shared.lifecycle).state()
    }

    fn last_packet_received(&self) -> Option<SystemTime> {
        *lock(&self.shared.last_received)
    }

    fn last_packet_sent(&self) -> Option<SystemTime> {
        *lock(&self.shared.last_sent)
    }
}

impl Drop for LineInterface {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.listener.try_lock() {
            if let Some(listener) = slot.take() {
                let _ = listener.shutdown.send(true);
            }
        }
    }
}

impl Shared {
    fn transition(&self, event: LinkEvent) -> LinkAction {
        let mut lifecycle = lock(&self.lifecycle);
        let before = lifecycle.state();
        let action = lifecycle.apply(event);
        if lifecycle.state() != before {
            log::debug!(
                "{}: {before:?} -> {:?} on {event:?}",
                self.settings.id,
                lifecycle.state()
            );
        }
        action
    }

    /// Opens the device, runs the board's power-up sequence and writes the
    /// init commands. The write half is published only once all succeeded.
    async fn connect(&self) -> Result<LineReader, LinkError> {
        log::debug!("{}: connecting to {}", self.settings.id, self.endpoint);
        let (reader, mut writer) = self.endpoint.open().await?;

        if let Some(lines) = &self.coc_lines {
            power_up(&mut *lines.lock().await).await?;
        }
        write_line(&mut writer, INIT_COMMAND).await?;
        for command in &self.settings.additional_commands {
            write_line(&mut writer, &terminated(command)).await?;
        }
        if !self.timing.settle_delay.is_zero() {
            sleep(self.timing.settle_delay).await;
        }

        *self.writer.lock().await = Some(writer);
        self.open.store(true, Ordering::Release);
        log::info!("{}: connected to {}", self.settings.id, self.endpoint);
        Ok(reader)
    }

    async fn drop_connection(&self) {
        self.open.store(false, Ordering::Release);
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
    }

    async fn close(&self) {
        self.drop_connection().await;
        self.transition(LinkEvent::StopRequested);
    }

    fn dispatch_line(&self, line: &str) {
        let id = &self.settings.id;
        let verbosity = self.settings.verbosity;
        if verbosity >= Verbosity::Debug {
            log::debug!("{id}: raw line received: {}", line.trim_end());
        }
        *lock(&self.last_received) = Some(SystemTime::now());

        match self.framer.classify(line) {
            Frame::Packet(packet) => {
                if verbosity >= Verbosity::Debug {
                    log::debug!(
                        "{id}: recognized {} packet from {}",
                        packet.protocol(),
                        packet.sender_address()
                    );
                }
                self.emit(InterfaceEvent::Packet {
                    interface_id: id.clone(),
                    packet,
                });
            }
            Frame::DutyCycleLimit => {
                log::warn!("{id}: reached the 1% duty-cycle limit, sending is refused until it recovers");
                self.emit(InterfaceEvent::DutyCycleLimit {
                    interface_id: id.clone(),
                });
            }
            Frame::Unrecognized(text) => {
                if verbosity > Verbosity::Quiet {
                    log::info!("{id}: unknown line received: {text}");
                }
            }
            Frame::Malformed { protocol, error } => {
                log::debug!("{id}: dropping malformed {protocol} line: {error}");
            }
            Frame::Ignored => {}
        }
    }

    fn emit(&self, event: InterfaceEvent) {
        if self.events.send(event).is_err() {
            log::debug!("{}: event receiver dropped", self.settings.id);
        }
    }
}

async fn run_listener(
    shared: Arc<Shared>,
    shutdown: watch::Receiver<bool>,
    mut reader: Option<LineReader>,
    mut action: LinkAction,
) {
    let id = shared.settings.id.clone();
    let mut assembler = LineAssembler::default();
    let mut buf = vec![0u8; READ_CHUNK];

    while !stop_requested(&shutdown) {
        match action {
            LinkAction::Close => break,
            LinkAction::Open => {
                let mut shutdown = shutdown.clone();
                let connected = tokio::select! {
                    connected = shared.connect() => connected,
                    _ = shutdown.changed() => break,
                };
                action = match connected {
                    Ok(r) => {
                        reader = Some(r);
                        assembler.clear();
                        shared.transition(LinkEvent::Opened)
                    }
                    Err(e) => {
                        log::error!("{id}: could not reopen {}: {e}", shared.endpoint);
                        shared.transition(LinkEvent::OpenFailed)
                    }
                };
            }
            LinkAction::Wait(backoff) => {
                let mut shutdown = shutdown.clone();
                tokio::select! {
                    _ = sleep(backoff) => {}
                    _ = shutdown.changed() => {}
                }
                action = shared.transition(LinkEvent::BackoffElapsed);
            }
            LinkAction::None => {
                let Some(r) = reader.as_mut() else { break };
                let failed = if !shared.open.load(Ordering::Acquire) {
                    log::warn!("{id}: connection marked broken, reconnecting");
                    true
                } else {
                    match timeout(shared.timing.read_timeout, r.read(&mut buf)).await {
                        Err(_) => false,
                        Ok(Ok(0)) => {
                            log::warn!("{id}: connection closed by peer, reconnecting");
                            true
                        }
                        Ok(Ok(n)) => {
                            if shared.settings.verbosity >= Verbosity::Trace {
                                log::trace!("{id}: read {n} bytes: {:?}", &buf[..n]);
                            }
                            for line in assembler.push(&buf[..n]) {
                                shared.dispatch_line(&line);
                            }
                            false
                        }
                        Ok(Err(e)) => {
                            log::error!("{id}: read failed: {e}, reconnecting");
                            true
                        }
                    }
                };
                if failed {
                    reader = None;
                    shared.drop_connection().await;
                    action = shared.transition(LinkEvent::ReadFailed);
                }
            }
        }
    }

    drop(reader);
    shared.drop_connection().await;
}

fn stop_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

async fn write_line(writer: &mut LineWriter, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}

fn terminated(command: &str) -> String {
    if command.ends_with('\n') {
        command.to_string()
    } else {
        format!("{command}\r\n")
    }
}

/// Enable line high, then a reset pulse if the board is held in reset.
async fn power_up(lines: &mut CocLines) -> io::Result<()> {
    if let Some(enable) = lines.enable.as_mut() {
        gpio::ensure_high(&mut **enable)?;
    }
    if let Some(reset) = lines.reset.as_mut() {
        if !reset.get()? {
            reset.set(false)?;
            sleep(RESET_PULSE).await;
            reset.set(true)?;
            sleep(RESET_RECOVERY).await;
        }
    }
    Ok(())
}
