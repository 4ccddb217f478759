use clap::{Args, ValueEnum};
use intertechno_core::{IntertechnoPacket, WireDialect};
use intertechno_link::{
    Cc1100Settings, CocGpio, CocLines, ConnectionState, EventSender, InterfaceSettings,
    InterruptPin, LineInterface, LinkError, RadioInterface, SerialSettings, TcpSettings,
    Verbosity,
};
use std::time::SystemTime;

/// Which dongle to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InterfaceKind {
    /// CUL stick on a serial port.
    Cul,
    /// COC board on a serial port.
    Coc,
    /// CUNX network bridge.
    Cunx,
    /// CC1100 transceiver on spidev, needs the linux-hw feature.
    Cc1100,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VerbosityArg {
    Quiet,
    Normal,
    Debug,
    Trace,
}

impl VerbosityArg {
    pub const fn into_verbosity(self) -> Verbosity {
        match self {
            Self::Quiet => Verbosity::Quiet,
            Self::Normal => Verbosity::Normal,
            Self::Debug => Verbosity::Debug,
            Self::Trace => Verbosity::Trace,
        }
    }
}

/// Address bit alphabet used when sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DialectArg {
    Standard,
    CulLegacy,
}

impl DialectArg {
    pub const fn into_dialect(self) -> WireDialect {
        match self {
            Self::Standard => WireDialect::Standard,
            Self::CulLegacy => WireDialect::CulLegacy,
        }
    }
}

/// Connection options shared by the binaries that open an interface.
#[derive(Args, Debug, Clone)]
pub struct InterfaceArgs {
    #[arg(long, value_enum, default_value = "cul")]
    pub kind: InterfaceKind,
    /// Serial device for CUL and COC.
    #[arg(long, default_value = "/dev/ttyACM0")]
    pub device: String,
    /// Override the variant's default baud rate.
    #[arg(long)]
    pub baud: Option<u32>,
    /// CUNX host.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
    #[arg(long, default_value_t = 2323)]
    pub port: u16,
    #[arg(long, default_value = "it0")]
    pub id: String,
    /// 1-based position in a daisy chain of stacked dongles.
    #[arg(long, default_value_t = 1)]
    pub stack_position: u8,
    /// Extra init command written after X21, repeatable.
    #[arg(long = "init")]
    pub init_commands: Vec<String>,
    #[arg(long, value_enum, default_value = "standard")]
    pub dialect: DialectArg,
    #[arg(long, value_enum, default_value = "normal")]
    pub verbosity: VerbosityArg,
    /// COC reset line GPIO number.
    #[arg(long)]
    pub reset_gpio: Option<u32>,
    /// COC enable line GPIO number.
    #[arg(long)]
    pub enable_gpio: Option<u32>,
    /// CC1100 spidev device.
    #[arg(long, default_value = "/dev/spidev0.0")]
    pub spi_device: String,
    /// CC1100 GDO pin wired as the interrupt, 0 or 2.
    #[arg(long, default_value_t = 2, allow_negative_numbers = true)]
    pub interrupt_pin: i32,
    /// GPIO number the CC1100 interrupt pin is connected to.
    #[arg(long, default_value_t = 25)]
    pub interrupt_gpio: u32,
    /// GPIO number of the CC1100 high-gain enable line.
    #[arg(long)]
    pub high_gain_gpio: Option<u32>,
    #[arg(long, default_value_t = Cc1100Settings::DEFAULT_OSCILLATOR_HZ)]
    pub oscillator_hz: u32,
}

impl InterfaceArgs {
    pub fn settings(&self) -> InterfaceSettings {
        let mut settings = InterfaceSettings::new(self.id.clone())
            .with_stack_position(self.stack_position)
            .with_dialect(self.dialect.into_dialect())
            .with_verbosity(self.verbosity.into_verbosity());
        for command in &self.init_commands {
            settings = settings.with_additional_command(command.clone());
        }
        settings
    }

    pub fn coc_gpio(&self) -> CocGpio {
        CocGpio {
            reset: self.reset_gpio,
            enable: self.enable_gpio,
        }
    }

    pub fn cc1100_settings(&self) -> Cc1100Settings {
        let mut radio = Cc1100Settings::new(self.spi_device.clone(), self.interrupt_gpio);
        radio.interrupt_pin = InterruptPin::from_number(self.interrupt_pin);
        radio.oscillator_hz = self.oscillator_hz;
        radio.high_gain_gpio = self.high_gain_gpio;
        radio
    }

    fn serial(&self, mut serial: SerialSettings) -> SerialSettings {
        if let Some(baud) = self.baud {
            serial.baud_rate = baud;
        }
        serial
    }

    /// Builds the interface. Nothing is opened until `start_listening`.
    pub fn build(&self, events: EventSender) -> Result<ToolInterface, LinkError> {
        let settings = self.settings();
        let line = match self.kind {
            InterfaceKind::Cul => {
                LineInterface::cul(settings, self.serial(SerialSettings::cul(&self.device)), events)
            }
            InterfaceKind::Coc => LineInterface::coc(
                settings,
                self.serial(SerialSettings::coc(&self.device)),
                coc_lines(&self.coc_gpio())?,
                events,
            ),
            InterfaceKind::Cunx => {
                LineInterface::cunx(settings, TcpSettings::new(&self.host, self.port), events)
            }
            InterfaceKind::Cc1100 => return cc1100(settings, &self.cc1100_settings(), events),
        };
        Ok(ToolInterface::Line(line))
    }
}

/// Whichever interface the command line selected.
pub enum ToolInterface {
    Line(LineInterface),
    #[cfg(all(feature = "linux-hw", target_os = "linux"))]
    Cc1100(
        intertechno_link::Cc1100Interface<
            intertechno_link::linux::SpidevBus,
            intertechno_link::linux::SysfsInterrupt,
        >,
    ),
}

macro_rules! each {
    ($self:ident, $iface:ident => $body:expr) => {
        match $self {
            ToolInterface::Line($iface) => $body,
            #[cfg(all(feature = "linux-hw", target_os = "linux"))]
            ToolInterface::Cc1100($iface) => $body,
        }
    };
}

impl RadioInterface for ToolInterface {
    fn id(&self) -> &str {
        each!(self, iface => iface.id())
    }

    async fn start_listening(&self) {
        each!(self, iface => iface.start_listening().await)
    }

    async fn stop_listening(&self) {
        each!(self, iface => iface.stop_listening().await)
    }

    async fn send_packet(&self, packet: &IntertechnoPacket) {
        each!(self, iface => iface.send_packet(packet).await)
    }

    fn is_open(&self) -> bool {
        each!(self, iface => iface.is_open())
    }

    fn state(&self) -> ConnectionState {
        each!(self, iface => iface.state())
    }

    fn last_packet_received(&self) -> Option<SystemTime> {
        each!(self, iface => iface.last_packet_received())
    }

    fn last_packet_sent(&self) -> Option<SystemTime> {
        each!(self, iface => iface.last_packet_sent())
    }
}

#[cfg(all(feature = "linux-hw", target_os = "linux"))]
fn cc1100(
    settings: InterfaceSettings,
    radio: &Cc1100Settings,
    events: EventSender,
) -> Result<ToolInterface, LinkError> {
    intertechno_link::Cc1100Interface::linux(settings, radio, events).map(ToolInterface::Cc1100)
}

#[cfg(not(all(feature = "linux-hw", target_os = "linux")))]
fn cc1100(
    _settings: InterfaceSettings,
    _radio: &Cc1100Settings,
    _events: EventSender,
) -> Result<ToolInterface, LinkError> {
    Err(LinkError::Io(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "the CC1100 needs the linux-hw feature",
    )))
}

#[cfg(all(feature = "linux-hw", target_os = "linux"))]
fn coc_lines(gpio: &CocGpio) -> std::io::Result<CocLines> {
    CocLines::from_sysfs(gpio)
}

#[cfg(not(all(feature = "linux-hw", target_os = "linux")))]
fn coc_lines(gpio: &CocGpio) -> std::io::Result<CocLines> {
    if gpio.reset.is_some() || gpio.enable.is_some() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "GPIO lines need the linux-hw feature",
        ));
    }
    Ok(CocLines::default())
}
