//! Typed interface configuration.
//!
//! Loading these from a file is left to the host; with the `serde` feature
//! every struct here can be deserialized from any serde format.

use intertechno_core::{StackPrefix, WireDialect};
use std::time::Duration;

/// How much of the raw traffic an interface logs.
///
/// The `log` level filter still applies on top of this.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    /// Every received line and recognized packet.
    Debug,
    /// Also raw byte chunks as read from the device.
    Trace,
}

/// Settings shared by every interface kind.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct InterfaceSettings {
    pub id: String,
    /// 1-based position in a daisy chain of dongles on one line.
    pub stack_position: u8,
    /// Lines written after `X21` on every (re)connect.
    pub additional_commands: Vec<String>,
    pub dialect: WireDialect,
    pub verbosity: Verbosity,
}

impl Default for InterfaceSettings {
    fn default() -> Self {
        Self {
            id: String::from("intertechno"),
            stack_position: 1,
            additional_commands: Vec::new(),
            dialect: WireDialect::Standard,
            verbosity: Verbosity::Normal,
        }
    }
}

impl InterfaceSettings {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_stack_position(mut self, position: u8) -> Self {
        self.stack_position = position;
        self
    }

    pub fn with_additional_command(mut self, command: impl Into<String>) -> Self {
        self.additional_commands.push(command.into());
        self
    }

    pub fn with_dialect(mut self, dialect: WireDialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn stack_prefix(&self) -> StackPrefix {
        StackPrefix::for_position(self.stack_position)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SerialSettings {
    pub device: String,
    pub baud_rate: u32,
}

impl SerialSettings {
    pub const CUL_BAUD_RATE: u32 = 57_600;
    pub const COC_BAUD_RATE: u32 = 38_400;

    pub fn cul(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            baud_rate: Self::CUL_BAUD_RATE,
        }
    }

    pub fn coc(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            baud_rate: Self::COC_BAUD_RATE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TcpSettings {
    pub host: String,
    pub port: u16,
}

impl TcpSettings {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// GPIO numbers wired to a COC board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CocGpio {
    /// Pulsed low to reset the board (GPIO 1).
    pub reset: Option<u32>,
    /// Held high to power the board (GPIO 2).
    pub enable: Option<u32>,
}

/// CC1100 pin used as the packet interrupt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InterruptPin {
    Gdo0,
    #[default]
    Gdo2,
}

impl InterruptPin {
    /// Maps a configured pin number. Anything but 0 or 2 falls back to GDO2.
    pub fn from_number(pin: i32) -> Self {
        match pin {
            0 => Self::Gdo0,
            2 => Self::Gdo2,
            other => {
                if other > 0 {
                    log::warn!("invalid CC1100 interrupt pin {other}, using GDO2");
                }
                Self::Gdo2
            }
        }
    }

    pub fn number(self) -> i32 {
        match self {
            Self::Gdo0 => 0,
            Self::Gdo2 => 2,
        }
    }
}

/// Stores the pin as its number. Numbers go through
/// [`InterruptPin::from_number`], so unknown pins load as GDO2.
#[cfg(feature = "serde")]
mod pin_number {
    use super::InterruptPin;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Stored {
        Number(i32),
        Name(InterruptPin),
    }

    pub fn serialize<S: Serializer>(pin: &InterruptPin, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(pin.number())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<InterruptPin, D::Error> {
        Ok(match Stored::deserialize(deserializer)? {
            Stored::Number(pin) => InterruptPin::from_number(pin),
            Stored::Name(pin) => pin,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cc1100Settings {
    /// spidev path, e.g. `/dev/spidev0.0`.
    pub device: String,
    pub oscillator_hz: u32,
    #[cfg_attr(feature = "serde", serde(with = "pin_number"))]
    pub interrupt_pin: InterruptPin,
    /// PATABLE value. Defaults to `0x27` with a high-gain line, else `0xC0`.
    pub tx_power: Option<u8>,
    /// GPIO number of the interrupt input.
    pub interrupt_gpio: u32,
    /// GPIO number of the optional high-gain enable output.
    pub high_gain_gpio: Option<u32>,
}

impl Cc1100Settings {
    pub const DEFAULT_OSCILLATOR_HZ: u32 = 26_000_000;

    pub fn new(device: impl Into<String>, interrupt_gpio: u32) -> Self {
        Self {
            device: device.into(),
            oscillator_hz: Self::DEFAULT_OSCILLATOR_HZ,
            interrupt_pin: InterruptPin::Gdo2,
            tx_power: None,
            interrupt_gpio,
            high_gain_gpio: None,
        }
    }

    pub fn effective_tx_power(&self, high_gain: bool) -> u8 {
        self.tx_power
            .unwrap_or(if high_gain { 0x27 } else { 0xC0 })
    }
}

/// Timing of a line interface's listen loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineTiming {
    /// Wait between a failure and the next open attempt.
    pub reconnect_backoff: Duration,
    /// Bound on one blocking read, and thus on stop latency.
    pub read_timeout: Duration,
    /// Pause held under the send lock after each transmit.
    pub post_send_delay: Duration,
    /// Pause after the init commands of a fresh connection.
    pub settle_delay: Duration,
    /// Keep retrying when an open attempt fails.
    pub retry_failed_open: bool,
}

impl LineTiming {
    pub const fn cul() -> Self {
        Self {
            reconnect_backoff: Duration::from_secs(10),
            read_timeout: Duration::from_millis(500),
            post_send_delay: Duration::ZERO,
            settle_delay: Duration::ZERO,
            retry_failed_open: false,
        }
    }

    pub const fn coc() -> Self {
        Self {
            reconnect_backoff: Duration::from_secs(10),
            read_timeout: Duration::from_millis(500),
            post_send_delay: Duration::from_millis(100),
            settle_delay: Duration::from_secs(1),
            retry_failed_open: false,
        }
    }

    pub const fn cunx() -> Self {
        Self {
            reconnect_backoff: Duration::from_secs(1),
            read_timeout: Duration::from_millis(500),
            post_send_delay: Duration::ZERO,
            settle_delay: Duration::ZERO,
            retry_failed_open: true,
        }
    }

    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout.max(Duration::from_millis(1));
        self
    }

    pub fn with_post_send_delay(mut self, delay: Duration) -> Self {
        self.post_send_delay = delay;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{Cc1100Settings, InterfaceSettings, InterruptPin, LineTiming, SerialSettings};
    use std::time::Duration;

    #[test]
    fn per_variant_defaults() {
        assert_eq!(SerialSettings::cul("/dev/ttyACM0").baud_rate, 57_600);
        assert_eq!(SerialSettings::coc("/dev/ttyAMA0").baud_rate, 38_400);
        assert_eq!(LineTiming::cul().reconnect_backoff, Duration::from_secs(10));
        assert_eq!(LineTiming::cunx().reconnect_backoff, Duration::from_secs(1));
        assert!(LineTiming::cunx().retry_failed_open);
        assert_eq!(LineTiming::coc().post_send_delay, Duration::from_millis(100));
    }

    #[test]
    fn interrupt_pin_falls_back_to_gdo2() {
        assert_eq!(InterruptPin::from_number(0), InterruptPin::Gdo0);
        assert_eq!(InterruptPin::from_number(2), InterruptPin::Gdo2);
        assert_eq!(InterruptPin::from_number(5), InterruptPin::Gdo2);
        assert_eq!(InterruptPin::from_number(-1), InterruptPin::Gdo2);
        assert_eq!(InterruptPin::Gdo0.number(), 0);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn stored_interrupt_pin_numbers_fall_back_to_gdo2() {
        let load = |pin: &str| -> Cc1100Settings {
            serde_json::from_str(&format!(
                r#"{{"device":"/dev/spidev0.0","oscillator_hz":26000000,"interrupt_pin":{pin},
                    "tx_power":null,"interrupt_gpio":25,"high_gain_gpio":null}}"#
            ))
            .unwrap()
        };
        assert_eq!(load("5").interrupt_pin, InterruptPin::Gdo2);
        assert_eq!(load("-1").interrupt_pin, InterruptPin::Gdo2);
        assert_eq!(load("0").interrupt_pin, InterruptPin::Gdo0);
        assert_eq!(load(r#""Gdo0""#).interrupt_pin, InterruptPin::Gdo0);

        let mut settings = Cc1100Settings::new("/dev/spidev0.0", 25);
        settings.interrupt_pin = InterruptPin::Gdo0;
        let stored = serde_json::to_value(&settings).unwrap();
        assert_eq!(stored["interrupt_pin"], 0);
    }

    #[test]
    fn tx_power_depends_on_high_gain() {
        let mut s = Cc1100Settings::new("/dev/spidev0.0", 25);
        assert_eq!(s.effective_tx_power(true), 0x27);
        assert_eq!(s.effective_tx_power(false), 0xC0);
        s.tx_power = Some(0x50);
        assert_eq!(s.effective_tx_power(true), 0x50);
    }

    #[test]
    fn stack_prefix_from_position() {
        let s = InterfaceSettings::new("coc").with_stack_position(3);
        assert_eq!(s.stack_prefix().as_str(), "**");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn settings_deserialize_with_defaults() {
        let s: InterfaceSettings =
            serde_json::from_str(r#"{"id":"cul0","verbosity":"debug"}"#).unwrap();
        assert_eq!(s.id, "cul0");
        assert_eq!(s.stack_position, 1);
        assert_eq!(s.verbosity, super::Verbosity::Debug);
    }
}
