//! Linux backends: spidev for the CC1100 bus and sysfs for GPIO lines.

use crate::cc1100::{Cc1100Interface, InterruptLine, SpiBus};
use crate::event::EventSender;
use crate::gpio::OutputLine;
use crate::line::CocLines;
use crate::settings::{Cc1100Settings, CocGpio, InterfaceSettings};
use crate::LinkError;
use spidev::{SpiModeFlags, Spidev, SpidevOptions, SpidevTransfer};
use std::io;
use std::time::Duration;
use sysfs_gpio::{Direction, Edge, Pin, PinPoller};

const SPI_SPEED_HZ: u32 = 500_000;

fn gpio_error(e: sysfs_gpio::Error) -> io::Error {
    io::Error::other(e)
}

/// A `/dev/spidevB.C` device in mode 0.
#[derive(Debug)]
pub struct SpidevBus {
    path: String,
    spi: Option<Spidev>,
}

impl SpidevBus {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            spi: None,
        }
    }
}

impl SpiBus for SpidevBus {
    fn open(&mut self) -> io::Result<()> {
        let mut spi = Spidev::open(&self.path)?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(SPI_SPEED_HZ)
            .mode(SpiModeFlags::SPI_MODE_0)
            .build();
        spi.configure(&options)?;
        self.spi = Some(spi);
        Ok(())
    }

    fn close(&mut self) {
        self.spi = None;
    }

    fn is_open(&self) -> bool {
        self.spi.is_some()
    }

    fn transfer(&mut self, data: &mut [u8]) -> io::Result<()> {
        let spi = self
            .spi
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "spi device closed"))?;
        let tx = data.to_vec();
        let mut transfer = SpidevTransfer::read_write(&tx, data);
        spi.transfer(&mut transfer)
    }
}

/// A sysfs GPIO input watched for both edges.
pub struct SysfsInterrupt {
    pin: Pin,
    poller: Option<PinPoller>,
}

impl SysfsInterrupt {
    pub fn new(gpio: u32) -> Self {
        Self {
            pin: Pin::new(u64::from(gpio)),
            poller: None,
        }
    }
}

impl InterruptLine for SysfsInterrupt {
    fn open(&mut self) -> io::Result<()> {
        self.pin.export().map_err(gpio_error)?;
        self.pin.set_direction(Direction::In).map_err(gpio_error)?;
        self.pin.set_edge(Edge::BothEdges).map_err(gpio_error)?;
        self.poller = Some(self.pin.get_poller().map_err(gpio_error)?);
        Ok(())
    }

    fn close(&mut self) {
        self.poller = None;
    }

    fn is_open(&self) -> bool {
        self.poller.is_some()
    }

    fn wait_for_edge(&mut self, timeout: Duration) -> io::Result<Option<bool>> {
        let poller = self
            .poller
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "gpio closed"))?;
        let millis = isize::try_from(timeout.as_millis()).unwrap_or(isize::MAX);
        let value = poller.poll(millis).map_err(gpio_error)?;
        Ok(value.map(|v| v != 0))
    }
}

/// A sysfs GPIO output. Exporting keeps the current level when the pin is
/// already an output.
#[derive(Debug)]
pub struct SysfsOutput {
    pin: Pin,
}

impl SysfsOutput {
    pub fn open(gpio: u32) -> io::Result<Self> {
        let pin = Pin::new(u64::from(gpio));
        pin.export().map_err(gpio_error)?;
        if pin.get_direction().map_err(gpio_error)? != Direction::Out {
            pin.set_direction(Direction::Out).map_err(gpio_error)?;
        }
        Ok(Self { pin })
    }
}

impl OutputLine for SysfsOutput {
    fn get(&mut self) -> io::Result<bool> {
        Ok(self.pin.get_value().map_err(gpio_error)? != 0)
    }

    fn set(&mut self, high: bool) -> io::Result<()> {
        self.pin.set_value(u8::from(high)).map_err(gpio_error)
    }
}

impl CocLines {
    /// Opens the configured reset and enable lines.
    pub fn from_sysfs(gpio: &CocGpio) -> io::Result<Self> {
        let open = |n: Option<u32>| -> io::Result<Option<Box<dyn OutputLine>>> {
            n.map(|n| SysfsOutput::open(n).map(|l| Box::new(l) as Box<dyn OutputLine>))
                .transpose()
        };
        Ok(Self {
            reset: open(gpio.reset)?,
            enable: open(gpio.enable)?,
        })
    }
}

impl Cc1100Interface<SpidevBus, SysfsInterrupt> {
    /// Builds a CC1100 interface on the spidev device and GPIO numbers in
    /// `radio`. Nothing is opened until `start_listening`, except the
    /// high-gain line.
    pub fn linux(
        settings: InterfaceSettings,
        radio: &Cc1100Settings,
        events: EventSender,
    ) -> Result<Self, LinkError> {
        let high_gain = radio
            .high_gain_gpio
            .map(|n| SysfsOutput::open(n).map(|l| Box::new(l) as Box<dyn OutputLine>))
            .transpose()?;
        Self::new(
            settings,
            radio,
            SpidevBus::new(radio.device.clone()),
            SysfsInterrupt::new(radio.interrupt_gpio),
            high_gain,
            events,
        )
    }
}
