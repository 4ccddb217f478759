use super::registers::{
    RegisterConfig, Strobe, CHIP_RDYN, CRC_OK, FIFO, FSTEST, FSTEST_VALUE, LQI, PATABLE,
    READ_BURST, READ_SINGLE, TEST1, TEST1_VALUE, TEST2, TEST2_VALUE, WRITE_BURST,
};
use super::SpiBus;
use crate::LinkError;
use std::thread;
use std::time::Duration;

const READY_RETRIES: usize = 5;
const READY_RETRY_DELAY: Duration = Duration::from_micros(20);
const RESET_DELAY: Duration = Duration::from_micros(70);

/// Command and register protocol of one CC1100 on an [`SpiBus`].
///
/// Every operation fails with [`LinkError::NotOpen`] while the bus is closed.
#[derive(Debug)]
pub struct Cc1100Chip<S> {
    spi: S,
}

impl<S: SpiBus> Cc1100Chip<S> {
    pub fn new(spi: S) -> Self {
        Self { spi }
    }

    pub fn spi(&self) -> &S {
        &self.spi
    }

    pub fn spi_mut(&mut self) -> &mut S {
        &mut self.spi
    }

    pub fn open(&mut self) -> Result<(), LinkError> {
        if !self.spi.is_open() {
            self.spi.open()?;
        }
        Ok(())
    }

    pub fn close(&mut self) {
        if self.spi.is_open() {
            self.spi.close();
        }
    }

    pub fn is_open(&self) -> bool {
        self.spi.is_open()
    }

    fn require_open(&self) -> Result<(), LinkError> {
        if self.spi.is_open() {
            Ok(())
        } else {
            Err(LinkError::NotOpen)
        }
    }

    /// Runs `frame` until the status byte reports the chip ready.
    fn transfer_ready(&mut self, frame: &mut [u8]) -> Result<(), LinkError> {
        self.require_open()?;
        let template = frame.to_vec();
        for attempt in 0..READY_RETRIES {
            if attempt > 0 {
                frame.copy_from_slice(&template);
                thread::sleep(READY_RETRY_DELAY);
            }
            self.spi.transfer(frame)?;
            if frame[0] & CHIP_RDYN == 0 {
                return Ok(());
            }
        }
        Err(LinkError::ChipNotReady {
            opcode: template[0],
        })
    }

    /// Issues a command strobe and returns the status byte.
    pub fn strobe(&mut self, strobe: Strobe) -> Result<u8, LinkError> {
        let mut frame = [strobe.opcode()];
        self.transfer_ready(&mut frame)?;
        Ok(frame[0])
    }

    pub fn read_register(&mut self, register: u8) -> Result<u8, LinkError> {
        let mut frame = [register | READ_SINGLE, 0];
        self.transfer_ready(&mut frame)?;
        Ok(frame[1])
    }

    /// Reads `count` bytes starting at `register` (or from the FIFO).
    pub fn read_burst(&mut self, register: u8, count: usize) -> Result<Vec<u8>, LinkError> {
        let mut frame = vec![0u8; count + 1];
        frame[0] = register | READ_BURST;
        self.transfer_ready(&mut frame)?;
        frame.remove(0);
        Ok(frame)
    }

    /// Writes one register, optionally reading it back.
    pub fn write_register(&mut self, register: u8, value: u8, verify: bool) -> Result<(), LinkError> {
        self.require_open()?;
        let mut frame = [register, value];
        self.spi.transfer(&mut frame)?;
        if frame[0] & CHIP_RDYN != 0 || frame[1] & CHIP_RDYN != 0 {
            return Err(LinkError::ChipNotReady { opcode: register });
        }
        if verify {
            let mut frame = [register | READ_SINGLE, 0];
            self.spi.transfer(&mut frame)?;
            if frame[1] != value {
                return Err(LinkError::RegisterVerify {
                    register,
                    expected: value,
                    actual: frame[1],
                });
            }
        }
        Ok(())
    }

    pub fn write_burst(&mut self, register: u8, values: &[u8]) -> Result<(), LinkError> {
        self.require_open()?;
        let mut frame = Vec::with_capacity(values.len() + 1);
        frame.push(register | WRITE_BURST);
        frame.extend_from_slice(values);
        self.spi.transfer(&mut frame)?;
        if frame[0] & CHIP_RDYN != 0 {
            return Err(LinkError::ChipNotReady { opcode: register });
        }
        Ok(())
    }

    pub fn reset(&mut self) -> Result<(), LinkError> {
        self.strobe(Strobe::Sres)?;
        thread::sleep(RESET_DELAY);
        Ok(())
    }

    /// Resets the chip and writes `config` plus the test and power registers,
    /// verifying each. Any failure closes the bus.
    pub fn init(&mut self, config: &RegisterConfig, tx_power: u8) -> Result<(), LinkError> {
        let result = self.program(config, tx_power);
        if let Err(e) = &result {
            log::error!("CC1100 initialization failed: {e}");
            self.close();
        }
        result
    }

    fn program(&mut self, config: &RegisterConfig, tx_power: u8) -> Result<(), LinkError> {
        self.reset()?;
        for &(register, value) in config.entries() {
            self.write_register(register, value, true)?;
        }
        self.write_register(FSTEST, FSTEST_VALUE, true)?;
        self.write_register(TEST2, TEST2_VALUE, true)?;
        self.write_register(TEST1, TEST1_VALUE, true)?;
        self.write_register(PATABLE, tx_power, true)?;
        self.strobe(Strobe::Sfrx)?;
        thread::sleep(READY_RETRY_DELAY);
        Ok(())
    }

    pub fn enable_rx(&mut self, flush: bool) -> Result<(), LinkError> {
        if flush {
            self.strobe(Strobe::Sfrx)?;
        }
        self.strobe(Strobe::Srx)?;
        Ok(())
    }

    /// Whether the frame in the RX FIFO passed its CRC.
    pub fn crc_ok(&mut self) -> Result<bool, LinkError> {
        let status = self.read_burst(LQI, 1)?;
        Ok(status.first().is_some_and(|b| b & CRC_OK != 0))
    }

    /// Reads the length byte, then that many payload bytes plus the trailing
    /// status byte.
    pub fn read_fifo_frame(&mut self) -> Result<Vec<u8>, LinkError> {
        let len = self.read_register(FIFO)?;
        let mut frame = Vec::with_capacity(usize::from(len) + 2);
        frame.push(len);
        frame.extend(self.read_burst(FIFO, usize::from(len) + 1)?);
        Ok(frame)
    }

    /// Loads the TX FIFO and starts transmission.
    pub fn transmit(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.strobe(Strobe::Sidle)?;
        self.strobe(Strobe::Sftx)?;
        self.write_burst(FIFO, bytes)?;
        self.strobe(Strobe::Stx)?;
        Ok(())
    }

    /// Returns to receive after a transmission completed.
    pub fn end_transmit(&mut self) -> Result<(), LinkError> {
        self.strobe(Strobe::Sidle)?;
        self.strobe(Strobe::Sfrx)?;
        self.strobe(Strobe::Srx)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Cc1100Chip;
    use crate::cc1100::registers::{RegisterConfig, Strobe, FIFO};
    use crate::cc1100::SpiBus;
    use crate::settings::InterruptPin;
    use crate::LinkError;
    use std::io;

    /// Register file with scripted faults.
    struct FakeSpi {
        open: bool,
        registers: Vec<u8>,
        log: Vec<Vec<u8>>,
        busy_transfers: usize,
        corrupt_register: Option<u8>,
        fifo: Vec<u8>,
    }

    impl Default for FakeSpi {
        fn default() -> Self {
            Self {
                open: false,
                registers: vec![0; 0x40],
                log: Vec::new(),
                busy_transfers: 0,
                corrupt_register: None,
                fifo: Vec::new(),
            }
        }
    }

    impl SpiBus for FakeSpi {
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

        fn transfer(&mut self, data: &mut [u8]) -> io::Result<()> {
            self.log.push(data.to_vec());
            let header = data[0];
            let busy = if self.busy_transfers > 0 {
                self.busy_transfers -= 1;
                0x80
            } else {
                0x00
            };
            let register = header & 0x3F;
            if data.len() == 1 {
                data[0] = busy;
            } else if register == FIFO && header & 0x80 != 0 {
                data[0] = busy;
                for b in data[1..].iter_mut() {
                    *b = if self.fifo.is_empty() { 0 } else { self.fifo.remove(0) };
                }
            } else if header & 0x80 != 0 {
                data[0] = busy;
                for (i, b) in data[1..].iter_mut().enumerate() {
                    *b = self.registers[usize::from(register) + i];
                }
            } else {
                let value = data[1];
                self.registers[usize::from(register)] = match self.corrupt_register {
                    Some(r) if r == register => value ^ 0x01,
                    _ => value,
                };
                data[0] = busy;
                data[1] = 0;
            }
            Ok(())
        }
    }

    fn config() -> RegisterConfig {
        RegisterConfig::for_oscillator(26_000_000, InterruptPin::Gdo2).unwrap()
    }

    #[test]
    fn strobe_retries_while_chip_not_ready() {
        let mut chip = Cc1100Chip::new(FakeSpi {
            open: true,
            busy_transfers: 2,
            ..FakeSpi::default()
        });
        assert_eq!(chip.strobe(Strobe::Sidle).unwrap(), 0);
        assert_eq!(chip.spi().log.len(), 3);
        assert!(chip.spi().log.iter().all(|f| f == &[0x36]));
    }

    #[test]
    fn strobe_gives_up_after_five_attempts() {
        let mut chip = Cc1100Chip::new(FakeSpi {
            open: true,
            busy_transfers: 10,
            ..FakeSpi::default()
        });
        assert!(matches!(
            chip.strobe(Strobe::Srx),
            Err(LinkError::ChipNotReady { opcode: 0x34 })
        ));
        assert_eq!(chip.spi().log.len(), 5);
    }

    #[test]
    fn init_writes_table_then_extras() {
        let mut chip = Cc1100Chip::new(FakeSpi {
            open: true,
            ..FakeSpi::default()
        });
        chip.init(&config(), 0xC0).unwrap();
        let regs = &chip.spi().registers;
        assert_eq!(regs[0x00], 0x46);
        assert_eq!(regs[0x0E], 0xB0);
        assert_eq!(regs[0x29], 0x59);
        assert_eq!(regs[0x2C], 0x81);
        assert_eq!(regs[0x2D], 0x35);
        assert_eq!(regs[0x3E], 0xC0);
        assert_eq!(chip.spi().log.first().unwrap(), &vec![0x30]);
        assert_eq!(chip.spi().log.last().unwrap(), &vec![0x3A]);
    }

    #[test]
    fn verify_mismatch_closes_bus_without_further_strobes() {
        let mut chip = Cc1100Chip::new(FakeSpi {
            open: true,
            corrupt_register: Some(0x10),
            ..FakeSpi::default()
        });
        let err = chip.init(&config(), 0xC0).unwrap_err();
        assert!(matches!(
            err,
            LinkError::RegisterVerify {
                register: 0x10,
                expected: 0x55,
                actual: 0x54
            }
        ));
        assert!(!chip.is_open());
        let last = chip.spi().log.last().unwrap();
        assert_eq!(last, &vec![0x90, 0]);
        let strobes = chip.spi().log.iter().filter(|f| f.len() == 1).count();
        assert_eq!(strobes, 1);
        assert!(matches!(chip.strobe(Strobe::Srx), Err(LinkError::NotOpen)));
    }

    #[test]
    fn fifo_frame_includes_length_and_status() {
        let mut chip = Cc1100Chip::new(FakeSpi {
            open: true,
            fifo: vec![3, 0xAA, 0xBB, 0xCC, 0x2D],
            ..FakeSpi::default()
        });
        assert_eq!(chip.read_fifo_frame().unwrap(), vec![3, 0xAA, 0xBB, 0xCC, 0x2D]);
    }

    #[test]
    fn transmit_sequence() {
        let mut chip = Cc1100Chip::new(FakeSpi {
            open: true,
            ..FakeSpi::default()
        });
        chip.transmit(&[0x12, 0xF0]).unwrap();
        assert_eq!(
            chip.spi().log,
            vec![vec![0x36], vec![0x3B], vec![0x7F, 0x12, 0xF0], vec![0x35]]
        );
    }
}
