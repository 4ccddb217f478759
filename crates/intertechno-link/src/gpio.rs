use std::io;
use std::sync::{Arc, Mutex};

/// A GPIO line driven by this crate (COC reset/enable, CC1100 high gain).
pub trait OutputLine: Send {
    fn get(&mut self) -> io::Result<bool>;
    fn set(&mut self, high: bool) -> io::Result<()>;
}

/// Drives `line` high if it currently reads low.
pub fn ensure_high(line: &mut dyn OutputLine) -> io::Result<()> {
    if !line.get()? {
        line.set(true)?;
    }
    Ok(())
}

/// Output line that only remembers its level. Useful for boards without the
/// line wired and in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryLine {
    level: bool,
    history: Vec<bool>,
}

impl MemoryLine {
    pub fn new(level: bool) -> Self {
        Self {
            level,
            history: Vec::new(),
        }
    }

    /// Every level written with [`OutputLine::set`], in order.
    pub fn history(&self) -> &[bool] {
        &self.history
    }
}

impl OutputLine for MemoryLine {
    fn get(&mut self) -> io::Result<bool> {
        Ok(self.level)
    }

    fn set(&mut self, high: bool) -> io::Result<()> {
        self.level = high;
        self.history.push(high);
        Ok(())
    }
}

/// Lets a caller keep a handle on a line it hands to an interface.
impl<T: OutputLine> OutputLine for Arc<Mutex<T>> {
    fn get(&mut self) -> io::Result<bool> {
        self.lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "gpio lock poisoned"))?
            .get()
    }

    fn set(&mut self, high: bool) -> io::Result<()> {
        self.lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "gpio lock poisoned"))?
            .set(high)
    }
}
