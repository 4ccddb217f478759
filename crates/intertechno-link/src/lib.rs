#![allow(async_fn_in_trait)]

pub mod cc1100;
pub mod error;
pub mod event;
pub mod gpio;
pub mod lifecycle;
pub mod line;
#[cfg(all(feature = "linux-hw", target_os = "linux"))]
pub mod linux;
pub mod settings;
pub mod traits;

pub use cc1100::{Cc1100Interface, InterruptLine, SpiBus};
pub use error::LinkError;
pub use event::{event_channel, EventReceiver, EventSender, InterfaceEvent};
pub use gpio::{MemoryLine, OutputLine};
pub use lifecycle::ConnectionState;
pub use line::{CocLines, LineDevice, LineInterface};
pub use settings::{
    Cc1100Settings, CocGpio, InterfaceSettings, InterruptPin, LineTiming, SerialSettings,
    TcpSettings, Verbosity,
};
pub use traits::RadioInterface;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks state that stays consistent even if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
