//! Process-wide driver library handle.
//!
//! The vendor library is loaded once per process and shared by every capture session. Hosts
//! install it at load time and shut it down at unload; sessions look it up when they start.
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::CaptureDriver;

static LIBRARY: OnceLock<Mutex<Option<Arc<dyn CaptureDriver>>>> = OnceLock::new();

fn slot() -> &'static Mutex<Option<Arc<dyn CaptureDriver>>> {
    LIBRARY.get_or_init(|| Mutex::new(None))
}

/// Make `driver` the process-wide library, returning the one it replaced.
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use acheron_capture::{library, prelude::*};
///
/// library::install(Arc::new(VirtualDriver::new()));
/// assert!(library::driver().is_some());
/// library::shutdown();
/// assert!(library::driver().is_none());
/// ```
pub fn install(driver: Arc<dyn CaptureDriver>) -> Option<Arc<dyn CaptureDriver>> {
    let previous = slot().lock().replace(driver);
    tracing::info!(replaced = previous.is_some(), "capture driver library installed");
    previous
}

/// Currently installed library, if any.
pub fn driver() -> Option<Arc<dyn CaptureDriver>> {
    slot().lock().clone()
}

/// Forget the installed library.
///
/// Sessions that already hold the driver keep it alive until they are dropped.
pub fn shutdown() -> Option<Arc<dyn CaptureDriver>> {
    let previous = LIBRARY.get().and_then(|lock| lock.lock().take());
    if previous.is_some() {
        tracing::info!("capture driver library shut down");
    }
    previous
}
