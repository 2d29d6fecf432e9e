//! Capture sessions, their configuration and the driver callback plumbing.
//!
//! Most users will interact with `CaptureSession` and `SessionConfig`.
//!
//! # Example
//! ```rust
//! use std::sync::Arc;
//! use acheron::prelude::*;
//!
//! let driver = Arc::new(VirtualDriver::new());
//! let bounds = read_input_bounds(driver.as_ref(), 0)?;
//! let config = SessionConfig::default().internal_size(8192, 480).clamp_to(&bounds);
//! let session = CaptureSession::new(driver, Arc::new(NullSink), config);
//! session.start()?;
//! assert_eq!(session.width(), 4096);
//! # Ok::<(), acheron::capture_api::CaptureError>(())
//! ```
use acheron_capture::prelude::*;

mod audio;
mod config;
pub mod description;
mod dispatch;
mod error;
mod session;
mod signal;
mod tunables;

pub use audio::AudioCapture;
pub use config::{DEFAULT_INPUT, DEFAULT_INTERNAL_HEIGHT, DEFAULT_INTERNAL_WIDTH, SessionConfig};
pub use description::{describe_signal, signal_description};
pub use dispatch::CallbackDispatcher;
pub use error::{CaptureError, FrameOutcome};
pub use session::{BufferSnapshot, CaptureSession, SessionState, SessionStats, monotonic_ns};
pub use signal::{SignalState, SignalStateMachine};
pub use tunables::{
    CaptureTunables, DEFAULT_FRAME_DROPPING, DEFAULT_POOL_SIZE, MAX_POOL_SIZE,
    set_capture_tunables,
};

/// Capture size limits of `input`, read by briefly opening it.
///
/// The input is closed again even when the bounds query fails.
pub fn read_input_bounds(driver: &dyn CaptureDriver, input: u32) -> Result<InputBounds, CaptureError> {
    let handle = driver.open_input(input)?;
    let bounds = driver.input_bounds(handle);
    if let Err(err) = driver.close_input(handle) {
        tracing::warn!(input, error = %err, "could not close input after reading bounds");
    }
    Ok(bounds?)
}
