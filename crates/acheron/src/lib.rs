#![doc = include_str!("../README.md")]

pub use acheron_capture as capture;
pub use acheron_core as core;

pub use thiserror;

use acheron_capture::prelude::*;

pub mod capture_api;
mod metrics;

use capture_api::{CaptureError, describe_signal, read_input_bounds};

/// One physical input as reported by the driver.
///
/// # Example
/// ```rust
/// use acheron::prelude::*;
///
/// let driver = VirtualDriver::new();
/// let inputs = list_inputs(&driver)?;
/// assert_eq!(inputs[0].description, "DVI 1280x720 60Hz");
/// # Ok::<(), acheron::capture_api::CaptureError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InputInfo {
    pub index: u32,
    /// Current signal, `None` if the query failed.
    pub signal: Option<SignalInfo>,
    pub description: String,
    /// Capture size limits, `None` if the input could not be opened.
    pub bounds: Option<InputBounds>,
}

/// Enumerate every input the driver exposes.
///
/// Only the input count is required; per-input query failures are logged and leave the
/// corresponding fields empty.
pub fn list_inputs(driver: &dyn CaptureDriver) -> Result<Vec<InputInfo>, CaptureError> {
    let count = driver.input_count()?;
    let inputs = (0..count)
        .map(|index| {
            let signal = driver
                .signal_info(index)
                .inspect_err(|err| tracing::warn!(input = index, error = %err, "signal query failed"))
                .ok();
            let bounds = read_input_bounds(driver, index)
                .inspect_err(|err| tracing::warn!(input = index, error = %err, "bounds query failed"))
                .ok();
            InputInfo {
                index,
                signal,
                description: signal.as_ref().map(describe_signal).unwrap_or_default(),
                bounds,
            }
        })
        .collect();
    Ok(inputs)
}

pub mod prelude {
    pub use crate::capture_api::{
        AudioCapture, BufferSnapshot, CallbackDispatcher, CaptureError, CaptureSession,
        CaptureTunables, FrameOutcome, SessionConfig, SessionState, SessionStats, SignalState,
        SignalStateMachine, describe_signal, monotonic_ns, read_input_bounds,
        set_capture_tunables, signal_description,
    };
    pub use crate::metrics::StageMetrics;
    pub use crate::{InputInfo, list_inputs};
    pub use acheron_capture::library;
    pub use acheron_capture::prelude::*;
}
