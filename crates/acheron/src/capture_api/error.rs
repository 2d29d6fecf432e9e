use acheron_capture::prelude::*;

/// Errors returned by session control calls.
///
/// Driver callbacks never produce these; see [`FrameOutcome`](super::FrameOutcome) for what a
/// frame notification resolves to.
///
/// # Example
/// ```rust
/// use acheron::prelude::*;
///
/// let err = CaptureError::from(DriverError::new(DriverOp::OpenInput, 0x11));
/// assert_eq!(err.code(), "driver_call_failed");
/// assert!(err.retryable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("buffer allocation failed: {0}")]
    Allocation(#[from] AllocationError),
    #[error("driver call failed: {0}")]
    DriverCallFailed(#[from] DriverError),
    #[error("no buffer could be chained to the driver ({0})")]
    CaptureDegraded(DriverError),
    #[error("operation not valid while the session is {0}")]
    InvalidState(&'static str),
    #[error("audio capture is not supported by this driver")]
    AudioUnsupported,
    #[error("no capture driver library is installed")]
    NoDriver,
}

impl CaptureError {
    /// Stable string code for error classification.
    pub fn code(&self) -> &'static str {
        match self {
            CaptureError::Configuration(_) => "invalid_config",
            CaptureError::Allocation(_) => "allocation_failed",
            CaptureError::DriverCallFailed(_) => "driver_call_failed",
            CaptureError::CaptureDegraded(_) => "capture_degraded",
            CaptureError::InvalidState(_) => "invalid_state",
            CaptureError::AudioUnsupported => "audio_unsupported",
            CaptureError::NoDriver => "no_driver",
        }
    }

    /// Whether the error may succeed when retried.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            CaptureError::DriverCallFailed(_)
                | CaptureError::CaptureDegraded(_)
                | CaptureError::InvalidState(_)
        )
    }
}

/// What a frame-captured notification resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Published to the sink and chained back to the driver.
    Published,
    /// Published, but the driver refused the buffer back; it stays out of rotation.
    ResubmitFailed,
    /// The pointer names no buffer of the current pool, or that buffer was not chained.
    Stale,
    /// The session is not capturing; nothing was touched.
    NotCapturing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_final() {
        let err = CaptureError::Configuration("width must be positive".into());
        assert_eq!(err.code(), "invalid_config");
        assert!(!err.retryable());
        assert!(!CaptureError::Allocation(AllocationError::Empty).retryable());
    }

    #[test]
    fn driver_errors_keep_their_operation() {
        let err: CaptureError = DriverError::new(DriverOp::StartCapture, 0xbeef).into();
        assert_eq!(
            err.to_string(),
            "driver call failed: start_capture failed with code 0x0000BEEF"
        );
    }
}
