use std::sync::Arc;

use acheron_capture::prelude::*;

use super::CaptureError;

/// Audio input paired with a video session.
///
/// The capture cards this crate drives expose no usable audio stream, so [`open`](Self::open)
/// always fails with [`CaptureError::AudioUnsupported`]. The type fixes the lifecycle a working
/// implementation has to follow: opened after video capture starts, closed by
/// [`CaptureSession::stop`](super::CaptureSession::stop), and never retaining frames past an
/// [`AudioSink::publish_audio`] call.
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use acheron::prelude::*;
///
/// let err = AudioCapture::open(0, Arc::new(NullSink)).unwrap_err();
/// assert_eq!(err.code(), "audio_unsupported");
/// ```
pub struct AudioCapture {
    input: u32,
    sink: Arc<dyn AudioSink>,
}

impl AudioCapture {
    pub fn open(input: u32, sink: Arc<dyn AudioSink>) -> Result<Self, CaptureError> {
        let _ = sink;
        tracing::debug!(input, "audio capture requested but not supported");
        Err(CaptureError::AudioUnsupported)
    }

    /// Stop delivering audio to the sink.
    pub fn close(self) {
        drop(self.sink);
        tracing::debug!(input = self.input, "audio capture closed");
    }
}

impl std::fmt::Debug for AudioCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioCapture")
            .field("input", &self.input)
            .finish_non_exhaustive()
    }
}
