use acheron_capture::prelude::*;

use super::{
    CaptureError,
    tunables::{MAX_POOL_SIZE, capture_tunables},
};

/// Default input index.
pub const DEFAULT_INPUT: u32 = 0;
/// Default internal (output) width.
pub const DEFAULT_INTERNAL_WIDTH: u32 = 640;
/// Default internal (output) height.
pub const DEFAULT_INTERNAL_HEIGHT: u32 = 480;

/// What a [`CaptureSession`](super::CaptureSession) captures on its next start.
///
/// The internal resolution is the geometry the consumer receives; it stays fixed for a started
/// session whatever the physical signal does.
///
/// # Example
/// ```rust
/// use acheron::prelude::*;
///
/// let config = SessionConfig::default()
///     .input(1)
///     .internal_size(1280, 720)
///     .pixel_format(PixelFormat::Yuy2);
/// assert!(config.validate().is_ok());
/// assert!(SessionConfig::default().internal_size(0, 720).validate().is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SessionConfig {
    pub input: u32,
    pub internal_width: u32,
    pub internal_height: u32,
    pub pool_size: usize,
    pub pixel_format: PixelFormat,
    /// Frames the driver may drop between deliveries.
    pub frame_dropping: u32,
    pub capture_audio: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let tunables = capture_tunables();
        Self {
            input: DEFAULT_INPUT,
            internal_width: DEFAULT_INTERNAL_WIDTH,
            internal_height: DEFAULT_INTERNAL_HEIGHT,
            pool_size: tunables.pool_size,
            pixel_format: PixelFormat::default(),
            frame_dropping: tunables.frame_dropping,
            capture_audio: false,
        }
    }
}

impl SessionConfig {
    pub fn input(mut self, input: u32) -> Self {
        self.input = input;
        self
    }

    pub fn internal_size(mut self, width: u32, height: u32) -> Self {
        self.internal_width = width;
        self.internal_height = height;
        self
    }

    pub fn pool_size(mut self, count: usize) -> Self {
        self.pool_size = count;
        self
    }

    pub fn pixel_format(mut self, format: PixelFormat) -> Self {
        self.pixel_format = format;
        self
    }

    pub fn frame_dropping(mut self, frames: u32) -> Self {
        self.frame_dropping = frames;
        self
    }

    pub fn capture_audio(mut self, enable: bool) -> Self {
        self.capture_audio = enable;
        self
    }

    /// Reject geometry and pool sizes no session can start with.
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.internal_width == 0 || self.internal_height == 0 {
            return Err(CaptureError::Configuration(format!(
                "internal size {}x{} must be positive",
                self.internal_width, self.internal_height
            )));
        }
        if !(1..=MAX_POOL_SIZE).contains(&self.pool_size) {
            return Err(CaptureError::Configuration(format!(
                "pool size {} outside 1..={MAX_POOL_SIZE}",
                self.pool_size
            )));
        }
        let res = Resolution::new(self.internal_width, self.internal_height);
        if res.and_then(|r| self.pixel_format.descriptor().frame_size(r)).is_none() {
            return Err(CaptureError::Configuration(format!(
                "internal size {}x{} overflows",
                self.internal_width, self.internal_height
            )));
        }
        Ok(())
    }

    /// Range-limit the internal size to what the input supports.
    pub fn clamp_to(mut self, bounds: &InputBounds) -> Self {
        let (width, height) = bounds.clamp(self.internal_width, self.internal_height);
        self.internal_width = width;
        self.internal_height = height;
        self
    }
}
