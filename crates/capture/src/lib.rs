#![doc = include_str!("../README.md")]

use std::{fmt, sync::Arc};

use acheron_core::prelude::*;

/// Opaque handle for an opened driver input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputHandle(u64);

impl InputHandle {
    /// Wrap a raw driver handle value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw driver handle value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Kind of signal the driver detects on an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SignalType {
    NoSignal,
    OutOfRange,
    Vga,
    Dvi,
    DualLinkDvi,
    Sdi,
    Composite,
    SVideo,
    YPbPr,
    /// A connected signal of a type this crate has no name for.
    Unknown,
}

impl SignalType {
    /// Connector label for connected signals; `None` for no-signal / out-of-range.
    pub fn label(self) -> Option<&'static str> {
        match self {
            SignalType::NoSignal | SignalType::OutOfRange => None,
            SignalType::Vga => Some("VGA"),
            SignalType::Dvi => Some("DVI"),
            SignalType::DualLinkDvi => Some("DVI-DL"),
            SignalType::Sdi => Some("SDI"),
            SignalType::Composite => Some("Composite"),
            SignalType::SVideo => Some("S-Video"),
            SignalType::YPbPr => Some("YPbPr"),
            SignalType::Unknown => Some("Unknown"),
        }
    }
}

/// Answer to the synchronous "current signal on input" query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SignalInfo {
    pub kind: SignalType,
    pub width: u32,
    pub height: u32,
    /// Vertical refresh in millihertz (60 Hz = 60_000).
    pub refresh_millihz: u32,
}

impl SignalInfo {
    /// A "nothing connected" answer.
    pub const fn none() -> Self {
        Self {
            kind: SignalType::NoSignal,
            width: 0,
            height: 0,
            refresh_millihz: 0,
        }
    }
}

/// Timing reported alongside a mode-changed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeInfo {
    pub width: u32,
    pub height: u32,
    pub refresh_millihz: u32,
}

/// Clock measurements reported alongside an invalid-signal notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignalClocks {
    pub horizontal: u32,
    pub vertical: u32,
}

/// Capture size limits of one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InputBounds {
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
}

impl InputBounds {
    /// Clamp `(width, height)` into these bounds.
    pub fn clamp(&self, width: u32, height: u32) -> (u32, u32) {
        (
            width.clamp(self.min_width, self.max_width.max(self.min_width)),
            height.clamp(self.min_height, self.max_height.max(self.min_height)),
        )
    }

    /// Whether `(width, height)` is inside these bounds.
    pub fn contains(&self, width: u32, height: u32) -> bool {
        (self.min_width..=self.max_width).contains(&width)
            && (self.min_height..=self.max_height).contains(&height)
    }
}

/// The four callback slots a driver input exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackSlot {
    FrameCaptured,
    ModeChanged,
    NoSignal,
    InvalidSignal,
}

impl CallbackSlot {
    /// Registration order used when starting a session.
    pub const ALL: [CallbackSlot; 4] = [
        CallbackSlot::FrameCaptured,
        CallbackSlot::ModeChanged,
        CallbackSlot::NoSignal,
        CallbackSlot::InvalidSignal,
    ];

    fn name(self) -> &'static str {
        match self {
            CallbackSlot::FrameCaptured => "frame_captured",
            CallbackSlot::ModeChanged => "mode_changed",
            CallbackSlot::NoSignal => "no_signal",
            CallbackSlot::InvalidSignal => "invalid_signal",
        }
    }
}

/// Driver entry points, used to name the call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverOp {
    InputCount,
    SignalInfo,
    OpenInput,
    CloseInput,
    SetFrameDropping,
    EnableCropping,
    SetCallback(CallbackSlot),
    ChainOutputBuffer,
    UseOutputBuffers,
    StartCapture,
    StopCapture,
    DefaultCaptureSize,
    SetCaptureSize,
    InputBounds,
}

impl fmt::Display for DriverOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DriverOp::InputCount => "input_count",
            DriverOp::SignalInfo => "signal_info",
            DriverOp::OpenInput => "open_input",
            DriverOp::CloseInput => "close_input",
            DriverOp::SetFrameDropping => "set_frame_dropping",
            DriverOp::EnableCropping => "enable_cropping",
            DriverOp::SetCallback(slot) => return write!(f, "set_callback({})", slot.name()),
            DriverOp::ChainOutputBuffer => "chain_output_buffer",
            DriverOp::UseOutputBuffers => "use_output_buffers",
            DriverOp::StartCapture => "start_capture",
            DriverOp::StopCapture => "stop_capture",
            DriverOp::DefaultCaptureSize => "default_capture_size",
            DriverOp::SetCaptureSize => "set_capture_size",
            DriverOp::InputBounds => "input_bounds",
        };
        f.write_str(name)
    }
}

/// A driver call returned a non-success code.
///
/// # Example
/// ```rust
/// use acheron_capture::prelude::*;
///
/// let err = DriverError::new(DriverOp::OpenInput, 0x1100_0003);
/// assert_eq!(err.to_string(), "open_input failed with code 0x11000003");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{op} failed with code 0x{code:08X}")]
pub struct DriverError {
    pub op: DriverOp,
    pub code: u32,
}

impl DriverError {
    pub const fn new(op: DriverOp, code: u32) -> Self {
        Self { op, code }
    }
}

/// Receiver of driver notifications for one opened input.
///
/// Methods run on driver-owned threads, possibly concurrently with each other and with the
/// control thread. They must not panic and must not block on the driver.
pub trait DriverEvents: Send + Sync {
    /// The driver finished writing a frame into the chained buffer at `buffer`.
    fn frame_captured(&self, handle: InputHandle, buffer: DriverPtr);

    /// The physical input changed resolution or timing.
    fn mode_changed(&self, handle: InputHandle, mode: ModeInfo);

    /// The signal disappeared.
    fn no_signal(&self, handle: InputHandle);

    /// A signal is present but cannot be captured.
    fn invalid_signal(&self, handle: InputHandle, clocks: SignalClocks);
}

/// Contract of the vendor capture driver.
///
/// Every call is synchronous. Implementations wrap the vendor library and perform the
/// user-data-pointer to [`DriverEvents`] recovery themselves; callers never see raw context
/// pointers.
pub trait CaptureDriver: Send + Sync {
    /// Number of physical inputs.
    fn input_count(&self) -> Result<u32, DriverError>;

    /// Current signal on `input`; does not require the input to be open.
    fn signal_info(&self, input: u32) -> Result<SignalInfo, DriverError>;

    fn open_input(&self, input: u32) -> Result<InputHandle, DriverError>;

    /// Close an input and drop every callback registered on it.
    ///
    /// Once this returns no callback for `handle` is running or will run.
    fn close_input(&self, handle: InputHandle) -> Result<(), DriverError>;

    /// Number of frames the driver may drop between deliveries (0 = deliver all).
    fn set_frame_dropping(&self, handle: InputHandle, frames: u32) -> Result<(), DriverError>;

    fn enable_cropping(&self, handle: InputHandle, enable: bool) -> Result<(), DriverError>;

    fn set_callback(
        &self,
        handle: InputHandle,
        slot: CallbackSlot,
        events: Arc<dyn DriverEvents>,
    ) -> Result<(), DriverError>;

    /// Queue `buffer` as a future write target.
    ///
    /// The memory must stay valid until the buffer is reported through `frame_captured` or
    /// the input is closed.
    fn chain_buffer(
        &self,
        handle: InputHandle,
        descriptor: &BufferDescriptor,
        buffer: DriverPtr,
    ) -> Result<(), DriverError>;

    /// Switch between chained caller buffers and driver-internal buffers.
    fn use_output_buffers(&self, handle: InputHandle, enable: bool) -> Result<(), DriverError>;

    fn start_capture(&self, handle: InputHandle) -> Result<(), DriverError>;

    /// Stop capture; blocks until the hardware stopped writing and in-flight callbacks returned.
    fn stop_capture(&self, handle: InputHandle) -> Result<(), DriverError>;

    /// Capture size the driver negotiated for the current signal.
    fn default_capture_size(&self, handle: InputHandle) -> Result<(u32, u32), DriverError>;

    fn set_capture_size(
        &self,
        handle: InputHandle,
        width: u32,
        height: u32,
    ) -> Result<(), DriverError>;

    fn input_bounds(&self, handle: InputHandle) -> Result<InputBounds, DriverError>;
}

pub mod frame;
pub mod library;
pub mod pool;
pub mod sink;
pub mod virtual_backend;

pub mod prelude {
    pub use crate::{
        CallbackSlot, CaptureDriver, DriverError, DriverEvents, DriverOp, InputBounds,
        InputHandle, ModeInfo, SignalClocks, SignalInfo, SignalType,
        frame::{BufferState, FrameBuffer},
        pool::BufferPool,
        sink::{AudioFrame, AudioSink, NullSink, OwnedFrame, QueueSink, VideoFrame, VideoSink},
        virtual_backend::{VirtualDriver, VirtualInput, VirtualStream},
    };
    pub use acheron_core::prelude::*;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_clamp_into_range() {
        let bounds = InputBounds {
            min_width: 64,
            max_width: 1920,
            min_height: 48,
            max_height: 1200,
        };
        assert_eq!(bounds.clamp(4096, 10), (1920, 48));
        assert!(bounds.contains(640, 480));
        assert!(!bounds.contains(640, 2000));
    }

    #[test]
    fn callback_ops_name_their_slot() {
        let op = DriverOp::SetCallback(CallbackSlot::NoSignal);
        assert_eq!(op.to_string(), "set_callback(no_signal)");
    }

    #[test]
    fn only_connected_signals_have_labels() {
        assert_eq!(SignalType::NoSignal.label(), None);
        assert_eq!(SignalType::OutOfRange.label(), None);
        assert_eq!(SignalType::DualLinkDvi.label(), Some("DVI-DL"));
    }
}
