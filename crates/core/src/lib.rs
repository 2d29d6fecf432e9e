#![doc = include_str!("../README.md")]

pub mod buffer;
pub mod descriptor;
pub mod format;
pub mod metrics;
pub mod queue;

pub mod prelude {
    pub use crate::{
        buffer::{AllocationError, DriverPtr, FrameStorage, STORAGE_ALIGN},
        descriptor::{BufferDescriptor, Compression, FrameDescriptor, PIXELS_PER_METER},
        format::{FourCc, PixelFormat, Resolution},
        metrics::{CaptureCounters, CounterSnapshot},
        queue::{FrameRx, FrameTx, PushOutcome, RecvOutcome, frame_queue},
    };
}
