//! One driver-addressable capture buffer.
use acheron_core::prelude::*;

use crate::{CaptureDriver, DriverError, InputHandle, sink::VideoFrame};

/// Who may touch a [`FrameBuffer`]'s bytes right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Owned by the pool only; the driver does not know this buffer (fresh, or its last
    /// re-submission failed).
    Idle,
    /// Chained to the driver, which may write into it at any time.
    Submitted,
    /// Handed back by the driver and being read by the consumer.
    Publishing,
}

/// Fixed-size frame memory plus the descriptor the driver needs to fill it.
///
/// # Example
/// ```rust
/// use acheron_capture::prelude::*;
///
/// let frame = FrameBuffer::new(640, 480, PixelFormat::Rgb32).unwrap();
/// assert_eq!(frame.len(), 1_228_800);
/// assert_eq!(frame.stride(), 2_560);
/// assert_eq!(frame.state(), BufferState::Idle);
/// ```
#[derive(Debug)]
pub struct FrameBuffer {
    descriptor: BufferDescriptor,
    storage: FrameStorage,
    update_count: u64,
    timestamp_ns: u64,
    state: BufferState,
}

impl FrameBuffer {
    /// Allocate a zeroed buffer of `width * height * bpp / 8` bytes.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Result<Self, AllocationError> {
        let resolution =
            Resolution::new(width, height).ok_or(AllocationError::InvalidGeometry { width, height })?;
        let descriptor = BufferDescriptor::new(resolution, format)?;
        let storage = FrameStorage::zeroed(descriptor.image_size)?;
        Ok(Self {
            descriptor,
            storage,
            update_count: 0,
            timestamp_ns: 0,
            state: BufferState::Idle,
        })
    }

    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    pub fn resolution(&self) -> Resolution {
        self.descriptor.resolution
    }

    pub fn format(&self) -> PixelFormat {
        self.descriptor.format
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.descriptor.stride
    }

    /// Capacity of the backing storage in bytes.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Number of frames the driver has completed into this buffer.
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Capture timestamp of the most recent completion.
    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    /// Address the driver writes into and reports back.
    pub fn driver_ptr(&self) -> DriverPtr {
        self.storage.driver_ptr()
    }

    /// Whether a completion for `ptr` refers to this buffer.
    pub fn matches_driver_pointer(&self, ptr: DriverPtr) -> bool {
        self.storage.matches(ptr)
    }

    /// Chain this buffer to the driver as a future write target.
    ///
    /// On failure the buffer drops back to [`BufferState::Idle`] and stays out of rotation.
    pub fn submit_to_driver(
        &mut self,
        driver: &dyn CaptureDriver,
        handle: InputHandle,
    ) -> Result<(), DriverError> {
        match driver.chain_buffer(handle, &self.descriptor, self.driver_ptr()) {
            Ok(()) => {
                self.state = BufferState::Submitted;
                Ok(())
            }
            Err(err) => {
                self.state = BufferState::Idle;
                tracing::warn!(
                    buffer = ?self.driver_ptr(),
                    error = %err,
                    "could not chain output buffer"
                );
                Err(err)
            }
        }
    }

    /// Take the buffer back from the driver after it reported a completed frame.
    ///
    /// Returns `false` (and changes nothing) unless the buffer was submitted.
    pub fn complete(&mut self, timestamp_ns: u64) -> bool {
        if self.state != BufferState::Submitted {
            return false;
        }
        self.update_count += 1;
        self.timestamp_ns = timestamp_ns;
        self.state = BufferState::Publishing;
        true
    }

    /// Read-only view of the pixels; only available between [`complete`](Self::complete) and
    /// the next submission.
    pub fn view(&self) -> Option<&[u8]> {
        if self.state != BufferState::Publishing {
            return None;
        }
        // SAFETY: in `Publishing` the driver has handed the buffer back and it is not chained,
        // so nothing writes to it until `submit_to_driver` is called, which needs `&mut self`.
        Some(unsafe { self.storage.as_slice() })
    }

    /// Consumer-facing frame for the current completion.
    pub fn video_frame(&self) -> Option<VideoFrame<'_>> {
        let data = self.view()?;
        Some(VideoFrame {
            width: self.descriptor.resolution.width.get(),
            height: self.descriptor.resolution.height.get(),
            format: self.descriptor.format,
            stride: self.descriptor.stride,
            timestamp_ns: self.timestamp_ns,
            sequence: self.update_count,
            data,
        })
    }
}
