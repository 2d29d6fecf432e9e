//! The fixed ring of frame buffers a capture session chains to the driver.
use smallvec::SmallVec;

use acheron_core::prelude::*;

use crate::{
    CaptureDriver, DriverError, InputHandle,
    frame::{BufferState, FrameBuffer},
};

/// Fixed set of [`FrameBuffer`]s allocated together and released together.
///
/// The pool never frees an individual buffer; [`release`](Self::release) drops all of them
/// and must only be called once the driver can no longer write into any of them.
///
/// # Example
/// ```rust
/// use acheron_capture::prelude::*;
///
/// let mut pool = BufferPool::default();
/// pool.allocate(3, 640, 480, PixelFormat::Rgb32).unwrap();
/// assert_eq!(pool.len(), 3);
/// let ptr = pool.buffers()[1].driver_ptr();
/// assert!(pool.find_by_driver_pointer(ptr).is_some());
/// pool.release();
/// assert!(pool.find_by_driver_pointer(ptr).is_none());
/// ```
#[derive(Debug, Default)]
pub struct BufferPool {
    buffers: SmallVec<[FrameBuffer; 4]>,
}

impl BufferPool {
    /// Replace the pool with `count` fresh buffers.
    ///
    /// On failure the pool is left empty; buffers built before the failing one are dropped.
    pub fn allocate(
        &mut self,
        count: usize,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<(), AllocationError> {
        self.release();
        let buffers = (0..count)
            .map(|_| FrameBuffer::new(width, height, format))
            .collect::<Result<SmallVec<[FrameBuffer; 4]>, _>>()?;
        tracing::debug!(
            count,
            width,
            height,
            format = %format,
            bytes = buffers.first().map(FrameBuffer::len).unwrap_or(0),
            "allocated frame buffers"
        );
        self.buffers = buffers;
        Ok(())
    }

    /// Buffer whose storage starts at `ptr`, if this pool owns one.
    pub fn find_by_driver_pointer(&mut self, ptr: DriverPtr) -> Option<&mut FrameBuffer> {
        self.buffers
            .iter_mut()
            .find(|buf| buf.matches_driver_pointer(ptr))
    }

    /// Chain every buffer, in pool order. Returns how many were accepted.
    ///
    /// Individual failures are logged by [`FrameBuffer::submit_to_driver`]; the first error is
    /// returned alongside the count so callers can report it when nothing was accepted.
    pub fn submit_all(
        &mut self,
        driver: &dyn CaptureDriver,
        handle: InputHandle,
    ) -> (usize, Option<DriverError>) {
        let mut accepted = 0;
        let mut first_err = None;
        for buf in self.buffers.iter_mut() {
            match buf.submit_to_driver(driver, handle) {
                Ok(()) => accepted += 1,
                Err(err) => {
                    first_err.get_or_insert(err);
                }
            }
        }
        (accepted, first_err)
    }

    /// Buffers currently chained or being published, i.e. still in rotation.
    pub fn in_rotation(&self) -> usize {
        self.buffers
            .iter()
            .filter(|buf| buf.state() != BufferState::Idle)
            .count()
    }

    /// Drop every buffer.
    pub fn release(&mut self) {
        if !self.buffers.is_empty() {
            tracing::debug!(count = self.buffers.len(), "releasing frame buffers");
        }
        self.buffers.clear();
    }

    pub fn buffers(&self) -> &[FrameBuffer] {
        &self.buffers
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
