//! Where completed frames go.
use std::sync::Arc;

use acheron_core::prelude::*;

/// A completed video frame, borrowed from the pool for the duration of one publish call.
#[derive(Debug, Clone, Copy)]
pub struct VideoFrame<'a> {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Bytes per row (luma row for planar formats).
    pub stride: usize,
    /// Monotonic capture timestamp in nanoseconds.
    pub timestamp_ns: u64,
    /// How many frames the source buffer has carried, this one included.
    pub sequence: u64,
    pub data: &'a [u8],
}

impl VideoFrame<'_> {
    /// Copy the pixels out so the frame can outlive the publish call.
    pub fn to_owned_frame(&self) -> OwnedFrame {
        OwnedFrame {
            width: self.width,
            height: self.height,
            format: self.format,
            stride: self.stride,
            timestamp_ns: self.timestamp_ns,
            sequence: self.sequence,
            data: self.data.to_vec(),
        }
    }
}

/// Consumer of captured video.
///
/// `publish_video` runs on a driver callback thread while the session lock is held. It must
/// not call back into the session and must copy whatever it needs before returning.
pub trait VideoSink: Send + Sync {
    fn publish_video(&self, frame: &VideoFrame<'_>);
}

impl<S: VideoSink + ?Sized> VideoSink for Arc<S> {
    fn publish_video(&self, frame: &VideoFrame<'_>) {
        (**self).publish_video(frame)
    }
}

/// Interleaved PCM block handed to an [`AudioSink`].
#[derive(Debug, Clone, Copy)]
pub struct AudioFrame<'a> {
    pub samples_per_sec: u32,
    pub channels: u16,
    pub frames: u32,
    pub timestamp_ns: u64,
    pub data: &'a [u8],
}

/// Consumer of captured audio.
///
/// No backend in this workspace produces audio yet; the trait fixes the contract so hosts can
/// wire a sink before one exists.
pub trait AudioSink: Send + Sync {
    fn publish_audio(&self, frame: &AudioFrame<'_>);
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl VideoSink for NullSink {
    fn publish_video(&self, _frame: &VideoFrame<'_>) {}
}

impl AudioSink for NullSink {
    fn publish_audio(&self, _frame: &AudioFrame<'_>) {}
}

/// A [`VideoFrame`] with its own copy of the pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub stride: usize,
    pub timestamp_ns: u64,
    pub sequence: u64,
    pub data: Vec<u8>,
}

/// Sink that copies each frame into a bounded queue, evicting the oldest frame when the
/// consumer falls behind.
///
/// # Example
/// ```rust
/// use acheron_capture::prelude::*;
///
/// let (sink, rx) = QueueSink::new(2);
/// let pixels = [0u8; 16];
/// let frame = VideoFrame {
///     width: 2,
///     height: 2,
///     format: PixelFormat::Rgb32,
///     stride: 8,
///     timestamp_ns: 1,
///     sequence: 1,
///     data: &pixels,
/// };
/// sink.publish_video(&frame);
/// assert!(matches!(rx.recv(), RecvOutcome::Data(f) if f.timestamp_ns == 1));
/// ```
#[derive(Clone)]
pub struct QueueSink {
    tx: FrameTx<OwnedFrame>,
}

impl QueueSink {
    /// Sink plus the receiving end of its queue.
    pub fn new(capacity: usize) -> (Self, FrameRx<OwnedFrame>) {
        let (tx, rx) = frame_queue(capacity);
        (Self { tx }, rx)
    }

    /// Frames evicted because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.tx.evicted()
    }

    /// Stop accepting frames.
    pub fn close(&self) {
        self.tx.close();
    }
}

impl VideoSink for QueueSink {
    fn publish_video(&self, frame: &VideoFrame<'_>) {
        match self.tx.push(frame.to_owned_frame()) {
            PushOutcome::Evicted => {
                tracing::trace!(sequence = frame.sequence, "frame queue full, evicted oldest")
            }
            PushOutcome::Closed => tracing::trace!("frame queue closed, frame discarded"),
            PushOutcome::Queued => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(data: &[u8], seq: u64) -> VideoFrame<'_> {
        VideoFrame {
            width: 2,
            height: 1,
            format: PixelFormat::Y8,
            stride: 2,
            timestamp_ns: seq * 10,
            sequence: seq,
            data,
        }
    }

    #[test]
    fn queue_sink_keeps_newest_frames() {
        let (sink, rx) = QueueSink::new(2);
        for seq in 1..=3 {
            sink.publish_video(&frame(&[seq as u8, 0], seq));
        }
        assert_eq!(sink.dropped(), 1);
        let RecvOutcome::Data(first) = rx.recv() else {
            panic!("expected a frame");
        };
        assert_eq!(first.sequence, 2);
        assert_eq!(first.data, vec![2, 0]);
    }

    #[test]
    fn closed_queue_sink_discards() {
        let (sink, rx) = QueueSink::new(1);
        sink.close();
        sink.publish_video(&frame(&[1, 2], 1));
        assert!(matches!(rx.recv(), RecvOutcome::Closed));
    }

    #[test]
    fn shared_sinks_forward() {
        let (sink, rx) = QueueSink::new(1);
        let shared: Arc<dyn VideoSink> = Arc::new(sink);
        shared.publish_video(&frame(&[9, 9], 4));
        assert_eq!(rx.len(), 1);
    }
}
