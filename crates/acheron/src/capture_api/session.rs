use std::{
    fmt,
    sync::{Arc, OnceLock},
    time::Instant,
};

use parking_lot::Mutex;

use acheron_capture::{library, prelude::*};

use super::{
    AudioCapture, CallbackDispatcher, CaptureError, FrameOutcome, SessionConfig, SignalState,
    SignalStateMachine, description, read_input_bounds,
};
use crate::metrics::StageMetrics;

/// Lifecycle of a [`CaptureSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SessionState {
    Idle,
    Starting,
    Capturing,
    Stopping,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Capturing => "capturing",
            SessionState::Stopping => "stopping",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one pool buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSnapshot {
    pub driver_ptr: DriverPtr,
    pub state: BufferState,
    pub update_count: u64,
    pub len: usize,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    pub state: SessionState,
    pub signal: Option<SignalState>,
    pub counters: CounterSnapshot,
    pub buffers: usize,
    /// Buffers chained to the driver or being published.
    pub in_rotation: usize,
    pub publish_avg_millis: Option<f64>,
    pub publish_fps: Option<f64>,
}

static CLOCK_EPOCH: OnceLock<Instant> = OnceLock::new();

/// Nanoseconds on the process-wide monotonic timeline all sessions stamp frames with.
pub fn monotonic_ns() -> u64 {
    let epoch = CLOCK_EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_nanos().min(u64::MAX as u128) as u64
}

/// Per-session view of [`monotonic_ns`] that never repeats a value.
struct FrameClock {
    last: u64,
}

impl FrameClock {
    fn new() -> Self {
        Self { last: 0 }
    }

    fn next(&mut self) -> u64 {
        let now = monotonic_ns();
        self.last = now.max(self.last + 1);
        self.last
    }
}

struct SessionInner {
    phase: SessionState,
    /// Applied on the next start.
    config: SessionConfig,
    /// What the running session was started with.
    active: Option<SessionConfig>,
    handle: Option<InputHandle>,
    pool: BufferPool,
    signal: Option<SignalStateMachine>,
    audio: Option<AudioCapture>,
    clock: FrameClock,
}

/// State shared between the control thread and driver callback threads.
pub(crate) struct SessionShared {
    driver: Arc<dyn CaptureDriver>,
    sink: Arc<dyn VideoSink>,
    inner: Mutex<SessionInner>,
    counters: CaptureCounters,
    publish: StageMetrics,
}

impl SessionShared {
    /// A frame-captured notification. `source` is the handle the driver reported, if any.
    pub(crate) fn frame_completed(&self, source: Option<InputHandle>, buffer: DriverPtr) -> FrameOutcome {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let handle = match inner.handle {
            Some(handle) if inner.phase == SessionState::Capturing => handle,
            _ => {
                self.counters.not_capturing();
                tracing::trace!(buffer = ?buffer, phase = %inner.phase, "frame while not capturing");
                return FrameOutcome::NotCapturing;
            }
        };
        if source.is_some_and(|s| s != handle) {
            self.counters.stale();
            tracing::trace!(buffer = ?buffer, "frame from a previous input handle");
            return FrameOutcome::Stale;
        }

        let timestamp = inner.clock.next();
        let Some(frame) = inner.pool.find_by_driver_pointer(buffer) else {
            self.counters.stale();
            tracing::trace!(buffer = ?buffer, "frame for a buffer this pool does not own");
            return FrameOutcome::Stale;
        };
        if !frame.complete(timestamp) {
            self.counters.stale();
            tracing::trace!(buffer = ?buffer, state = ?frame.state(), "frame for an unchained buffer");
            return FrameOutcome::Stale;
        }

        let started = Instant::now();
        if let Some(video) = frame.video_frame() {
            self.sink.publish_video(&video);
        }
        self.publish.record(started.elapsed());
        self.counters.published();
        tracing::trace!(
            buffer = ?buffer,
            sequence = frame.update_count(),
            timestamp_ns = timestamp,
            "frame published"
        );

        let Err(err) = frame.submit_to_driver(self.driver.as_ref(), handle) else {
            return FrameOutcome::Published;
        };
        self.counters.resubmit_failure();
        if inner.pool.in_rotation() == 0 {
            let err = CaptureError::CaptureDegraded(err);
            tracing::error!(error = %err, code = err.code(), "no buffers left in rotation");
        }
        FrameOutcome::ResubmitFailed
    }

    pub(crate) fn mode_changed(&self, source: Option<InputHandle>, mode: ModeInfo) {
        let handle = {
            let mut inner = self.inner.lock();
            let Some(handle) = inner.handle.filter(|h| source.is_none_or(|s| s == *h)) else {
                tracing::trace!("mode change for an inactive input ignored");
                return;
            };
            if let Some(signal) = inner.signal.as_mut() {
                signal.on_mode_changed(mode);
            }
            handle
        };
        self.counters.mode_change();
        tracing::debug!(
            width = mode.width,
            height = mode.height,
            refresh_millihz = mode.refresh_millihz,
            "input mode changed"
        );

        // Driver calls below may block; the session lock stays released.
        let negotiated = self
            .driver
            .default_capture_size(handle)
            .and_then(|(width, height)| {
                self.driver.set_capture_size(handle, width, height)?;
                Ok((width, height))
            });
        match negotiated {
            Ok((width, height)) => {
                let mut inner = self.inner.lock();
                if inner.handle == Some(handle)
                    && let Some(signal) = inner.signal.as_mut()
                {
                    signal.set_negotiated(width, height);
                }
                tracing::debug!(width, height, "capture size renegotiated");
            }
            Err(err) => tracing::warn!(error = %err, "could not renegotiate capture size"),
        }
    }

    pub(crate) fn no_signal(&self, source: Option<InputHandle>) {
        let mut inner = self.inner.lock();
        if !Self::is_current(&inner, source) {
            return;
        }
        if let Some(signal) = inner.signal.as_mut() {
            signal.on_no_signal();
            tracing::debug!("input signal lost");
        }
    }

    pub(crate) fn invalid_signal(&self, source: Option<InputHandle>, clocks: SignalClocks) {
        let mut inner = self.inner.lock();
        if !Self::is_current(&inner, source) {
            return;
        }
        if let Some(signal) = inner.signal.as_mut() {
            signal.on_invalid_signal(clocks);
            tracing::debug!(
                horizontal = clocks.horizontal,
                vertical = clocks.vertical,
                "input signal invalid"
            );
        }
    }

    fn is_current(inner: &SessionInner, source: Option<InputHandle>) -> bool {
        match source {
            Some(source) => inner.handle == Some(source),
            None => inner.handle.is_some(),
        }
    }
}

/// One capture input: buffer ring, driver handle and signal state behind a single lock.
///
/// `start` and `stop` may be called from any thread; driver callbacks arrive on driver threads
/// through a [`CallbackDispatcher`]. Dropping the session stops it.
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use acheron::prelude::*;
///
/// let driver = Arc::new(VirtualDriver::new());
/// let (sink, frames) = QueueSink::new(4);
/// let session = CaptureSession::new(driver.clone(), Arc::new(sink), SessionConfig::default());
///
/// session.start().unwrap();
/// let handle = session.input_handle().unwrap();
/// driver.deliver_frame(handle);
/// assert!(matches!(frames.recv(), RecvOutcome::Data(f) if f.width == 640));
///
/// session.stop();
/// assert_eq!(session.state(), SessionState::Idle);
/// ```
pub struct CaptureSession {
    shared: Arc<SessionShared>,
    audio_sink: Arc<dyn AudioSink>,
    control: Mutex<()>,
}

impl CaptureSession {
    pub fn new(
        driver: Arc<dyn CaptureDriver>,
        sink: Arc<dyn VideoSink>,
        config: SessionConfig,
    ) -> Self {
        Self {
            shared: Arc::new(SessionShared {
                driver,
                sink,
                inner: Mutex::new(SessionInner {
                    phase: SessionState::Idle,
                    config,
                    active: None,
                    handle: None,
                    pool: BufferPool::default(),
                    signal: None,
                    audio: None,
                    clock: FrameClock::new(),
                }),
                counters: CaptureCounters::default(),
                publish: StageMetrics::default(),
            }),
            audio_sink: Arc::new(NullSink),
            control: Mutex::new(()),
        }
    }

    /// Session on the process-wide driver installed with [`library::install`].
    pub fn from_library(sink: Arc<dyn VideoSink>, config: SessionConfig) -> Result<Self, CaptureError> {
        let driver = library::driver().ok_or(CaptureError::NoDriver)?;
        Ok(Self::new(driver, sink, config))
    }

    /// Where audio goes once an audio-capable driver exists.
    pub fn with_audio_sink(mut self, sink: Arc<dyn AudioSink>) -> Self {
        self.audio_sink = sink;
        self
    }

    /// Start capturing on the configured input.
    pub fn start(&self) -> Result<(), CaptureError> {
        let input = self.shared.inner.lock().config.input;
        self.start_input(input)
    }

    /// Start capturing on `input`.
    ///
    /// All or nothing: on error the session is back in [`SessionState::Idle`] with no open
    /// handle and no buffers.
    pub fn start_input(&self, input: u32) -> Result<(), CaptureError> {
        let _control = self.control.lock();
        let mut inner = self.shared.inner.lock();
        if inner.phase != SessionState::Idle {
            return Err(CaptureError::InvalidState(inner.phase.as_str()));
        }
        let config = inner.config.input(input);
        config.validate()?;
        inner.phase = SessionState::Starting;
        tracing::debug!(
            input,
            width = config.internal_width,
            height = config.internal_height,
            format = %config.pixel_format,
            buffers = config.pool_size,
            "starting capture"
        );

        if let Err(err) = self.start_sequence(&mut inner, &config) {
            tracing::error!(input, error = %err, code = err.code(), "capture start failed");
            let handle = inner.handle.take();
            drop(inner);
            // Callbacks may be waiting on the session lock; closing waits for them.
            if let Some(handle) = handle {
                log_failure(self.shared.driver.close_input(handle));
            }
            let mut inner = self.shared.inner.lock();
            inner.pool.release();
            inner.phase = SessionState::Idle;
            return Err(err);
        }

        if config.capture_audio {
            match AudioCapture::open(input, self.audio_sink.clone()) {
                Ok(audio) => inner.audio = Some(audio),
                Err(err) => tracing::warn!(input, error = %err, "continuing without audio"),
            }
        }
        inner.active = Some(config);
        inner.phase = SessionState::Capturing;
        tracing::info!(input, buffers = inner.pool.len(), "capture started");
        Ok(())
    }

    fn start_sequence(&self, inner: &mut SessionInner, config: &SessionConfig) -> Result<(), CaptureError> {
        let driver = self.shared.driver.as_ref();
        let input = config.input;

        let info = driver.signal_info(input)?;
        inner.signal = Some(SignalStateMachine::seeded(&info));

        inner.pool.allocate(
            config.pool_size,
            config.internal_width,
            config.internal_height,
            config.pixel_format,
        )?;

        let handle = driver.open_input(input)?;
        inner.handle = Some(handle);
        driver.set_frame_dropping(handle, config.frame_dropping)?;
        driver.enable_cropping(handle, false)?;

        let events: Arc<dyn DriverEvents> = Arc::new(self.dispatcher());
        for slot in CallbackSlot::ALL {
            driver.set_callback(handle, slot, events.clone())?;
        }

        let (accepted, first_err) = inner.pool.submit_all(driver, handle);
        if let Some(err) = first_err {
            if accepted == 0 {
                return Err(CaptureError::CaptureDegraded(err));
            }
            tracing::warn!(accepted, total = inner.pool.len(), "capturing with fewer buffers");
        }

        driver.use_output_buffers(handle, true)?;
        driver.start_capture(handle)?;
        Ok(())
    }

    /// Stop capturing and release every buffer. A no-op when idle.
    ///
    /// Blocks until the driver has halted; no frame is published after this returns.
    pub fn stop(&self) {
        let _control = self.control.lock();
        let (handle, audio) = {
            let mut inner = self.shared.inner.lock();
            if inner.phase == SessionState::Idle {
                return;
            }
            inner.phase = SessionState::Stopping;
            (inner.handle.take(), inner.audio.take())
        };

        // The driver waits for in-flight callbacks here, and those need the session lock.
        if let Some(handle) = handle {
            let driver = self.shared.driver.as_ref();
            log_failure(driver.use_output_buffers(handle, false));
            log_failure(driver.stop_capture(handle));
            log_failure(driver.close_input(handle));
        }

        let mut inner = self.shared.inner.lock();
        inner.pool.release();
        if let Some(audio) = audio {
            audio.close();
        }
        inner.signal = None;
        inner.active = None;
        inner.phase = SessionState::Idle;
        tracing::info!("capture stopped");
    }

    /// Replace the configuration used by the next start.
    pub fn update(&self, config: SessionConfig) -> Result<(), CaptureError> {
        config.validate()?;
        let mut inner = self.shared.inner.lock();
        if inner.phase != SessionState::Idle {
            tracing::debug!("configuration stored; applies on next start");
        }
        inner.config = config;
        Ok(())
    }

    pub fn config(&self) -> SessionConfig {
        self.shared.inner.lock().config
    }

    pub fn state(&self) -> SessionState {
        self.shared.inner.lock().phase
    }

    pub fn is_capturing(&self) -> bool {
        self.state() == SessionState::Capturing
    }

    /// Output width the consumer receives.
    pub fn width(&self) -> u32 {
        let inner = self.shared.inner.lock();
        inner.active.unwrap_or(inner.config).internal_width
    }

    /// Output height the consumer receives.
    pub fn height(&self) -> u32 {
        let inner = self.shared.inner.lock();
        inner.active.unwrap_or(inner.config).internal_height
    }

    /// Current signal condition; `None` before the first start and after stop.
    pub fn signal(&self) -> Option<SignalState> {
        self.shared.inner.lock().signal.map(|s| s.state())
    }

    pub fn signal_machine(&self) -> Option<SignalStateMachine> {
        self.shared.inner.lock().signal
    }

    /// Driver handle, present only while a session is started.
    pub fn input_handle(&self) -> Option<InputHandle> {
        self.shared.inner.lock().handle
    }

    pub fn buffers(&self) -> Vec<BufferSnapshot> {
        self.shared
            .inner
            .lock()
            .pool
            .buffers()
            .iter()
            .map(|b| BufferSnapshot {
                driver_ptr: b.driver_ptr(),
                state: b.state(),
                update_count: b.update_count(),
                len: b.len(),
            })
            .collect()
    }

    pub fn stats(&self) -> SessionStats {
        let inner = self.shared.inner.lock();
        SessionStats {
            state: inner.phase,
            signal: inner.signal.map(|s| s.state()),
            counters: self.shared.counters.snapshot(),
            buffers: inner.pool.len(),
            in_rotation: inner.pool.in_rotation(),
            publish_avg_millis: self.shared.publish.avg_millis(),
            publish_fps: self.shared.publish.fps(),
        }
    }

    /// Publish timing of the sink.
    pub fn publish_metrics(&self) -> StageMetrics {
        self.shared.publish.clone()
    }

    /// Capture size limits of `input`, read by briefly opening it.
    pub fn input_bounds(&self, input: u32) -> Result<InputBounds, CaptureError> {
        read_input_bounds(self.shared.driver.as_ref(), input)
    }

    /// Human-readable description of the signal on `input`.
    pub fn signal_description(&self, input: u32) -> Result<String, CaptureError> {
        description::signal_description(self.shared.driver.as_ref(), input)
    }

    /// Callback receiver bound to this session, as registered with the driver at start.
    pub(crate) fn dispatcher(&self) -> CallbackDispatcher {
        CallbackDispatcher::new(Arc::downgrade(&self.shared))
    }

    /// Hand a completed buffer back to the session as the driver would.
    pub fn on_frame_completed(&self, buffer: DriverPtr) -> FrameOutcome {
        self.shared.frame_completed(None, buffer)
    }

    pub fn on_mode_changed(&self, mode: ModeInfo) {
        self.shared.mode_changed(None, mode)
    }

    pub fn on_no_signal(&self) {
        self.shared.no_signal(None)
    }

    pub fn on_invalid_signal(&self, clocks: SignalClocks) {
        self.shared.invalid_signal(None, clocks)
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("CaptureSession")
            .field("state", &inner.phase)
            .field("config", &inner.config)
            .field("handle", &inner.handle)
            .field("buffers", &inner.pool.len())
            .finish_non_exhaustive()
    }
}

fn log_failure(result: Result<(), DriverError>) {
    if let Err(err) = result {
        tracing::warn!(op = %err.op, code = err.code, "driver call failed during teardown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(driver: &Arc<VirtualDriver>) -> CaptureSession {
        CaptureSession::new(
            driver.clone(),
            Arc::new(NullSink),
            SessionConfig::default().pool_size(3).internal_size(64, 48),
        )
    }

    #[test]
    fn clock_is_strictly_increasing() {
        let mut clock = FrameClock::new();
        let mut last = 0;
        for _ in 0..1000 {
            let next = clock.next();
            assert!(next > last);
            last = next;
        }
    }

    #[test]
    fn sessions_share_one_timeline() {
        let mut first = FrameClock::new();
        let early = first.next();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let mut second = FrameClock::new();
        let late = second.next();
        assert!(late > early, "{late} <= {early}");
        assert!(first.next() >= late);
    }

    #[test]
    fn start_runs_the_driver_sequence_in_order() {
        let driver = Arc::new(VirtualDriver::new());
        let session = session(&driver);
        session.start().unwrap();

        let mut expected = vec![
            DriverOp::SignalInfo,
            DriverOp::OpenInput,
            DriverOp::SetFrameDropping,
            DriverOp::EnableCropping,
        ];
        expected.extend(CallbackSlot::ALL.map(DriverOp::SetCallback));
        expected.extend([DriverOp::ChainOutputBuffer; 3]);
        expected.extend([DriverOp::UseOutputBuffers, DriverOp::StartCapture]);
        assert_eq!(driver.calls(), expected);
        assert_eq!(session.state(), SessionState::Capturing);

        driver.clear_calls();
        session.stop();
        assert_eq!(
            driver.calls(),
            vec![
                DriverOp::UseOutputBuffers,
                DriverOp::StopCapture,
                DriverOp::CloseInput
            ]
        );
    }

    #[test]
    fn start_twice_is_rejected() {
        let driver = Arc::new(VirtualDriver::new());
        let session = session(&driver);
        session.start().unwrap();
        let err = session.start().unwrap_err();
        assert_eq!(err, CaptureError::InvalidState("capturing"));
        assert_eq!(driver.open_handles().len(), 1);
    }

    #[test]
    fn invalid_config_never_reaches_the_driver() {
        let driver = Arc::new(VirtualDriver::new());
        let session = CaptureSession::new(
            driver.clone(),
            Arc::new(NullSink),
            SessionConfig::default().internal_size(0, 480),
        );
        let err = session.start().unwrap_err();
        assert_eq!(err.code(), "invalid_config");
        assert!(driver.calls().is_empty());
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn failed_resubmit_takes_buffer_out_of_rotation() {
        let driver = Arc::new(VirtualDriver::new());
        let session = session(&driver);
        session.start().unwrap();
        let handle = session.input_handle().unwrap();

        driver.fail_on(DriverOp::ChainOutputBuffer, 5);
        assert!(driver.deliver_frame(handle).is_some());
        let stats = session.stats();
        assert_eq!(stats.counters.resubmit_failures, 1);
        assert_eq!(stats.in_rotation, 2);
    }

    #[test]
    fn update_applies_on_next_start() {
        let driver = Arc::new(VirtualDriver::new());
        let session = session(&driver);
        session.start().unwrap();
        session
            .update(SessionConfig::default().internal_size(320, 240))
            .unwrap();
        assert_eq!((session.width(), session.height()), (64, 48));
        session.stop();
        assert_eq!((session.width(), session.height()), (320, 240));
        session.start().unwrap();
        assert_eq!(session.buffers()[0].len, 320 * 240 * 4);
    }

    #[test]
    fn audio_request_degrades_to_video_only() {
        let driver = Arc::new(VirtualDriver::new());
        let session = CaptureSession::new(
            driver.clone(),
            Arc::new(NullSink),
            SessionConfig::default().capture_audio(true),
        );
        session.start().unwrap();
        assert!(session.is_capturing());
    }

    #[test]
    fn library_backed_sessions_need_a_driver() {
        library::shutdown();
        let err = CaptureSession::from_library(Arc::new(NullSink), SessionConfig::default())
            .unwrap_err();
        assert_eq!(err, CaptureError::NoDriver);
    }
}
