//! Virtual capture driver that fills chained buffers with a pattern and fires callbacks on demand.
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::Duration,
};

use parking_lot::{Condvar, Mutex, MutexGuard};

use acheron_core::prelude::*;

use crate::{
    CallbackSlot, CaptureDriver, DriverError, DriverEvents, DriverOp, InputBounds, InputHandle,
    ModeInfo, SignalClocks, SignalInfo, SignalType,
};

/// Status codes the virtual driver reports.
pub mod codes {
    /// The handle is not open.
    pub const INVALID_HANDLE: u32 = 0x1100_0001;
    /// The input index does not exist.
    pub const INVALID_INPUT: u32 = 0x1100_0002;
    /// A requested size is outside the input's bounds.
    pub const OUT_OF_RANGE: u32 = 0x1100_0010;
}

/// One simulated physical input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualInput {
    pub signal: SignalInfo,
    pub bounds: InputBounds,
    /// Size the driver negotiates for the current signal.
    pub default_size: (u32, u32),
}

impl Default for VirtualInput {
    fn default() -> Self {
        Self {
            signal: SignalInfo {
                kind: SignalType::Dvi,
                width: 1280,
                height: 720,
                refresh_millihz: 60_000,
            },
            bounds: InputBounds {
                min_width: 32,
                max_width: 4096,
                min_height: 32,
                max_height: 4096,
            },
            default_size: (1280, 720),
        }
    }
}

struct OpenInput {
    input: usize,
    callbacks: HashMap<CallbackSlot, Arc<dyn DriverEvents>>,
    chained: VecDeque<(DriverPtr, usize)>,
    capturing: bool,
    output_buffers: bool,
    frame_dropping: u32,
    cropping: bool,
    capture_size: Option<(u32, u32)>,
    hw_frames: u64,
    in_flight: usize,
}

#[derive(Default)]
struct DriverState {
    inputs: Vec<VirtualInput>,
    open: HashMap<InputHandle, OpenInput>,
    next_handle: u64,
    faults: HashMap<DriverOp, u32>,
    /// One-shot faults: calls of the op still to pass before the failing one, and its code.
    countdowns: HashMap<DriverOp, (u32, u32)>,
    calls: Vec<DriverOp>,
}

impl DriverState {
    fn enter(&mut self, op: DriverOp) -> Result<(), DriverError> {
        self.calls.push(op);
        if let Some(&code) = self.faults.get(&op) {
            return Err(DriverError::new(op, code));
        }
        let Some((remaining, code)) = self.countdowns.get_mut(&op) else {
            return Ok(());
        };
        if *remaining > 0 {
            *remaining -= 1;
            return Ok(());
        }
        let code = *code;
        self.countdowns.remove(&op);
        Err(DriverError::new(op, code))
    }

    fn open_mut(&mut self, op: DriverOp, handle: InputHandle) -> Result<&mut OpenInput, DriverError> {
        self.enter(op)?;
        self.open
            .get_mut(&handle)
            .ok_or(DriverError::new(op, codes::INVALID_HANDLE))
    }

    fn input_of(&self, handle: InputHandle) -> Option<&VirtualInput> {
        self.open.get(&handle).and_then(|o| self.inputs.get(o.input))
    }
}

/// In-process [`CaptureDriver`] used by tests and the demo.
///
/// Buffers are only written when [`deliver_frame`](Self::deliver_frame) is called (or by the
/// thread started with [`spawn_stream`](Self::spawn_stream)). Callbacks always run with the
/// driver's internal lock released, and [`CaptureDriver::stop_capture`] /
/// [`CaptureDriver::close_input`] wait for in-flight callbacks like real hardware drivers do.
///
/// # Example
/// ```rust
/// use acheron_capture::prelude::*;
///
/// let driver = VirtualDriver::new();
/// let handle = driver.open_input(0).unwrap();
/// driver.fail_on(DriverOp::StartCapture, 0x42);
/// let err = driver.start_capture(handle).unwrap_err();
/// assert_eq!(err.code, 0x42);
/// assert_eq!(driver.calls(), vec![DriverOp::OpenInput, DriverOp::StartCapture]);
/// ```
pub struct VirtualDriver {
    state: Mutex<DriverState>,
    idle: Condvar,
}

impl Default for VirtualDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualDriver {
    /// Driver with a single default input.
    pub fn new() -> Self {
        Self::with_inputs(vec![VirtualInput::default()])
    }

    pub fn with_inputs(inputs: Vec<VirtualInput>) -> Self {
        Self {
            state: Mutex::new(DriverState {
                inputs,
                next_handle: 1,
                ..Default::default()
            }),
            idle: Condvar::new(),
        }
    }

    /// Make every later call of `op` fail with `code`.
    pub fn fail_on(&self, op: DriverOp, code: u32) {
        self.state.lock().faults.insert(op, code);
    }

    /// Make only the `n`th later call of `op` fail with `code` (1 = the next call).
    pub fn fail_nth(&self, op: DriverOp, n: u32, code: u32) {
        self.state
            .lock()
            .countdowns
            .insert(op, (n.saturating_sub(1), code));
    }

    pub fn clear_fault(&self, op: DriverOp) {
        let mut state = self.state.lock();
        state.faults.remove(&op);
        state.countdowns.remove(&op);
    }

    pub fn clear_faults(&self) {
        let mut state = self.state.lock();
        state.faults.clear();
        state.countdowns.clear();
    }

    /// Every driver call made so far, in order, including failed ones.
    pub fn calls(&self) -> Vec<DriverOp> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Handles currently open, in no particular order.
    pub fn open_handles(&self) -> Vec<InputHandle> {
        self.state.lock().open.keys().copied().collect()
    }

    /// Buffers chained on `handle` and not yet handed back.
    pub fn chained_count(&self, handle: InputHandle) -> usize {
        self.state
            .lock()
            .open
            .get(&handle)
            .map_or(0, |o| o.chained.len())
    }

    pub fn is_capturing(&self, handle: InputHandle) -> bool {
        self.state
            .lock()
            .open
            .get(&handle)
            .is_some_and(|o| o.capturing)
    }

    /// Last size set through [`CaptureDriver::set_capture_size`].
    pub fn capture_size(&self, handle: InputHandle) -> Option<(u32, u32)> {
        self.state
            .lock()
            .open
            .get(&handle)
            .and_then(|o| o.capture_size)
    }

    pub fn frame_dropping(&self, handle: InputHandle) -> Option<u32> {
        self.state
            .lock()
            .open
            .get(&handle)
            .map(|o| o.frame_dropping)
    }

    pub fn cropping(&self, handle: InputHandle) -> Option<bool> {
        self.state.lock().open.get(&handle).map(|o| o.cropping)
    }

    /// Change what [`CaptureDriver::signal_info`] reports for `input` without firing callbacks.
    pub fn set_signal(&self, input: u32, signal: SignalInfo) {
        let mut state = self.state.lock();
        if let Some(slot) = state.inputs.get_mut(input as usize) {
            slot.signal = signal;
            if signal.width > 0 && signal.height > 0 {
                slot.default_size = (signal.width, signal.height);
            }
        }
    }

    /// Simulate one hardware frame on `handle`.
    ///
    /// Honors frame dropping, fills the oldest chained buffer and reports it through the
    /// frame-captured callback. Returns the buffer delivered, or `None` if the frame was dropped,
    /// capture is not running, or no buffer is chained.
    pub fn deliver_frame(&self, handle: InputHandle) -> Option<DriverPtr> {
        let (ptr, events) = {
            let mut state = self.state.lock();
            let open = state.open.get_mut(&handle)?;
            if !open.capturing || !open.output_buffers {
                return None;
            }
            open.hw_frames += 1;
            let period = u64::from(open.frame_dropping) + 1;
            if (open.hw_frames - 1) % period != 0 {
                return None;
            }
            let events = open.callbacks.get(&CallbackSlot::FrameCaptured).cloned()?;
            let (ptr, len) = open.chained.pop_front()?;
            // SAFETY: a chained buffer stays allocated until it is handed back or the input is
            // closed, and its owner does not touch it while chained.
            unsafe { std::ptr::write_bytes(ptr.as_ptr(), (open.hw_frames % 256) as u8, len) };
            open.in_flight += 1;
            (ptr, events)
        };
        events.frame_captured(handle, ptr);
        self.callback_returned(handle);
        Some(ptr)
    }

    /// Report `ptr` as captured without writing to it, whether or not capture is running.
    ///
    /// If `ptr` is chained it is handed back first. Returns whether a callback ran.
    pub fn fire_frame_captured(&self, handle: InputHandle, ptr: DriverPtr) -> bool {
        let hand_back = |open: &mut OpenInput| open.chained.retain(|(chained, _)| *chained != ptr);
        self.fire(handle, CallbackSlot::FrameCaptured, hand_back, |events| {
            events.frame_captured(handle, ptr)
        })
    }

    /// Switch the input behind `handle` to `mode` and fire the mode-changed callback.
    pub fn fire_mode_changed(&self, handle: InputHandle, mode: ModeInfo) -> bool {
        self.update_input(handle, |input| {
            if matches!(input.signal.kind, SignalType::NoSignal | SignalType::OutOfRange) {
                input.signal.kind = SignalType::Dvi;
            }
            input.signal.width = mode.width;
            input.signal.height = mode.height;
            input.signal.refresh_millihz = mode.refresh_millihz;
            input.default_size = (mode.width, mode.height);
        });
        self.fire(handle, CallbackSlot::ModeChanged, |_| {}, |events| {
            events.mode_changed(handle, mode)
        })
    }

    /// Unplug the input behind `handle` and fire the no-signal callback.
    pub fn fire_no_signal(&self, handle: InputHandle) -> bool {
        self.update_input(handle, |input| input.signal = SignalInfo::none());
        self.fire(handle, CallbackSlot::NoSignal, |_| {}, |events| events.no_signal(handle))
    }

    /// Put the input behind `handle` out of range and fire the invalid-signal callback.
    pub fn fire_invalid_signal(&self, handle: InputHandle, clocks: SignalClocks) -> bool {
        self.update_input(handle, |input| {
            input.signal = SignalInfo {
                kind: SignalType::OutOfRange,
                ..SignalInfo::none()
            }
        });
        self.fire(handle, CallbackSlot::InvalidSignal, |_| {}, |events| {
            events.invalid_signal(handle, clocks)
        })
    }

    /// Deliver a frame on every capturing handle each `period` until the returned stream is
    /// stopped or dropped.
    pub fn spawn_stream(self: &Arc<Self>, period: Duration) -> VirtualStream {
        let stop = Arc::new(AtomicBool::new(false));
        let driver = Arc::clone(self);
        let flag = Arc::clone(&stop);
        let worker = std::thread::spawn(move || {
            while !flag.load(Ordering::Acquire) {
                for handle in driver.open_handles() {
                    driver.deliver_frame(handle);
                }
                std::thread::sleep(period);
            }
        });
        VirtualStream {
            stop,
            worker: Some(worker),
        }
    }

    fn update_input(&self, handle: InputHandle, f: impl FnOnce(&mut VirtualInput)) {
        let mut state = self.state.lock();
        let Some(index) = state.open.get(&handle).map(|o| o.input) else {
            return;
        };
        if let Some(input) = state.inputs.get_mut(index) {
            f(input);
        }
    }

    fn fire(
        &self,
        handle: InputHandle,
        slot: CallbackSlot,
        prepare: impl FnOnce(&mut OpenInput),
        call: impl FnOnce(&dyn DriverEvents),
    ) -> bool {
        let events = {
            let mut state = self.state.lock();
            let Some(open) = state.open.get_mut(&handle) else {
                return false;
            };
            let Some(events) = open.callbacks.get(&slot).cloned() else {
                return false;
            };
            prepare(open);
            open.in_flight += 1;
            events
        };
        call(events.as_ref());
        self.callback_returned(handle);
        true
    }

    fn callback_returned(&self, handle: InputHandle) {
        let mut state = self.state.lock();
        if let Some(open) = state.open.get_mut(&handle) {
            open.in_flight = open.in_flight.saturating_sub(1);
        }
        drop(state);
        self.idle.notify_all();
    }

    fn wait_for_callbacks(&self, state: &mut MutexGuard<'_, DriverState>, handle: InputHandle) {
        while state.open.get(&handle).is_some_and(|o| o.in_flight > 0) {
            self.idle.wait(state);
        }
    }
}

impl CaptureDriver for VirtualDriver {
    fn input_count(&self) -> Result<u32, DriverError> {
        let mut state = self.state.lock();
        state.enter(DriverOp::InputCount)?;
        Ok(state.inputs.len() as u32)
    }

    fn signal_info(&self, input: u32) -> Result<SignalInfo, DriverError> {
        let mut state = self.state.lock();
        state.enter(DriverOp::SignalInfo)?;
        state
            .inputs
            .get(input as usize)
            .map(|i| i.signal)
            .ok_or(DriverError::new(DriverOp::SignalInfo, codes::INVALID_INPUT))
    }

    fn open_input(&self, input: u32) -> Result<InputHandle, DriverError> {
        let mut state = self.state.lock();
        state.enter(DriverOp::OpenInput)?;
        if input as usize >= state.inputs.len() {
            return Err(DriverError::new(DriverOp::OpenInput, codes::INVALID_INPUT));
        }
        let handle = InputHandle::from_raw(state.next_handle);
        state.next_handle += 1;
        state.open.insert(
            handle,
            OpenInput {
                input: input as usize,
                callbacks: HashMap::new(),
                chained: VecDeque::new(),
                capturing: false,
                output_buffers: false,
                frame_dropping: 0,
                cropping: false,
                capture_size: None,
                hw_frames: 0,
                in_flight: 0,
            },
        );
        Ok(handle)
    }

    fn close_input(&self, handle: InputHandle) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        let open = state.open_mut(DriverOp::CloseInput, handle)?;
        open.callbacks.clear();
        open.capturing = false;
        open.chained.clear();
        self.wait_for_callbacks(&mut state, handle);
        state.open.remove(&handle);
        Ok(())
    }

    fn set_frame_dropping(&self, handle: InputHandle, frames: u32) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.open_mut(DriverOp::SetFrameDropping, handle)?.frame_dropping = frames;
        Ok(())
    }

    fn enable_cropping(&self, handle: InputHandle, enable: bool) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.open_mut(DriverOp::EnableCropping, handle)?.cropping = enable;
        Ok(())
    }

    fn set_callback(
        &self,
        handle: InputHandle,
        slot: CallbackSlot,
        events: Arc<dyn DriverEvents>,
    ) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state
            .open_mut(DriverOp::SetCallback(slot), handle)?
            .callbacks
            .insert(slot, events);
        Ok(())
    }

    fn chain_buffer(
        &self,
        handle: InputHandle,
        descriptor: &BufferDescriptor,
        buffer: DriverPtr,
    ) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state
            .open_mut(DriverOp::ChainOutputBuffer, handle)?
            .chained
            .push_back((buffer, descriptor.image_size));
        Ok(())
    }

    fn use_output_buffers(&self, handle: InputHandle, enable: bool) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.open_mut(DriverOp::UseOutputBuffers, handle)?.output_buffers = enable;
        Ok(())
    }

    fn start_capture(&self, handle: InputHandle) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.open_mut(DriverOp::StartCapture, handle)?.capturing = true;
        Ok(())
    }

    fn stop_capture(&self, handle: InputHandle) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.open_mut(DriverOp::StopCapture, handle)?.capturing = false;
        self.wait_for_callbacks(&mut state, handle);
        Ok(())
    }

    fn default_capture_size(&self, handle: InputHandle) -> Result<(u32, u32), DriverError> {
        let mut state = self.state.lock();
        state.open_mut(DriverOp::DefaultCaptureSize, handle)?;
        state
            .input_of(handle)
            .map(|i| i.default_size)
            .ok_or(DriverError::new(DriverOp::DefaultCaptureSize, codes::INVALID_HANDLE))
    }

    fn set_capture_size(
        &self,
        handle: InputHandle,
        width: u32,
        height: u32,
    ) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.open_mut(DriverOp::SetCaptureSize, handle)?;
        let in_bounds = state
            .input_of(handle)
            .is_some_and(|i| i.bounds.contains(width, height));
        if !in_bounds {
            return Err(DriverError::new(DriverOp::SetCaptureSize, codes::OUT_OF_RANGE));
        }
        if let Some(open) = state.open.get_mut(&handle) {
            open.capture_size = Some((width, height));
        }
        Ok(())
    }

    fn input_bounds(&self, handle: InputHandle) -> Result<InputBounds, DriverError> {
        let mut state = self.state.lock();
        state.open_mut(DriverOp::InputBounds, handle)?;
        state
            .input_of(handle)
            .map(|i| i.bounds)
            .ok_or(DriverError::new(DriverOp::InputBounds, codes::INVALID_HANDLE))
    }
}

/// Background frame generator returned by [`VirtualDriver::spawn_stream`].
pub struct VirtualStream {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl VirtualStream {
    /// Stop generating frames and wait for the worker to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for VirtualStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Recorder {
        frames: Mutex<Vec<(DriverPtr, u8)>>,
        modes: AtomicUsize,
        lost: AtomicUsize,
    }

    impl DriverEvents for Recorder {
        fn frame_captured(&self, _handle: InputHandle, buffer: DriverPtr) {
            // SAFETY: the test owns the storage and nothing else writes while it is reported.
            let first = unsafe { *buffer.as_ptr() };
            self.frames.lock().push((buffer, first));
        }

        fn mode_changed(&self, _handle: InputHandle, _mode: ModeInfo) {
            self.modes.fetch_add(1, Ordering::SeqCst);
        }

        fn no_signal(&self, _handle: InputHandle) {
            self.lost.fetch_add(1, Ordering::SeqCst);
        }

        fn invalid_signal(&self, _handle: InputHandle, _clocks: SignalClocks) {
            self.lost.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn armed(driver: &VirtualDriver, recorder: &Arc<Recorder>) -> InputHandle {
        let handle = driver.open_input(0).unwrap();
        for slot in CallbackSlot::ALL {
            driver
                .set_callback(handle, slot, recorder.clone() as Arc<dyn DriverEvents>)
                .unwrap();
        }
        handle
    }

    #[test]
    fn delivers_chained_buffers_in_order() {
        let driver = VirtualDriver::new();
        let recorder = Arc::new(Recorder::default());
        let handle = armed(&driver, &recorder);
        let res = Resolution::new(4, 4).unwrap();
        let desc = BufferDescriptor::new(res, PixelFormat::Y8).unwrap();
        let a = FrameStorage::zeroed(desc.image_size).unwrap();
        let b = FrameStorage::zeroed(desc.image_size).unwrap();
        driver.chain_buffer(handle, &desc, a.driver_ptr()).unwrap();
        driver.chain_buffer(handle, &desc, b.driver_ptr()).unwrap();

        assert!(driver.deliver_frame(handle).is_none(), "not capturing yet");
        driver.use_output_buffers(handle, true).unwrap();
        driver.start_capture(handle).unwrap();

        assert_eq!(driver.deliver_frame(handle), Some(a.driver_ptr()));
        assert_eq!(driver.deliver_frame(handle), Some(b.driver_ptr()));
        assert_eq!(driver.deliver_frame(handle), None, "nothing chained");
        let frames = recorder.frames.lock().clone();
        assert_eq!(frames, vec![(a.driver_ptr(), 1), (b.driver_ptr(), 2)]);
        driver.close_input(handle).unwrap();
    }

    #[test]
    fn frame_dropping_skips_hardware_frames() {
        let driver = VirtualDriver::new();
        let recorder = Arc::new(Recorder::default());
        let handle = armed(&driver, &recorder);
        let res = Resolution::new(2, 2).unwrap();
        let desc = BufferDescriptor::new(res, PixelFormat::Y8).unwrap();
        let storage: Vec<_> = (0..4).map(|_| FrameStorage::zeroed(4).unwrap()).collect();
        for s in &storage {
            driver.chain_buffer(handle, &desc, s.driver_ptr()).unwrap();
        }
        driver.set_frame_dropping(handle, 1).unwrap();
        driver.use_output_buffers(handle, true).unwrap();
        driver.start_capture(handle).unwrap();

        let delivered = (0..4).filter_map(|_| driver.deliver_frame(handle)).count();
        assert_eq!(delivered, 2);
        driver.close_input(handle).unwrap();
    }

    #[test]
    fn signal_events_update_the_input() {
        let driver = VirtualDriver::new();
        let recorder = Arc::new(Recorder::default());
        let handle = armed(&driver, &recorder);

        assert!(driver.fire_no_signal(handle));
        assert_eq!(driver.signal_info(0).unwrap().kind, SignalType::NoSignal);

        let mode = ModeInfo {
            width: 1920,
            height: 1080,
            refresh_millihz: 59_940,
        };
        assert!(driver.fire_mode_changed(handle, mode));
        assert_eq!(driver.default_capture_size(handle).unwrap(), (1920, 1080));
        assert_eq!(driver.signal_info(0).unwrap().kind, SignalType::Dvi);

        assert!(driver.fire_invalid_signal(handle, SignalClocks::default()));
        assert_eq!(recorder.modes.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.lost.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn closed_inputs_fire_nothing() {
        let driver = VirtualDriver::new();
        let recorder = Arc::new(Recorder::default());
        let handle = armed(&driver, &recorder);
        driver.close_input(handle).unwrap();
        assert!(!driver.fire_no_signal(handle));
        assert!(driver.open_handles().is_empty());
        let err = driver.start_capture(handle).unwrap_err();
        assert_eq!(err.code, codes::INVALID_HANDLE);
    }

    #[test]
    fn capture_size_is_bounds_checked() {
        let driver = VirtualDriver::new();
        let handle = driver.open_input(0).unwrap();
        driver.set_capture_size(handle, 1920, 1080).unwrap();
        assert_eq!(driver.capture_size(handle), Some((1920, 1080)));
        let err = driver.set_capture_size(handle, 8, 8).unwrap_err();
        assert_eq!(err.code, codes::OUT_OF_RANGE);
        assert!(driver.open_input(5).is_err());
    }

    #[test]
    fn nth_call_fault_fires_once() {
        let driver = VirtualDriver::new();
        driver.fail_nth(DriverOp::InputCount, 2, 0x77);
        assert!(driver.input_count().is_ok());
        assert_eq!(driver.input_count().unwrap_err().code, 0x77);
        assert!(driver.input_count().is_ok());

        driver.fail_nth(DriverOp::InputCount, 1, 0x78);
        driver.clear_fault(DriverOp::InputCount);
        assert!(driver.input_count().is_ok());
    }

    #[test]
    fn faults_can_be_cleared() {
        let driver = VirtualDriver::new();
        driver.fail_on(DriverOp::InputCount, 1);
        assert!(driver.input_count().is_err());
        driver.clear_faults();
        assert_eq!(driver.input_count().unwrap(), 1);
    }
}
