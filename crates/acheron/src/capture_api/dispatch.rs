use std::sync::Weak;

use acheron_capture::prelude::*;

use super::session::SessionShared;

/// Receives driver callbacks and forwards them to the owning session.
///
/// Holds only a weak reference: a callback that outlives its session finds nothing to upgrade
/// and is dropped. Events for a handle other than the session's current one are dropped by the
/// session itself.
pub struct CallbackDispatcher {
    session: Weak<SessionShared>,
}

impl CallbackDispatcher {
    pub(crate) fn new(session: Weak<SessionShared>) -> Self {
        Self { session }
    }

    fn session(&self) -> Option<std::sync::Arc<SessionShared>> {
        let session = self.session.upgrade();
        if session.is_none() {
            tracing::trace!("driver callback after session was dropped");
        }
        session
    }
}

impl DriverEvents for CallbackDispatcher {
    fn frame_captured(&self, handle: InputHandle, buffer: DriverPtr) {
        if let Some(session) = self.session() {
            session.frame_completed(Some(handle), buffer);
        }
    }

    fn mode_changed(&self, handle: InputHandle, mode: ModeInfo) {
        if let Some(session) = self.session() {
            session.mode_changed(Some(handle), mode);
        }
    }

    fn no_signal(&self, handle: InputHandle) {
        if let Some(session) = self.session() {
            session.no_signal(Some(handle));
        }
    }

    fn invalid_signal(&self, handle: InputHandle, clocks: SignalClocks) {
        if let Some(session) = self.session() {
            session.invalid_signal(Some(handle), clocks);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture_api::{CaptureSession, SessionConfig};

    #[test]
    fn frames_from_a_closed_handle_are_stale_after_restart() {
        let driver = std::sync::Arc::new(VirtualDriver::new());
        let (sink, frames) = QueueSink::new(4);
        let session = CaptureSession::new(
            driver.clone(),
            std::sync::Arc::new(sink),
            SessionConfig::default().pool_size(3).internal_size(16, 16),
        );
        session.start().unwrap();
        let old = session.input_handle().unwrap();
        session.stop();
        session.start().unwrap();
        let current = session.input_handle().unwrap();
        assert_ne!(old, current);

        let dispatcher = session.dispatcher();
        for buffer in session.buffers() {
            dispatcher.frame_captured(old, buffer.driver_ptr);
        }

        let stats = session.stats();
        assert_eq!(stats.counters.stale, 3);
        assert_eq!(stats.counters.published, 0);
        assert!(frames.is_empty());
        assert!(
            session
                .buffers()
                .iter()
                .all(|b| b.state == BufferState::Submitted && b.update_count == 0)
        );

        dispatcher.frame_captured(current, session.buffers()[0].driver_ptr);
        assert_eq!(session.stats().counters.published, 1);
    }

    #[test]
    fn orphaned_dispatcher_drops_events() {
        let dispatcher = CallbackDispatcher::new(Weak::new());
        let storage = FrameStorage::zeroed(16).unwrap();
        let handle = InputHandle::from_raw(1);
        dispatcher.frame_captured(handle, storage.driver_ptr());
        dispatcher.no_signal(handle);
        dispatcher.invalid_signal(handle, SignalClocks::default());
        dispatcher.mode_changed(
            handle,
            ModeInfo {
                width: 640,
                height: 480,
                refresh_millihz: 60_000,
            },
        );
    }
}
