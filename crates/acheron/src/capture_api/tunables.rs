use std::sync::OnceLock;

use parking_lot::Mutex;

/// Default number of buffers chained per session.
pub const DEFAULT_POOL_SIZE: usize = 3;
/// Default frame-drop policy (deliver every frame).
pub const DEFAULT_FRAME_DROPPING: u32 = 0;
/// Largest pool a session will allocate.
pub const MAX_POOL_SIZE: usize = 8;

/// Process-wide defaults picked up by [`SessionConfig::default`](super::SessionConfig).
///
/// # Example
/// ```rust
/// use acheron::prelude::*;
///
/// set_capture_tunables(CaptureTunables {
///     pool_size: 4,
///     frame_dropping: 1,
/// });
/// assert_eq!(SessionConfig::default().pool_size, 4);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CaptureTunables {
    pub pool_size: usize,
    pub frame_dropping: u32,
}

impl Default for CaptureTunables {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            frame_dropping: DEFAULT_FRAME_DROPPING,
        }
    }
}

impl CaptureTunables {
    fn sanitized(self) -> Self {
        Self {
            pool_size: self.pool_size.clamp(1, MAX_POOL_SIZE),
            frame_dropping: self.frame_dropping,
        }
    }
}

static CAPTURE_TUNABLES: OnceLock<Mutex<CaptureTunables>> = OnceLock::new();

/// Override capture tunables process-wide. Sessions already configured keep their values.
pub fn set_capture_tunables(tunables: CaptureTunables) {
    let lock = CAPTURE_TUNABLES.get_or_init(|| Mutex::new(CaptureTunables::default()));
    *lock.lock() = tunables.sanitized();
}

pub(crate) fn capture_tunables() -> CaptureTunables {
    CAPTURE_TUNABLES
        .get()
        .map(|t| *t.lock())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_size_is_clamped() {
        let t = CaptureTunables {
            pool_size: 0,
            frame_dropping: 2,
        }
        .sanitized();
        assert_eq!(t.pool_size, 1);
        let t = CaptureTunables {
            pool_size: 64,
            frame_dropping: 0,
        }
        .sanitized();
        assert_eq!(t.pool_size, MAX_POOL_SIZE);
    }
}
