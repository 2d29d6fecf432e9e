use acheron_capture::prelude::*;

/// Physical condition of the input signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SignalState {
    Active,
    Inactive,
    Invalid,
}

impl SignalState {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalState::Active => "active",
            SignalState::Inactive => "inactive",
            SignalState::Invalid => "invalid",
        }
    }
}

/// Signal condition plus the resolution the driver last negotiated for it.
///
/// Only driver notifications move it; repeated identical notifications are applied again.
///
/// # Example
/// ```rust
/// use acheron::prelude::*;
///
/// let mut signal = SignalStateMachine::seeded(&SignalInfo::none());
/// assert_eq!(signal.state(), SignalState::Inactive);
/// signal.on_mode_changed(ModeInfo { width: 1920, height: 1080, refresh_millihz: 60_000 });
/// assert_eq!(signal.state(), SignalState::Active);
/// assert_eq!(signal.physical_size(), Some((1920, 1080)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalStateMachine {
    state: SignalState,
    mode: Option<ModeInfo>,
    negotiated: Option<(u32, u32)>,
    clocks: Option<SignalClocks>,
}

impl SignalStateMachine {
    /// Initial state from the synchronous signal query made before callbacks are registered.
    pub fn seeded(info: &SignalInfo) -> Self {
        let (state, mode) = match info.kind {
            SignalType::NoSignal => (SignalState::Inactive, None),
            SignalType::OutOfRange => (SignalState::Invalid, None),
            _ => (
                SignalState::Active,
                Some(ModeInfo {
                    width: info.width,
                    height: info.height,
                    refresh_millihz: info.refresh_millihz,
                }),
            ),
        };
        Self {
            state,
            mode,
            negotiated: None,
            clocks: None,
        }
    }

    pub fn state(&self) -> SignalState {
        self.state
    }

    /// Resolution of the physical signal, when one is active.
    pub fn physical_size(&self) -> Option<(u32, u32)> {
        self.mode.map(|m| (m.width, m.height))
    }

    pub fn mode(&self) -> Option<ModeInfo> {
        self.mode
    }

    /// Capture size last applied to the driver after a mode change.
    pub fn negotiated_size(&self) -> Option<(u32, u32)> {
        self.negotiated
    }

    /// Clock measurements from the last invalid-signal notification.
    pub fn invalid_clocks(&self) -> Option<SignalClocks> {
        self.clocks
    }

    pub fn on_mode_changed(&mut self, mode: ModeInfo) {
        self.state = SignalState::Active;
        self.mode = Some(mode);
        self.clocks = None;
    }

    pub fn on_no_signal(&mut self) {
        self.state = SignalState::Inactive;
        self.mode = None;
    }

    pub fn on_invalid_signal(&mut self, clocks: SignalClocks) {
        self.state = SignalState::Invalid;
        self.mode = None;
        self.clocks = Some(clocks);
    }

    pub fn set_negotiated(&mut self, width: u32, height: u32) {
        self.negotiated = Some((width, height));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(kind: SignalType) -> SignalInfo {
        SignalInfo {
            kind,
            width: 800,
            height: 600,
            refresh_millihz: 75_000,
        }
    }

    #[test]
    fn seeding_follows_the_signal_type() {
        assert_eq!(
            SignalStateMachine::seeded(&info(SignalType::Vga)).state(),
            SignalState::Active
        );
        assert_eq!(
            SignalStateMachine::seeded(&info(SignalType::OutOfRange)).state(),
            SignalState::Invalid
        );
        let lost = SignalStateMachine::seeded(&info(SignalType::NoSignal));
        assert_eq!(lost.state(), SignalState::Inactive);
        assert_eq!(lost.physical_size(), None);
    }

    #[test]
    fn notifications_drive_transitions() {
        let mut signal = SignalStateMachine::seeded(&info(SignalType::Dvi));
        signal.on_no_signal();
        signal.on_no_signal();
        assert_eq!(signal.state(), SignalState::Inactive);

        let clocks = SignalClocks {
            horizontal: 31_469,
            vertical: 59_940,
        };
        signal.on_invalid_signal(clocks);
        assert_eq!(signal.state(), SignalState::Invalid);
        assert_eq!(signal.invalid_clocks(), Some(clocks));

        signal.on_mode_changed(ModeInfo {
            width: 1280,
            height: 1024,
            refresh_millihz: 60_020,
        });
        assert_eq!(signal.state(), SignalState::Active);
        assert_eq!(signal.invalid_clocks(), None);
        assert_eq!(signal.physical_size(), Some((1280, 1024)));
    }
}
