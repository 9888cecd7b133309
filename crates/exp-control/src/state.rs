//! DOM run state

use serde::{Deserialize, Serialize};

/// Acquisition state of the DOM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    FlasherRunning,
    PedestalCollecting,
}

impl RunState {
    /// Byte reported by the DOM state query
    pub fn code(self) -> u8 {
        match self {
            RunState::Idle => 0,
            RunState::Running => 1,
            RunState::FlasherRunning => 2,
            RunState::PedestalCollecting => 3,
        }
    }

    /// Normal or flasher run
    pub fn is_run(self) -> bool {
        matches!(self, RunState::Running | RunState::FlasherRunning)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Running => "run in progress",
            RunState::FlasherRunning => "flasher run in progress",
            RunState::PedestalCollecting => "collecting pedestals",
        };
        f.write_str(s)
    }
}
