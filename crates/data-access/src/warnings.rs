//! Once-per-Run Warnings

bitflags::bitflags! {
    /// Warning classes that are logged at most once per run
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WarningKind: u16 {
        const UNKNOWN_TRIGGER_SOURCE = 1 << 0;
        const FADC_MISSING           = 1 << 1;
        const ATWD_MISSING           = 1 << 2;
        const ATWD_SIZE              = 1 << 3;
        const MISSING_COMPRESS_BIT   = 1 << 4;
        const CORRUPT_HIT            = 1 << 5;
        const SN_FIFO_OVERFLOW       = 1 << 6;
        const MISSED_CAL_TRIGGER     = 1 << 7;
        const UNEXPECTED_COMPRESSION = 1 << 8;
    }
}

/// Which warnings have been issued in the current run.
///
/// Cleared on every run start.
#[derive(Debug, Clone, Copy, Default)]
pub struct WarningState {
    issued: WarningKind,
}

impl WarningState {
    /// True the first time `kind` is seen this run
    pub fn first(&mut self, kind: WarningKind) -> bool {
        if self.issued.contains(kind) {
            return false;
        }
        self.issued.insert(kind);
        true
    }

    pub fn issued(&self) -> WarningKind {
        self.issued
    }

    pub fn reset(&mut self) {
        self.issued = WarningKind::empty();
    }
}
