use std::sync::atomic::{AtomicU64, Ordering};

/// Loop counters, shareable with whatever reports on them.
#[derive(Debug, Default)]
pub struct SharedDiagnostics {
    pub frames_processed: AtomicU64,
    pub frames_skipped: AtomicU64,
    pub commands_sent: AtomicU64,
    pub targets_acquired: AtomicU64,
    pub targets_lost: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiagnosticsSnapshot {
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub commands_sent: u64,
    pub targets_acquired: u64,
    pub targets_lost: u64,
}

impl SharedDiagnostics {
    pub fn record_frame(&self) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skip(&self) {
        self.frames_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send(&self) {
        self.commands_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_acquired(&self) {
        self.targets_acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lost(&self) {
        self.targets_lost.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            targets_acquired: self.targets_acquired.load(Ordering::Relaxed),
            targets_lost: self.targets_lost.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let diag = SharedDiagnostics::default();
        diag.record_frame();
        diag.record_frame();
        diag.record_send();
        diag.record_skip();
        diag.record_acquired();
        let snap = diag.snapshot();
        assert_eq!(snap.frames_processed, 2);
        assert_eq!(snap.commands_sent, 1);
        assert_eq!(snap.frames_skipped, 1);
        assert_eq!(snap.targets_acquired, 1);
        assert_eq!(snap.targets_lost, 0);
    }
}
