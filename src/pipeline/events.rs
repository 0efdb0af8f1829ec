use uuid::Uuid;

use crate::models::{CycleStatus, ScanErrorKind, ScanTarget};

/// Progress messages sent from the orchestrator to a live display.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// Target list built, dispatch about to begin
    CycleStarted {
        cycle_id: Uuid,
        targets_total: usize,
    },
    /// A worker began scanning a target
    TargetStarted {
        target: ScanTarget,
    },
    /// A target finished without error
    TargetCompleted {
        target: ScanTarget,
        resources_scanned: usize,
        findings: usize,
        duration_ms: u64,
    },
    /// A target produced a scan error
    TargetFailed {
        target: ScanTarget,
        kind: ScanErrorKind,
        error: String,
    },
    /// The cycle reached a terminal state
    CycleCompleted {
        status: CycleStatus,
        total_findings: usize,
        total_monthly_savings: f64,
        duration_ms: u64,
    },
}
