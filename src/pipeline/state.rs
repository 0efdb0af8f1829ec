use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::IdlescanError;
use crate::models::{CycleStatus, ScanError, ScanErrorKind};

/// Live view of the cycle an orchestrator is running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleState {
    pub cycle_id: Option<Uuid>,
    pub status: CycleStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub targets_total: usize,
    pub targets_started: usize,
    pub targets_completed: usize,
    pub targets_failed: usize,
}

impl CycleState {
    pub fn new() -> Self {
        Self {
            cycle_id: None,
            status: CycleStatus::Pending,
            started_at: None,
            targets_total: 0,
            targets_started: 0,
            targets_completed: 0,
            targets_failed: 0,
        }
    }

    /// Reset for a new cycle and enter `Running`.
    pub fn begin(&mut self, cycle_id: Uuid, targets_total: usize) -> Result<(), IdlescanError> {
        *self = Self::new();
        self.cycle_id = Some(cycle_id);
        self.started_at = Some(Utc::now());
        self.targets_total = targets_total;
        self.transition(CycleStatus::Running)
    }

    /// Move to `next`. Only `Pending → Running → terminal` is allowed.
    pub fn transition(&mut self, next: CycleStatus) -> Result<(), IdlescanError> {
        let allowed = match (self.status, next) {
            (CycleStatus::Pending, CycleStatus::Running) => true,
            (CycleStatus::Running, n) => n.is_terminal(),
            _ => false,
        };
        if !allowed {
            return Err(IdlescanError::Internal(format!(
                "Illegal cycle transition {} -> {}",
                self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

impl Default for CycleState {
    fn default() -> Self {
        Self::new()
    }
}

/// Terminal status for a cycle. Any error makes it `PartiallyFailed`, unless
/// no target completed and none was cut short by the budget, in which case
/// nothing could be processed at all and the cycle `Failed`.
pub fn terminal_status(targets_completed: usize, errors: &[ScanError]) -> CycleStatus {
    if errors.is_empty() {
        return CycleStatus::Completed;
    }
    let any_timeout = errors.iter().any(|e| e.kind == ScanErrorKind::Timeout);
    if targets_completed == 0 && !any_timeout {
        CycleStatus::Failed
    } else {
        CycleStatus::PartiallyFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ResourceKind, ScanTarget};

    fn error(kind: ScanErrorKind) -> ScanError {
        ScanError {
            target: ScanTarget::new("111111111111", "us-east-1", ResourceKind::Compute),
            kind,
            message: "boom".into(),
            retryable: false,
        }
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut state = CycleState::new();
        assert_eq!(state.status, CycleStatus::Pending);
        assert!(state.transition(CycleStatus::Completed).is_err());

        state.begin(Uuid::new_v4(), 3).unwrap();
        assert_eq!(state.status, CycleStatus::Running);
        assert_eq!(state.targets_total, 3);

        state.transition(CycleStatus::PartiallyFailed).unwrap();
        assert!(state.is_finished());
        assert!(state.transition(CycleStatus::Running).is_err());
    }

    #[test]
    fn test_begin_resets_previous_cycle() {
        let mut state = CycleState::new();
        state.begin(Uuid::new_v4(), 2).unwrap();
        state.targets_completed = 2;
        state.transition(CycleStatus::Completed).unwrap();

        state.begin(Uuid::new_v4(), 5).unwrap();
        assert_eq!(state.targets_completed, 0);
        assert_eq!(state.status, CycleStatus::Running);
    }

    #[test]
    fn test_terminal_status_rules() {
        assert_eq!(terminal_status(4, &[]), CycleStatus::Completed);
        assert_eq!(terminal_status(3, &[error(ScanErrorKind::Denied)]), CycleStatus::PartiallyFailed);
        assert_eq!(
            terminal_status(0, &[error(ScanErrorKind::Denied), error(ScanErrorKind::Denied)]),
            CycleStatus::Failed
        );
        assert_eq!(
            terminal_status(0, &[error(ScanErrorKind::Denied), error(ScanErrorKind::Timeout)]),
            CycleStatus::PartiallyFailed
        );
    }
}
