//! Orchestrator state machine
//!
//! ```text
//! Idle ──► Scanning ──► ScanComplete ──► Migrating ──► MigrationComplete
//!   ▲          │             ▲   ▲            │    └──► MigrationPartial
//!   └──────────┘             │   └── paused ──┘
//!   scan failed              └── rescan from any terminal state
//! ```
//!
//! Every transition consumes the current state and either returns the
//! next one or an `InvalidTransition` error.

use serde::{Deserialize, Serialize};

use crate::errors::{MigrationError, MigrationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    #[default]
    Idle,
    Scanning,
    ScanComplete,
    Migrating,
    MigrationComplete,
    MigrationPartial,
}

impl OrchestratorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::ScanComplete => "scan_complete",
            Self::Migrating => "migrating",
            Self::MigrationComplete => "migration_complete",
            Self::MigrationPartial => "migration_partial",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::MigrationComplete | Self::MigrationPartial)
    }

    /// Idle | ScanComplete | terminal → Scanning
    pub fn begin_scan(self) -> MigrationResult<Self> {
        match self {
            Self::Idle | Self::ScanComplete | Self::MigrationComplete | Self::MigrationPartial => {
                Ok(Self::Scanning)
            }
            _ => Err(MigrationError::forbidden(self.as_str(), "scan")),
        }
    }

    /// Scanning → ScanComplete
    pub fn finish_scan(self) -> MigrationResult<Self> {
        match self {
            Self::Scanning => Ok(Self::ScanComplete),
            _ => Err(MigrationError::forbidden(self.as_str(), "finish a scan")),
        }
    }

    /// Scanning → Idle, after the store could not be enumerated
    pub fn fail_scan(self) -> MigrationResult<Self> {
        match self {
            Self::Scanning => Ok(Self::Idle),
            _ => Err(MigrationError::forbidden(self.as_str(), "fail a scan")),
        }
    }

    /// ScanComplete → Migrating
    pub fn begin_migration(self) -> MigrationResult<Self> {
        match self {
            Self::ScanComplete => Ok(Self::Migrating),
            _ => Err(MigrationError::forbidden(self.as_str(), "migrate")),
        }
    }

    /// Migrating → ScanComplete, between chunks of a paused job
    pub fn pause_migration(self) -> MigrationResult<Self> {
        match self {
            Self::Migrating => Ok(Self::ScanComplete),
            _ => Err(MigrationError::forbidden(self.as_str(), "pause")),
        }
    }

    /// Migrating → Idle, after an operation-level failure
    pub fn abort_migration(self) -> MigrationResult<Self> {
        match self {
            Self::Migrating => Ok(Self::Idle),
            _ => Err(MigrationError::forbidden(self.as_str(), "abort")),
        }
    }

    /// Migrating → MigrationComplete | MigrationPartial
    pub fn finish_migration(self, had_errors: bool) -> MigrationResult<Self> {
        match self {
            Self::Migrating if had_errors => Ok(Self::MigrationPartial),
            Self::Migrating => Ok(Self::MigrationComplete),
            _ => Err(MigrationError::forbidden(self.as_str(), "finish a migration")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrchestratorState::*;

    #[test]
    fn test_happy_path() {
        let state = Idle.begin_scan().unwrap().finish_scan().unwrap();
        assert_eq!(state, ScanComplete);
        let state = state.begin_migration().unwrap();
        assert_eq!(state.finish_migration(false).unwrap(), MigrationComplete);
        assert_eq!(Migrating.finish_migration(true).unwrap(), MigrationPartial);
    }

    #[test]
    fn test_rescan_from_terminal_states() {
        assert_eq!(MigrationComplete.begin_scan().unwrap(), Scanning);
        assert_eq!(MigrationPartial.begin_scan().unwrap(), Scanning);
        assert_eq!(ScanComplete.begin_scan().unwrap(), Scanning);
    }

    #[test]
    fn test_forbidden_transitions() {
        for err in [
            Idle.begin_migration().unwrap_err(),
            Scanning.begin_scan().unwrap_err(),
            Migrating.begin_scan().unwrap_err(),
            ScanComplete.finish_migration(false).unwrap_err(),
            Idle.finish_scan().unwrap_err(),
            Idle.pause_migration().unwrap_err(),
        ] {
            assert_eq!(err.code(), "BLOCKMARK_INVALID_STATE");
        }
    }

    #[test]
    fn test_recovery_transitions() {
        assert_eq!(Scanning.fail_scan().unwrap(), Idle);
        assert_eq!(Migrating.abort_migration().unwrap(), Idle);
        assert_eq!(Migrating.pause_migration().unwrap(), ScanComplete);
        assert!(MigrationPartial.is_terminal());
        assert!(!ScanComplete.is_terminal());
    }
}
