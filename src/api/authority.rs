//! Caller authority
//!
//! Migration rewrites every affected document, so only a migrator may
//! start it. Viewers may read progress.

use std::fmt;

/// Something a caller asks the service to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ReadProgress,
    Scan,
    Migrate,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::ReadProgress => "read_progress",
            Action::Scan => "scan",
            Action::Migrate => "migrate",
        }
    }

    /// Scans hold the orchestrator lock and touch every document.
    fn needs_migrator(self) -> bool {
        !matches!(self, Action::ReadProgress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Viewer,
    Migrator,
}

impl Role {
    pub fn permits(self, action: Action) -> bool {
        self == Role::Migrator || !action.needs_migrator()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Viewer => "viewer",
            Role::Migrator => "migrator",
        })
    }
}

/// Who is asking, and with which role. The name ends up in request logs.
#[derive(Debug, Clone)]
pub struct Caller {
    pub role: Role,
    name: Option<String>,
}

impl Caller {
    pub fn viewer() -> Self {
        Self {
            role: Role::Viewer,
            name: None,
        }
    }

    pub fn migrator(name: impl Into<String>) -> Self {
        Self {
            role: Role::Migrator,
            name: Some(name.into()),
        }
    }

    pub fn permits(&self, action: Action) -> bool {
        self.role.permits(action)
    }

    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("anonymous")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewer_may_only_read() {
        let viewer = Caller::viewer();
        assert!(viewer.permits(Action::ReadProgress));
        assert!(!viewer.permits(Action::Scan));
        assert!(!viewer.permits(Action::Migrate));
        assert_eq!(viewer.label(), "anonymous");
    }

    #[test]
    fn test_migrator_may_do_everything() {
        let migrator = Caller::migrator("admin@example.com");
        for action in [Action::ReadProgress, Action::Scan, Action::Migrate] {
            assert!(migrator.permits(action), "{}", action.as_str());
        }
        assert_eq!(migrator.label(), "admin@example.com");
        assert_eq!(migrator.role.to_string(), "migrator");
    }
}
