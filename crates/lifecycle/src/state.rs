use std::fmt;

/// Worker state as derived from the platform and a health probe.
/// Never stored; every read queries again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Absent,
    Stopped,
    Running,
    HealthyRunning,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::HealthyRunning => "healthy_running",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
