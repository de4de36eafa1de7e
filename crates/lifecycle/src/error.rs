use manager_core::Endpoint;

/// Failures to bring the worker up. Kept apart from anything the worker
/// itself returns so callers can answer 503 without forwarding.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LifecycleError {
    #[error("ProvisionFailed: {reason}")]
    ProvisionFailed { reason: String },
    #[error("StartupTimeout: worker at {endpoint} not healthy after {attempts} attempts")]
    StartupTimeout { attempts: u32, endpoint: Endpoint },
}

impl LifecycleError {
    pub fn provision(reason: impl std::fmt::Display) -> Self {
        Self::ProvisionFailed {
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProvisionFailed { .. } => "ProvisionFailed",
            Self::StartupTimeout { .. } => "StartupTimeout",
        }
    }
}
