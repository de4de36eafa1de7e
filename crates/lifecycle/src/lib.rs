//! Lifecycle of the single worker container: provisioning, health polling
//! and idle shutdown.

pub mod controller;
pub mod error;
pub mod health;
pub mod reaper;
pub mod state;

pub use controller::{ControllerSettings, LifecycleController, ReapOutcome};
pub use error::LifecycleError;
pub use health::{HealthProbe, HealthTimeout, HttpHealthProbe, poll_health};
pub use reaper::IdleReaper;
pub use state::WorkerState;
