pub mod activity;
pub mod config;
pub mod env;
pub mod worker;

pub use activity::ActivityClock;
pub use config::{ConfigError, ManagerConfig, SERVICE_NAME};
pub use worker::{Endpoint, WorkerSpec};
