mod control;
mod manager;
mod serve;

pub use control::{status, stop};
pub use manager::{RunningManager, start};
pub use serve::serve;
