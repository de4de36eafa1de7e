//! Request buffering reverse proxy in front of the worker.
//!
//! Every inbound request is read completely into memory before the worker
//! is touched, then forwarded once the lifecycle controller reports it
//! healthy. Worker responses are relayed verbatim.

pub mod capture;
pub mod error;
pub mod forward;
pub mod router;

pub use capture::{BufferedRequest, CaptureOptions, FilePart, InboundBody, capture};
pub use error::{CaptureError, ForwardError, ProxyError};
pub use forward::{Forwarder, WorkerResponse};
pub use router::{ProxyState, SAMPLE_PATH, STATUS_PATH, app_router};
