//! HTTP request handlers for the courier ingress.
//!
//! - `ingest` - the fallback relay handler that queues every inbound request
//! - `health` - service probes mounted under `/_courier`

pub mod health;
pub mod ingest;

pub use health::{health_check, liveness_check};
pub use ingest::relay_request;
