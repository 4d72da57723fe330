//! Observability for the IoT device gateway.
//!
//! - **Tracing**: structured logging through `tracing` and
//!   `tracing-subscriber`, as human-readable text or one JSON object per line

pub mod tracing_setup;

pub use tracing_setup::{init_tracing, LogFormat, TracingConfig};

/// Re-export tracing macros for convenience
pub use tracing::{debug, error, info, instrument, trace, warn, span, Level};
