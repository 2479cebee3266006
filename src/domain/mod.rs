//! Session aggregation core.
//!
//! ```text
//! OTLP envelope ──▶ pipeline ──▶ registry (get-or-create) ──▶ session
//!                      │                                        │
//!                 events/metrics                           Langfuse sink
//!                   (mappers)                          (traces, generations,
//!                                                        events, scores)
//! ```

pub mod events;
pub mod metrics;
pub mod otlp;
pub mod pipeline;
pub mod registry;
pub mod session;
