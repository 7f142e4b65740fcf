//! Telemetry metric name constants.
//!
//! Centralised metric names for gjoll stream stages. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `gjoll_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `stage` — the diagnostic name given in [`FlowOptions`](crate::FlowOptions)
//!   (`"conduit"` when unnamed)

/// Total chunks accepted by a stage's input side.
///
/// Labels: `stage`.
pub const CHUNKS_DELIVERED_TOTAL: &str = "gjoll_chunks_delivered_total";

/// Total chunk weight (bytes for binary streams, items for structured
/// streams) accepted by a stage's input side.
///
/// Labels: `stage`.
pub const WEIGHT_DELIVERED_TOTAL: &str = "gjoll_weight_delivered_total";

/// Total stages terminated by an error.
///
/// Labels: `stage`.
pub const STAGE_ERRORS_TOTAL: &str = "gjoll_stage_errors_total";

/// Total stages that reached natural end-of-stream (terminal marker
/// forwarded and drained).
///
/// Labels: `stage`.
pub const STREAMS_COMPLETED_TOTAL: &str = "gjoll_streams_completed_total";
