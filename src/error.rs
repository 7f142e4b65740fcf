//! Gjoll error types

/// Gjoll error types
///
/// Errors are `Clone` because one terminal failure settles every future
/// waiting on a stage (end/flush gates, pending acquires, parked delivers)
/// and then travels downstream through welds and compounds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GjollError {
    /// The underlying source reported a failure. Terminal for every
    /// downstream stage.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// A user transform or flush function failed. Terminal; the pump or
    /// submit loop stops and the error is surfaced exactly once.
    #[error("transform failed: {0}")]
    Transform(String),

    /// The caller broke the flow-control protocol (e.g. a second acquire
    /// issued before the previous one settled, or an acquire on a
    /// terminated stream that still holds pushed-back data).
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A chunk was delivered after the input side was closed.
    #[error("stream closed")]
    Closed,
}

impl GjollError {
    /// Upstream source failure with a descriptive message.
    pub fn upstream(message: impl Into<String>) -> Self {
        GjollError::Upstream(message.into())
    }

    /// User transform failure with a descriptive message.
    pub fn transform(message: impl Into<String>) -> Self {
        GjollError::Transform(message.into())
    }

    /// Flow-control protocol violation.
    pub fn protocol(message: impl Into<String>) -> Self {
        GjollError::Protocol(message.into())
    }
}

/// Result type alias for gjoll operations
pub type Result<T> = std::result::Result<T, GjollError>;
