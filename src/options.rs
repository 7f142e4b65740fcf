//! Construction options shared by conduits, transforms and adapters.

/// Default high-water mark for binary streams, in bytes.
pub const DEFAULT_HIGH_WATER_MARK: usize = 16 * 1024;

/// Default high-water mark for structured streams, in chunks.
pub const DEFAULT_STRUCTURED_HIGH_WATER_MARK: usize = 16;

/// Options accepted by every stream constructor.
///
/// The stream's mode (binary vs structured) is carried by its chunk type,
/// not by an option. Builder-style:
///
/// ```rust
/// # use gjoll::FlowOptions;
/// let options = FlowOptions::new().high_water_mark(64).name("frame-decoder");
/// assert_eq!(options.high_water_mark, Some(64));
/// ```
#[derive(Debug, Clone, Default)]
pub struct FlowOptions {
    /// Buffered weight above which `deliver` suspends the producer.
    /// Defaults to [`DEFAULT_HIGH_WATER_MARK`] for binary streams and
    /// [`DEFAULT_STRUCTURED_HIGH_WATER_MARK`] for structured streams.
    pub high_water_mark: Option<usize>,
    /// Diagnostic name, used as the `stage` field on trace events and
    /// metric labels. Never affects behaviour.
    pub name: Option<String>,
}

impl FlowOptions {
    /// Create options with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the high-water mark (weight units: bytes or chunks).
    pub fn high_water_mark(mut self, weight: usize) -> Self {
        self.high_water_mark = Some(weight);
        self
    }

    /// Set the diagnostic stage name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}
