/// Result alias that carries the custom [`StagelightError`] type.
pub type Result<T> = std::result::Result<T, StagelightError>;

/// Common error type for the core crate.
///
/// Every variant is local and recoverable: callers log it and keep the rig in
/// its last safe state.
#[derive(Debug, thiserror::Error)]
pub enum StagelightError {
    /// A fixed-capacity store (timeline entries, storyboard timelines) is full.
    #[error("channel {channel}: capacity of {capacity} exhausted")]
    CapacityExceeded { channel: u8, capacity: usize },
    /// An entry was appended with a time earlier than the previous entry.
    #[error("channel {channel}: entry at {time} ms precedes previous entry at {last} ms")]
    OrderViolation { channel: u8, time: u32, last: u32 },
    /// The storyboard produced nothing to play for two consecutive cycles.
    #[error("storyboard has nothing to play")]
    EmptyShow,
    /// The zero-crossing signal is outside the configured tolerance.
    #[error("mains input unstable (last half-cycle lasted {last_crossing_ticks} ticks)")]
    HardwareInputUnstable { last_crossing_ticks: u32 },
    /// Channel id outside 1-40.
    #[error("invalid channel {0}")]
    InvalidChannel(u8),
    /// Output index past the end of a board.
    #[error("{board} board has no output {index}")]
    InvalidOutput { board: &'static str, index: usize },
    /// An entry starts after the storyboard cycle ends, so it could never fire.
    #[error("channel {channel}: entry at {time} ms lies past the {duration} ms cycle")]
    EntryPastCycleEnd { channel: u8, time: u32, duration: u32 },
    /// Two timelines were registered for the same channel.
    #[error("channel {0} already has a timeline")]
    DuplicateChannel(u8),
    /// Configuration values that cannot drive the rig.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Free-form message, used for lock poisoning and similar conditions.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Wrapper around JSON (de)serialisation errors.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl StagelightError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for StagelightError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for StagelightError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
