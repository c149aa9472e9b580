/// Result alias that carries the custom [`SpectrumViewError`] type.
pub type Result<T> = std::result::Result<T, SpectrumViewError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum SpectrumViewError {
    /// Free-form failure, mostly poisoned shared state.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// A wire message that could not be encoded or decoded.
    #[error("malformed message: {0}")]
    Decode(#[from] serde_json::Error),
    /// Rejected rendering options.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

impl SpectrumViewError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for SpectrumViewError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for SpectrumViewError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
