use std::error::Error as StdError;

use thiserror::Error;

/// The crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The crate-wide error type.
///
/// This is intentionally decoupled from `anyhow` so hosts aren't forced to
/// adopt `anyhow` in their own public APIs.
///
/// How variants surface:
/// - construction-time failures are reported to the MSS as `UnsupportedMediaFormat`
///   and returned to the caller
/// - runtime handler failures are reported to the MSS as `Other` and swallowed
/// - `EndOfStream` is an expected stop, never reported as a failure
#[derive(Debug, Error)]
pub enum Error {
    /// The input could not be opened or probed, or a required stream has no viable codec.
    #[error("unsupported media format: {0}")]
    UnsupportedMediaFormat(String),

    /// The host byte source failed a read or seek.
    #[error("external I/O error")]
    ExternalIo(#[source] std::io::Error),

    /// A seek target outside the container.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("end of stream")]
    EndOfStream,

    /// A single stream within an otherwise valid input can't be represented.
    #[error("unsupported stream {index}: {reason}")]
    UnsupportedStream { index: usize, reason: String },

    /// A stream descriptor that this adapter never registered.
    #[error("unknown stream descriptor")]
    UnknownStream,

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

impl Error {
    pub(crate) fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub(crate) fn unsupported_format(message: impl Into<String>) -> Self {
        Self::UnsupportedMediaFormat(message.into())
    }

    /// Whether this is the expected end-of-stream condition rather than a failure.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Message(format!("{err:#}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::ExternalIo(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(Box::new(err))
    }
}
