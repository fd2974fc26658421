pub mod constants;
pub mod utility;

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Errors raised while building or running operator trees.
///
/// Nothing in the execution layer terminates the process on I/O failure;
/// every failure below travels up the operator tree as one of these.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// Invalid user or plan input, e.g. an unknown join attribute.
    InvalidInput(String),
    /// Invalid data, typically a malformed value or schema mismatch.
    InvalidData(String),
    /// An index was outside the bounds of a row or page.
    OutOfBounds,
    /// A child operator failed to open.
    SetupFailure(String),
    /// Writing a temp (spill) file failed.
    TempFileWrite(String),
    /// Reading a temp file failed, including short or truncated frames.
    TempFileRead(String),
    /// A page read back from a temp file could not be decoded.
    Deserialization(String),
    /// An operator tried to hold more pages than its buffer budget allows.
    BufferBudgetViolation { limit: usize, requested: usize },
    /// Settings could not be loaded.
    Config(String),
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Error::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            Error::OutOfBounds => write!(f, "out of bounds"),
            Error::SetupFailure(msg) => write!(f, "setup failure: {msg}"),
            Error::TempFileWrite(msg) => write!(f, "temp file write error: {msg}"),
            Error::TempFileRead(msg) => write!(f, "temp file read error: {msg}"),
            Error::Deserialization(msg) => write!(f, "deserialization error: {msg}"),
            Error::BufferBudgetViolation { limit, requested } => write!(
                f,
                "buffer budget violation: {requested} pages requested, budget is {limit}"
            ),
            Error::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

/// A rustyqp Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;

impl<T> From<Error> for Result<T> {
    fn from(error: Error) -> Self {
        Err(error)
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Deserialization(err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

/// Constructs an Error::InvalidInput for the given format string.
#[macro_export]
macro_rules! errinput {
    ($($args:tt)*) => { $crate::common::Error::InvalidInput(format!($($args)*)).into() };
}

/// Constructs an Error::InvalidData for the given format string.
#[macro_export]
macro_rules! errdata {
    ($($args:tt)*) => { $crate::common::Error::InvalidData(format!($($args)*)).into() };
}
