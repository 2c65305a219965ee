use std::fmt;

use crate::arena::ArenaError;

#[derive(Debug, Clone)]
pub enum Error {
    InvalidData(String),
    InvalidConfig(String),
    InvalidShape(String),
    /// A serialized network or dataset file that does not match its layout.
    InvalidFormat(String),
    Io(String),
    /// The arena cannot hold the requested parameters.
    Arena(ArenaError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            Error::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Error::InvalidShape(msg) => write!(f, "invalid shape: {msg}"),
            Error::InvalidFormat(msg) => write!(f, "invalid format: {msg}"),
            Error::Io(msg) => write!(f, "i/o error: {msg}"),
            Error::Arena(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Arena(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ArenaError> for Error {
    fn from(err: ArenaError) -> Self {
        Error::Arena(err)
    }
}
