use std::io;
use std::time::Duration;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The frame is not a well-formed envelope record.
    #[error("malformed envelope: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("frame exceeds maximum length ({0} bytes)")]
    FrameTooLong(usize),

    #[error("available types of messages: `message`, `command` or `clients` - invalid type `{0}` received")]
    Validation(String),

    #[error("failed to find client #{0}")]
    NotFound(String),

    #[error(transparent)]
    Transport(#[from] io::Error),

    #[error("connection already closed")]
    Closed,

    #[error("write did not complete within {0:?}")]
    WriteTimeout(Duration),
}

impl Error {
    /// Bad input and unknown recipients. The connection handler logs these
    /// and keeps reading; anything else ends the connection.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Decode(_) | Error::FrameTooLong(_) | Error::Validation(_) | Error::NotFound(_)
        )
    }
}
