use thiserror::Error;

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or reading SIP messages
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The text could not be split into start line, headers and body
    #[error("Malformed SIP message: {0}")]
    MalformedMessage(String),

    /// CSeq header does not start with a sequence number
    #[error("Invalid CSeq header: {0}")]
    InvalidCSeq(String),

    /// Authentication challenge could not be understood
    #[error("Invalid authentication challenge: {0}")]
    InvalidChallenge(String),

    /// A required header is absent
    #[error("Missing header: {0}")]
    MissingHeader(String),
}

impl Error {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Error::MalformedMessage(reason.into())
    }
}
