use std::io;
use std::sync::Arc;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/**
 * Outcome of any client operation that did not produce a reply payload
 */
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Request arrived while the client was waiting to reconnect
    #[error("not connected to server")]
    NotConnected,

    /// Request was in flight (or queued) when the client shut down
    #[error("operation canceled")]
    Canceled,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Server answered `ERR <reason>`
    #[error("server returned {0}")]
    Server(String),

    #[error("transport error: {0}")]
    Transport(Arc<io::Error>),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Transport(Arc::new(err))
    }
}

impl Error {
    /**
     * Fatal errors poison the connection they came from; it is dropped and redialed
     */
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Protocol(_) | Error::Transport(_))
    }
}

/**
 * Malformed server input detected by the tokenizer or reply parser
 */
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("missing \"")]
    UnterminatedQuote,

    #[error("{expected} expected")]
    UnexpectedPrefix { expected: String },

    #[error("missing value")]
    MissingValue,

    #[error("unexpected end of reply")]
    UnexpectedEnd,

    #[error("reply line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Error::NotConnected, false)]
    #[case(Error::Canceled, false)]
    #[case(Error::Server("UNKNOWN-UPS".to_owned()), false)]
    #[case(Error::Protocol(ProtocolError::MissingValue), true)]
    #[case(Error::from(io::Error::from(io::ErrorKind::UnexpectedEof)), true)]
    fn should_classify_fatal_errors(#[case] err: Error, #[case] fatal: bool) {
        assert_eq!(fatal, err.is_fatal())
    }

    #[test]
    fn should_name_expected_prefix() {
        let err = ProtocolError::UnexpectedPrefix { expected: "BEGIN LIST VAR ups".to_owned() };
        assert_eq!("BEGIN LIST VAR ups expected", err.to_string())
    }
}
