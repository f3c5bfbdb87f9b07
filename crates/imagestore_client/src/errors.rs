use thiserror;

use imagestore_core::Error as CoreError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    CoreError(#[from] CoreError),

    #[error("io error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("hyper error: {0}")]
    HyperError(#[from] hyper::Error),

    #[error("http error: {0}")]
    HTTPError(#[from] http::Error),

    #[error("invalid uri: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),

    #[error("unexpected response status {0}: {1}")]
    UnexpectedStatus(http::StatusCode, String),
}

impl Error {
    /// The registry-level error behind this failure, if there is one.
    pub fn core(&self) -> Option<&CoreError> {
        match self {
            Error::CoreError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Error> for CoreError {
    fn from(e: Error) -> CoreError {
        match e {
            Error::CoreError(e) => e,
            e => CoreError::BackendError(format!("{e}")),
        }
    }
}
