use serde::{Deserialize, Serialize};
use thiserror;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid digest: {0}")]
    InvalidDigest(String),
    #[error("unsupported digest algorithm: {0}")]
    UnsupportedDigestAlgorithm(String),

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("digest is ambiguous: {0}")]
    Ambiguous(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("already exists: {0}")]
    Conflict(String),

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("chunk exceeds maximum size of {0} bytes")]
    ChunkTooLarge(u64),

    #[error("backend error: {0}")]
    BackendError(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl Error {
    /// The wire-level code describing this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidDigest(_) | Error::UnsupportedDigestAlgorithm(_) => {
                ErrorCode::DigestInvalid
            }
            Error::InvalidReference(_) => ErrorCode::ReferenceInvalid,
            Error::InvalidManifest(_) => ErrorCode::ManifestInvalid,
            Error::NotFound(_) => ErrorCode::NotFound,
            Error::Ambiguous(_) => ErrorCode::Ambiguous,
            Error::DigestMismatch { .. } => ErrorCode::DigestMismatch,
            Error::Conflict(_) => ErrorCode::Conflict,
            Error::Integrity(_) => ErrorCode::Integrity,
            Error::ChunkTooLarge(_) => ErrorCode::SizeInvalid,
            Error::BackendError(_) => ErrorCode::Internal,
            Error::Cancelled => ErrorCode::Cancelled,
            Error::DeadlineExceeded => ErrorCode::DeadlineExceeded,
        }
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Identifiers carried in [`ErrorResponse`] payloads exchanged over the transfer channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    DigestInvalid,
    ReferenceInvalid,
    ManifestInvalid,
    NotFound,
    Ambiguous,
    DigestMismatch,
    Conflict,
    Integrity,
    SizeInvalid,
    Internal,
    Cancelled,
    DeadlineExceeded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Structured error body returned with every non-200 response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorInfo>,
}

impl From<&Error> for ErrorResponse {
    fn from(e: &Error) -> ErrorResponse {
        ErrorResponse {
            errors: vec![ErrorInfo {
                code: e.code(),
                message: format!("{e}"),
            }],
        }
    }
}

impl From<ErrorResponse> for Error {
    fn from(r: ErrorResponse) -> Error {
        let info = match r.errors.into_iter().next() {
            Some(info) => info,
            None => return Error::BackendError(String::from("empty error response")),
        };
        let msg = info.message;
        match info.code {
            ErrorCode::DigestInvalid => Error::InvalidDigest(msg),
            ErrorCode::ReferenceInvalid => Error::InvalidReference(msg),
            ErrorCode::ManifestInvalid => Error::InvalidManifest(msg),
            ErrorCode::NotFound => Error::NotFound(msg),
            ErrorCode::Ambiguous => Error::Ambiguous(msg),
            // the remote side already rendered both digests into the message
            ErrorCode::DigestMismatch => Error::DigestMismatch {
                expected: String::new(),
                actual: msg,
            },
            ErrorCode::Conflict => Error::Conflict(msg),
            ErrorCode::Integrity => Error::Integrity(msg),
            ErrorCode::SizeInvalid => Error::BackendError(msg),
            ErrorCode::Internal => Error::BackendError(msg),
            ErrorCode::Cancelled => Error::Cancelled,
            ErrorCode::DeadlineExceeded => Error::DeadlineExceeded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_preserves_kind() {
        let original = Error::Ambiguous(String::from("sha256:ab"));
        let response = ErrorResponse::from(&original);
        let body = serde_json::to_string(&response).unwrap();
        assert!(body.contains("\"AMBIGUOUS\""));

        let decoded: ErrorResponse = serde_json::from_str(&body).unwrap();
        match Error::from(decoded) {
            Error::Ambiguous(msg) => assert!(msg.contains("sha256:ab")),
            e => panic!("unexpected error {e:?}"),
        }
    }

    #[test]
    fn empty_error_response_is_backend_error() {
        let e = Error::from(ErrorResponse { errors: vec![] });
        assert!(matches!(e, Error::BackendError(_)));
    }
}
