use axum::response::{IntoResponse, Response};
use http::StatusCode;
use thiserror;

use imagestore_core::Error as CoreError;
use imagestore_core::ErrorResponse;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("http invalid header value")]
    HTTPInvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("missing path parameter: {0}")]
    MissingPathParameter(&'static str),

    #[error("invalid path parameter {0}: {1}")]
    InvalidPathParameter(&'static str, String),

    #[error("{0}")]
    ImagestoreCoreError(#[from] CoreError),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::ImagestoreCoreError(e) => core_error_to_response(e),
            Error::MissingPathParameter(_) | Error::InvalidPathParameter(..) => {
                (StatusCode::BAD_REQUEST, format!("{}", self)).into_response()
            }
            Error::HTTPInvalidHeaderValue(_) => {
                tracing::warn!("{:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    String::from("internal server error"),
                )
                    .into_response()
            }
        }
    }
}

#[inline]
fn core_error_to_response(e: CoreError) -> Response {
    let status_code = status_code(&e);
    if status_code.is_server_error() {
        tracing::warn!("{e}");
    } else {
        tracing::debug!("{e}");
    }
    (status_code, axum::Json(ErrorResponse::from(&e))).into_response()
}

#[inline]
pub(crate) fn status_code(e: &CoreError) -> StatusCode {
    match e {
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::Ambiguous(_) => StatusCode::BAD_REQUEST,
        CoreError::DigestMismatch { .. } => StatusCode::BAD_REQUEST,
        CoreError::InvalidDigest(_) => StatusCode::BAD_REQUEST,
        CoreError::UnsupportedDigestAlgorithm(_) => StatusCode::BAD_REQUEST,
        CoreError::InvalidReference(_) => StatusCode::BAD_REQUEST,
        CoreError::InvalidManifest(_) => StatusCode::BAD_REQUEST,
        CoreError::ChunkTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        CoreError::Conflict(_) => StatusCode::CONFLICT,
        CoreError::Integrity(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CoreError::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CoreError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        CoreError::DeadlineExceeded => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use imagestore_core::ErrorCode;

    use super::*;

    #[rstest]
    #[case::not_found(CoreError::NotFound(String::from("foo")), StatusCode::NOT_FOUND, ErrorCode::NotFound)]
    #[case::ambiguous(CoreError::Ambiguous(String::from("sha256:ab")), StatusCode::BAD_REQUEST, ErrorCode::Ambiguous)]
    #[case::bad_digest(CoreError::InvalidDigest(String::from("sha256:zz")), StatusCode::BAD_REQUEST, ErrorCode::DigestInvalid)]
    #[case::mismatch(CoreError::DigestMismatch {
        expected: String::from("sha256:aa"),
        actual: String::from("sha256:bb"),
    }, StatusCode::BAD_REQUEST, ErrorCode::DigestMismatch)]
    #[case::too_large(CoreError::ChunkTooLarge(4), StatusCode::PAYLOAD_TOO_LARGE, ErrorCode::SizeInvalid)]
    #[case::conflict(CoreError::Conflict(String::from("blob")), StatusCode::CONFLICT, ErrorCode::Conflict)]
    #[case::integrity(CoreError::Integrity(String::from("chunk")), StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Integrity)]
    #[case::backend(CoreError::BackendError(String::from("disk")), StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Internal)]
    #[case::cancelled(CoreError::Cancelled, StatusCode::SERVICE_UNAVAILABLE, ErrorCode::Cancelled)]
    #[case::deadline(CoreError::DeadlineExceeded, StatusCode::SERVICE_UNAVAILABLE, ErrorCode::DeadlineExceeded)]
    #[tokio::test]
    async fn core_errors_map_to_status_and_body(
        #[case] e: CoreError,
        #[case] status: StatusCode,
        #[case] code: ErrorCode,
    ) {
        assert_eq!(status_code(&e), status);

        let response = Error::from(e).into_response();
        assert_eq!(response.status(), status);
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let body: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.errors.len(), 1);
        assert_eq!(body.errors[0].code, code);
    }

    #[rstest]
    #[case::missing(Error::MissingPathParameter("name"))]
    #[case::invalid(Error::InvalidPathParameter("reference", String::from("??")))]
    fn path_parameter_errors_are_bad_requests(#[case] e: Error) {
        assert_eq!(e.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
