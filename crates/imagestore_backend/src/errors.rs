use thiserror;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    CoreError(#[from] imagestore_core::Error),

    #[error("objectstore error: {0}")]
    ObjectStoreError(#[from] imagestore_objectstore::Error),

    #[error("error serializing to value")]
    SerdeJsonError(#[from] serde_json::Error),
}

impl From<Error> for imagestore_core::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::CoreError(e) => e,
            Error::ObjectStoreError(imagestore_objectstore::Error::NotFound(k)) => {
                imagestore_core::Error::NotFound(k)
            }
            e => imagestore_core::Error::BackendError(format!("{e}")),
        }
    }
}

/// Replace a storage-level "not found" with a more specific error; other errors pass through.
pub(crate) fn or_else_not_found<T>(
    r: Result<T>,
    f: impl FnOnce() -> imagestore_core::Error,
) -> Result<T> {
    match r {
        Err(Error::ObjectStoreError(imagestore_objectstore::Error::NotFound(_))) => Err(f().into()),
        r => r,
    }
}
