use bridge_core_types::ErrorResponse;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    /// The request was waiting for a script that will never load in this session.
    #[error("request for {path} was abandoned before its script loaded")]
    Abandoned { path: String },
    #[error("{0}")]
    Rejected(String),
}

impl From<TransformError> for ErrorResponse {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::Abandoned { .. } => {
                ErrorResponse::new(ErrorResponse::REQUEST_ABANDONED, err.to_string())
            }
            TransformError::Rejected(message) => ErrorResponse::adapter(message),
        }
    }
}
