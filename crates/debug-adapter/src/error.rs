use bridge_core_types::ErrorResponse;
use cdp_adapter::CdpError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("not attached to a target")]
    NotAttached,
    #[error("already attached to a target")]
    AlreadyAttached,
    #[error("the target is not paused")]
    NotPaused,
    #[error("launching is not supported; use attach")]
    LaunchUnsupported,
    #[error("target connection failed: {0}")]
    Connection(#[from] CdpError),
    #[error("no script is known for {0}")]
    UnknownScript(String),
    #[error("invalid reference {0}")]
    InvalidHandle(i64),
    #[error("{0} timed out")]
    Timeout(&'static str),
    #[error("{0}")]
    Evaluation(String),
}

impl AdapterError {
    /// Client-facing error id.
    pub fn code(&self) -> i64 {
        match self {
            AdapterError::NotAttached => 2002,
            AdapterError::AlreadyAttached => 2003,
            AdapterError::NotPaused => 2004,
            AdapterError::LaunchUnsupported => 2005,
            AdapterError::Connection(_) => 2006,
            AdapterError::UnknownScript(_) => 2007,
            AdapterError::InvalidHandle(_) => 2008,
            AdapterError::Timeout(_) => 2009,
            AdapterError::Evaluation(_) => 2010,
        }
    }
}

impl From<AdapterError> for ErrorResponse {
    fn from(err: AdapterError) -> Self {
        ErrorResponse::new(err.code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_to_client_error() {
        let response = ErrorResponse::from(AdapterError::LaunchUnsupported);
        assert_eq!(response.id, 2005);
        assert_eq!(response.format, "launching is not supported; use attach");

        let response = ErrorResponse::from(AdapterError::Connection(CdpError::Closed));
        assert!(response.format.starts_with("target connection failed"));
    }
}
