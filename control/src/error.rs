use std::time::Duration;
use thiserror::Error;

/// Gatehouse errors
///
/// `Denied` carries a policy violation whose text is returned to the client
/// unchanged. Every other variant is an operational failure.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Denied(String),

    #[error("Kubernetes error: {0}")]
    Kubernetes(String),

    #[error("data plane error: {0}")]
    DataPlane(String),

    #[error("admission check for {kind} timed out after {timeout:?}")]
    Timeout { kind: String, timeout: Duration },

    #[error("failed to decode admission object: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<kube::Error> for Error {
    fn from(e: kube::Error) -> Self {
        Error::Kubernetes(e.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
