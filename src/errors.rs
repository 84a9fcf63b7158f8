use thiserror::Error;

use crate::state::Phase;

pub type Result<T> = std::result::Result<T, ProfileError>;

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("No authenticated session")]
    MissingSession,
    #[error("Screen is busy: {0:?}")]
    Busy(Phase),
    #[error("Gateway error: {0} {1}")]
    Gateway(String, String),
    #[error("Unexpected status {0}: {1}")]
    Status(u16, String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
    #[error("Parsing error")]
    Parse,
    #[error("Operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for ProfileError {
    fn from(_: serde_json::Error) -> Self {
        Self::Parse
    }
}
