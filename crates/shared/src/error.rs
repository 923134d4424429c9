use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type PortalResult<T> = Result<T, PortalError>;

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("portal already exists for chat_id={chat_id} receiver={receiver:?}")]
    Conflict { chat_id: String, receiver: String },
    #[error("portal store unavailable: {0}")]
    Unavailable(#[source] BoxError),
    #[error("invalid portal record: {0}")]
    InvalidRecord(String),
    #[error("invalid portal key: {0}")]
    InvalidKey(String),
    #[error("portal store error: {0}")]
    Store(#[source] BoxError),
}

impl PortalError {
    pub fn unavailable(error: impl Into<BoxError>) -> Self {
        Self::Unavailable(error.into())
    }

    pub fn store(error: impl Into<BoxError>) -> Self {
        Self::Store(error.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
