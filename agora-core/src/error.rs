use thiserror::Error;

use crate::llm::LlmError;
use crate::platform::PlatformError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
