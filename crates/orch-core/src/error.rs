use derive_more::From;
use orion_error::{ErrorCode, StructError, UvsReason};

use orch_schema::RequestError;

#[derive(Debug, Clone, PartialEq, thiserror::Error, From)]
pub enum CoreReason {
    #[error("invalid request")]
    InvalidRequest,
    #[error("schema logic error")]
    SchemaLogic,
    #[error("registry lookup error")]
    Registry,
    #[error("invariant violation")]
    Invariant,
    #[error("{0}")]
    Uvs(UvsReason),
}

impl ErrorCode for CoreReason {
    fn error_code(&self) -> i32 {
        match self {
            Self::InvalidRequest => 1001,
            Self::SchemaLogic => 1002,
            Self::Registry => 1003,
            Self::Invariant => 1004,
            Self::Uvs(u) => u.error_code(),
        }
    }
}

pub type CoreError = StructError<CoreReason>;
pub type CoreResult<T> = Result<T, CoreError>;

pub fn core_error_from_request_error(err: RequestError) -> CoreError {
    let reason = match err {
        RequestError::Invalid(_) => CoreReason::InvalidRequest,
        RequestError::Logic(_) => CoreReason::SchemaLogic,
    };
    StructError::from(reason).with_detail(err.to_string())
}
