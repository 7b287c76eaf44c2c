//! Importer 에러 타입: 에러 종류를 구분하여 control API가
//! 적절한 HTTP 상태 코드와 에러 코드를 반환할 수 있게 합니다.

use axum::http::StatusCode;

use super::state::{ImportState, TransitionError};
use crate::launcher::LaunchError;

#[derive(thiserror::Error, Debug)]
pub enum ImportError {
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("An import is already in progress ({0})")]
    Busy(ImportState),

    #[error("Fetch failed: {0}")]
    FetchFailure(String),

    #[error("No game has been imported")]
    NoGame,

    #[error("Unsupported game type: {0}")]
    UnsupportedType(String),

    #[error("Failed to start game: {0}")]
    SpawnFailure(String),

    #[error("Launch failed: {0}")]
    Launch(LaunchError),

    #[error("{0}")]
    Internal(String),
}

impl ImportError {
    /// HTTP 상태 코드 매핑
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidSource(_) => StatusCode::BAD_REQUEST,
            Self::Busy(_) => StatusCode::CONFLICT,
            Self::FetchFailure(_) => StatusCode::BAD_GATEWAY,
            Self::NoGame => StatusCode::NOT_FOUND,
            Self::UnsupportedType(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::SpawnFailure(_) | Self::Launch(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// JSON 에러 응답 생성
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": self.to_string(),
            "error_code": self.error_code(),
        })
    }

    /// 머신 리더블 에러 코드
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidSource(_) => "INVALID_SOURCE",
            Self::Busy(_) => "BUSY",
            Self::FetchFailure(_) => "FETCH_FAILED",
            Self::NoGame => "NO_GAME",
            Self::UnsupportedType(_) => "UNSUPPORTED_TYPE",
            Self::SpawnFailure(_) => "SPAWN_FAILED",
            Self::Launch(_) => "LAUNCH_FAILED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<LaunchError> for ImportError {
    fn from(e: LaunchError) -> Self {
        match e {
            LaunchError::Unsupported(reason) => Self::UnsupportedType(reason),
            e @ LaunchError::SpawnFailure { .. } => Self::SpawnFailure(e.to_string()),
            other => Self::Launch(other),
        }
    }
}

impl From<TransitionError> for ImportError {
    fn from(e: TransitionError) -> Self {
        Self::Internal(e.to_string())
    }
}

/// axum 핸들러에서 ImportError를 직접 반환할 수 있도록 IntoResponse 구현
impl axum::response::IntoResponse for ImportError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = axum::Json(self.to_json());
        (status, body).into_response()
    }
}
