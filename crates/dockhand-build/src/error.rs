use dockhand_core::FailedStep;
use std::time::Duration;
use thiserror::Error;

/// コンテナエンジンが報告するエラー
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Docker connection error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("Build failed: {0}")]
    BuildFailed(String),

    #[error("Push failed: {message}")]
    PushFailed { message: String },

    #[error("Authentication failed for {registry}: {message}")]
    AuthFailed { registry: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// ジョブのフェーズを終わらせるエラー
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid file name in build context '{name}': {reason}")]
    InvalidFileName { name: String, reason: &'static str },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("{phase} timed out after {after:?}")]
    TimedOut { phase: FailedStep, after: Duration },

    #[error("{phase} cancelled: worker shutting down")]
    Cancelled { phase: FailedStep },
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;
pub type EngineResult<T> = std::result::Result<T, EngineError>;
