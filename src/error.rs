// Error types shared by the sync pipeline and the process supervisor

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Can not receive user login: steamUser and steamPass are required in {0}")]
    MissingCredentials(PathBuf),

    #[error("Malformed credentials line {line_number} in {path:?}: expected key=value")]
    MalformedCredentialLine { path: PathBuf, line_number: usize },

    #[error("Invalid server parameters: {0}")]
    InvalidParameters(String),

    #[error("SteamCMD not available ({0})")]
    ToolUnavailable(PathBuf),

    #[error("Mod {name} ({content_id}) was not downloaded")]
    DownloadIncomplete { content_id: String, name: String },

    #[error("Mod {content_id} has an unusable folder name: {name:?}")]
    InvalidModName { content_id: String, name: String },

    #[error("{executable} not found ({path:?})")]
    ExecutableMissing { executable: String, path: PathBuf },

    #[error("Failed to start server process: {0}")]
    ProcessStart(String),

    #[error("Failed to kill server process: {0}")]
    ProcessKill(String),

    #[error("Server {0} is running, stop it first")]
    ServerRunning(String),

    #[error("Server is not running: {0}")]
    NotRunning(String),

    #[error("Server not found: {0}")]
    ServerNotFound(String),

    #[error("Game type '{0}' not found")]
    GameNotFound(String),

    #[error("A sync is already in progress for server {0}")]
    SyncInProgress(String),

    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
