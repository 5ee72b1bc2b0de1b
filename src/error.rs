//! Error types and exit codes for debloat-engine

use std::process::ExitCode;
use thiserror::Error;

/// Main error type for debloat-engine operations
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid configuration: {message}")]
    ConfigError { message: String },

    #[error("Malformed report: {message}")]
    ReportError { message: String },

    #[error("Unsupported report schema version {found} (supported: {supported})")]
    SchemaVersionMismatch { found: u32, supported: u32 },

    #[error("Tool '{tool}' failed: {message}")]
    ToolError { tool: String, message: String },

    #[error("Git error: {message}")]
    GitError { message: String },

    #[error("Not a git repository")]
    NotGitRepo,

    #[error("Working tree has uncommitted changes; commit or stash before remediating")]
    DirtyWorkTree,

    #[error("Backup creation failed: {message}")]
    BackupFailed { message: String },

    #[error("Transaction log write failed: {message}")]
    AuditLogFailed { message: String },

    #[error("Scan cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl AuditError {
    /// Convert error to appropriate exit code:
    /// - 0: Success
    /// - 1: File not found / IO error
    /// - 2: Configuration error
    /// - 3: Report error / schema mismatch
    /// - 4: Tool failure
    /// - 5: Git error / VCS missing / dirty tree
    /// - 6: Backup or transaction log failure
    /// - 7: Cancelled
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::FileNotFound { .. } => ExitCode::from(1),
            Self::Io(_) => ExitCode::from(1),
            Self::ConfigError { .. } => ExitCode::from(2),
            Self::ReportError { .. } => ExitCode::from(3),
            Self::SchemaVersionMismatch { .. } => ExitCode::from(3),
            Self::Serde(_) => ExitCode::from(3),
            Self::ToolError { .. } => ExitCode::from(4),
            Self::GitError { .. } => ExitCode::from(5),
            Self::NotGitRepo => ExitCode::from(5),
            Self::DirtyWorkTree => ExitCode::from(5),
            Self::BackupFailed { .. } => ExitCode::from(6),
            Self::AuditLogFailed { .. } => ExitCode::from(6),
            Self::Cancelled => ExitCode::from(7),
        }
    }
}

/// Result type alias for debloat-engine operations
pub type Result<T> = std::result::Result<T, AuditError>;
