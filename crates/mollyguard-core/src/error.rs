use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result alias for core operations.
pub type MollyguardResult<T> = Result<T, MollyguardError>;

#[derive(Error, Debug)]
pub enum MollyguardError {
    #[error("[MG1000] io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("[MG1001] toml config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("[MG1100] configuration error: {0}")]
    InvalidConfig(String),

    #[error("[MG1200] unable to determine hostname: {0}")]
    Hostname(String),

    #[error("[MG2000] failed to spawn {binary}: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[MG2001] {binary} timed out after {timeout:?}")]
    Timeout { binary: PathBuf, timeout: Duration },

    #[error("[MG2002] {binary} {args} exited with code {status}")]
    CommandFailed {
        binary: PathBuf,
        args: String,
        status: i32,
    },

    #[error("[MG3000] could not change mask state of: {}", failed.join(", "))]
    PartialMask { failed: Vec<String> },

    #[error("[MG3100] confirmation failed: {0}")]
    ConfirmationFailed(String),

    #[error("[MG4000] failed to provision key for {device}: {reason}")]
    Provision { device: String, reason: String },

    #[error("[MG4100] failed to clear key for {device}: {reason}")]
    Clear { device: String, reason: String },
}

impl MollyguardError {
    pub fn code(&self) -> &'static str {
        match self {
            MollyguardError::Io(_) => "MG1000",
            MollyguardError::Toml(_) => "MG1001",
            MollyguardError::InvalidConfig(_) => "MG1100",
            MollyguardError::Hostname(_) => "MG1200",
            MollyguardError::Spawn { .. } => "MG2000",
            MollyguardError::Timeout { .. } => "MG2001",
            MollyguardError::CommandFailed { .. } => "MG2002",
            MollyguardError::PartialMask { .. } => "MG3000",
            MollyguardError::ConfirmationFailed(_) => "MG3100",
            MollyguardError::Provision { .. } => "MG4000",
            MollyguardError::Clear { .. } => "MG4100",
        }
    }

    /// Process exit code for this failure class, so unit files and scripts can
    /// tell configuration problems apart from an aborted confirmation.
    pub fn exit_code(&self) -> i32 {
        match self {
            MollyguardError::Io(_) | MollyguardError::Hostname(_) => 1,
            MollyguardError::Toml(_) | MollyguardError::InvalidConfig(_) => 2,
            MollyguardError::ConfirmationFailed(_) => 3,
            MollyguardError::Spawn { .. }
            | MollyguardError::Timeout { .. }
            | MollyguardError::CommandFailed { .. } => 4,
            MollyguardError::PartialMask { .. } => 5,
            MollyguardError::Provision { .. } | MollyguardError::Clear { .. } => 6,
        }
    }
}
