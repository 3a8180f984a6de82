//! Typed failures of a build run and the exit code each one maps to.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Exit code for option, file and directory failures and for interrupts.
pub const EXIT_FAILURE: i32 = 1;

/// Exit code reported when the build tool cannot be spawned at all.
pub const EXIT_SPAWN_FAILED: i32 = 127;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("invalid version format '{0}': must be A.B.C with at most 4 digits each (e.g. 3.4.160)")]
    InvalidVersionFormat(String),

    #[error("can't open file: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("can't read file {}: {source}", path.display())]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("can't write file {}: {source}", path.display())]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("directory operation failed on {}: {source}", path.display())]
    DirectoryFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("build failed for device {device} (exit code {code})")]
    BuildFailed { device: String, code: i32 },

    #[error("merge of {} with {vendor} failed: {source}", artifact.display())]
    MergeFailed {
        artifact: PathBuf,
        vendor: String,
        #[source]
        source: MergeError,
    },

    #[error("interrupted by user")]
    InterruptedByUser,
}

/// Cause of a single artifact/vendor merge failing.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("no directory configured for vendor")]
    NoVendorDir,

    #[error("can't resolve blob {}: {source}", path.display())]
    Blob {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unusable blob name {}", .0.display())]
    BlobName(PathBuf),

    #[error("can't create {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("can't run {}: {source}", tool.display())]
    Spawn {
        tool: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} exited with {code}", tool.display())]
    ToolExit { tool: PathBuf, code: i32 },
}

impl BuildError {
    /// A missing file is `FileNotFound`; any other read failure keeps its cause.
    pub fn read_failed(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            Self::FileNotFound(path)
        } else {
            Self::FileReadFailed { path, source }
        }
    }

    pub fn write_failed(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::FileWriteFailed {
            path: path.into(),
            source,
        }
    }

    pub fn directory_failed(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::DirectoryFailed {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for a run that ended with this error.
    ///
    /// A failed build propagates the build tool's own code; everything else
    /// that reaches the top level exits with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BuildFailed { code, .. } => *code,
            Self::InvalidOptions(_)
            | Self::InvalidVersionFormat(_)
            | Self::FileNotFound(_)
            | Self::FileReadFailed { .. }
            | Self::FileWriteFailed { .. }
            | Self::DirectoryFailed { .. }
            | Self::MergeFailed { .. }
            | Self::InterruptedByUser => EXIT_FAILURE,
        }
    }
}

pub type Result<T, E = BuildError> = std::result::Result<T, E>;
