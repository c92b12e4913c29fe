//! Error types for pipeline construction.
//!
//! Everything that can go wrong *before* a stage process exists is surfaced
//! here. Failures inside a stage (for example exec of a missing program) are
//! not errors of the builder: they become that stage's exit status.

use std::path::PathBuf;

use nix::errno::Errno;
use nix::unistd::Pid;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// `build` was called with no stages.
    #[error("pipeline has no stages")]
    EmptyPipeline,

    /// A stage cannot be turned into an exec argument vector.
    #[error("invalid stage {index}: {reason}")]
    InvalidStage { index: usize, reason: String },

    /// Command line text could not be split into stages.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Input rejected before any stage was built.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A stdin/stdout redirect target could not be opened.
    #[error("cannot open {path:?}: {source}")]
    Redirect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// `pipe2` failed, typically descriptor exhaustion. No process exists.
    #[error("pipe allocation failed: {0}")]
    PipeAllocation(#[source] Errno),

    /// `fork` failed for `stage`. Earlier stages were reaped before this
    /// error was returned.
    #[error("failed to create process for stage {stage} ({program}): {source}")]
    ProcessCreation {
        stage: usize,
        program: String,
        source: Errno,
    },

    #[error("waitpid({pid}) failed: {source}")]
    Wait { pid: Pid, source: Errno },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    pub fn invalid_stage(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidStage {
            index,
            reason: reason.into(),
        }
    }

    pub fn redirect(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Redirect {
            path: path.into(),
            source,
        }
    }
}
