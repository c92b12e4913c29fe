use std::fmt;

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;

/// Exit status a stage reports when `execvp` fails (program not found or
/// not executable), same as a shell.
pub const EXEC_FAILURE_CODE: i32 = 127;

/// Exit status a stage reports when it could not wire its standard streams.
pub const WIRING_FAILURE_CODE: i32 = 126;

/// How a stage process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Exited(i32),
    Signaled(Signal),
}

impl StageStatus {
    pub(crate) fn from_wait(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, code) => Some(StageStatus::Exited(code)),
            WaitStatus::Signaled(_, signal, _) => Some(StageStatus::Signaled(signal)),
            // stopped / continued: the process has not terminated yet
            _ => None,
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, StageStatus::Exited(0))
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            StageStatus::Exited(code) => Some(*code),
            StageStatus::Signaled(_) => None,
        }
    }

    pub fn signal(&self) -> Option<Signal> {
        match self {
            StageStatus::Signaled(signal) => Some(*signal),
            StageStatus::Exited(_) => None,
        }
    }

    /// True when the stage was killed because its reader went away.
    pub fn is_broken_pipe(&self) -> bool {
        matches!(self, StageStatus::Signaled(Signal::SIGPIPE))
    }

    /// Shell-style code: the exit code, or 128 + signal number.
    pub fn shell_code(&self) -> i32 {
        match self {
            StageStatus::Exited(code) => *code,
            StageStatus::Signaled(signal) => 128 + *signal as i32,
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Exited(code) => write!(f, "exit {code}"),
            StageStatus::Signaled(signal) => write!(f, "killed by {}", signal.as_str()),
        }
    }
}
