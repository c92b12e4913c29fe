use std::fs::File;

use nix::errno::Errno;
use nix::sys::wait::waitpid;
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::stage::Stage;
use crate::status::StageStatus;

/// A wired, running chain of stage processes.
///
/// Every stage must be reaped: call [`wait`](Self::wait). A pipeline dropped
/// without waiting reaps its stages in `drop`, which blocks until they exit.
/// That includes drops during panic unwinding: a stage that never finishes
/// (say, one still reading an inherited terminal stdin) hangs the thread
/// doing the drop.
#[derive(Debug)]
pub struct Pipeline {
    stages: Vec<Stage>,
    pids: Vec<Pid>,
    pipe_count: usize,
    stdin: Option<File>,
    stdout: Option<File>,
    // one slot per stage, filled as each one is reaped
    statuses: Vec<Option<StageStatus>>,
}

impl Pipeline {
    pub(crate) fn new(
        stages: Vec<Stage>,
        pids: Vec<Pid>,
        pipe_count: usize,
        stdin: Option<File>,
        stdout: Option<File>,
    ) -> Self {
        let statuses = vec![None; pids.len()];
        Self {
            stages,
            pids,
            pipe_count,
            stdin,
            stdout,
            statuses,
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Process ids in stage order.
    pub fn pids(&self) -> &[Pid] {
        &self.pids
    }

    /// Number of pipes allocated between stages (always `len() - 1`).
    pub fn pipe_count(&self) -> usize {
        self.pipe_count
    }

    pub fn len(&self) -> usize {
        self.pids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.is_empty()
    }

    /// Writer feeding stage 0 when built with [`Stdin::Piped`].
    ///
    /// [`Stdin::Piped`]: crate::Stdin::Piped
    pub fn take_stdin(&mut self) -> Option<File> {
        self.stdin.take()
    }

    /// Reader for the last stage's output when built with [`Stdout::Piped`].
    /// Drain it before `wait` if the output may exceed the pipe buffer.
    ///
    /// [`Stdout::Piped`]: crate::Stdout::Piped
    pub fn take_stdout(&mut self) -> Option<File> {
        self.stdout.take()
    }

    /// Statuses collected so far, `None` until every stage was reaped.
    pub fn statuses(&self) -> Option<Vec<StageStatus>> {
        self.statuses.iter().copied().collect()
    }

    /// Blocks until every stage has terminated and returns their statuses
    /// in stage order.
    ///
    /// Calling it again returns the same statuses without waiting. If one
    /// `waitpid` fails the others are still reaped before the first error is
    /// returned.
    pub fn wait(&mut self) -> Result<Vec<StageStatus>> {
        // a stdin writer still held here would keep stage 0 from seeing EOF
        drop(self.stdin.take());

        let mut first_error = None;
        for (index, slot) in self.statuses.iter_mut().enumerate() {
            if slot.is_some() {
                continue;
            }
            let pid = self.pids[index];
            match reap(pid) {
                Ok(status) => {
                    debug!(stage = index, %pid, %status, "stage finished");
                    *slot = Some(status);
                }
                Err(e) => {
                    warn!(stage = index, %pid, error = %e, "failed to reap stage");
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        Ok(self.statuses.iter().flatten().copied().collect())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.statuses.iter().all(Option::is_some) {
            return;
        }
        // an unread stdout would leave the last stage blocked on a full pipe
        drop(self.stdout.take());
        let _ = self.wait();
    }
}

/// `waitpid` until `pid` has terminated.
pub(crate) fn reap(pid: Pid) -> Result<StageStatus> {
    loop {
        match waitpid(pid, None) {
            Ok(status) => {
                if let Some(status) = StageStatus::from_wait(status) {
                    return Ok(status);
                }
            }
            Err(Errno::EINTR) => continue,
            Err(source) => return Err(PipelineError::Wait { pid, source }),
        }
    }
}
