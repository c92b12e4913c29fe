//! Fork-per-stage pipeline construction.
//!
//! ```text
//!   stdin -> P0 -pipe0-> P1 -pipe1-> ... -pipe(K-2)-> P(K-1) -> stdout
//! ```
//!
//! All K-1 pipes are allocated before the first fork. Each child dups its
//! two neighbouring ends onto fd 0 / fd 1, closes every descriptor in the
//! set and execs. The parent closes the whole set once the last stage is
//! spawned, so the only remaining holders of each pipe are its two stages.

use std::os::fd::{BorrowedFd, RawFd};

use nix::errno::Errno;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::unistd::{dup2_stdin, dup2_stdout, fork, ForkResult};
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::fds::DescriptorSet;
use crate::pipeline::{reap, Pipeline};
use crate::pipes::Pipe;
use crate::redirects::{Stdin, Stdout};
use crate::stage::{ExecArgv, Stage};
use crate::status::{EXEC_FAILURE_CODE, WIRING_FAILURE_CODE};

#[derive(Debug)]
pub struct PipelineBuilder {
    stages: Vec<Stage>,
    stdin: Stdin,
    stdout: Stdout,
}

/// Descriptors one stage dups onto its standard streams.
#[derive(Debug, Clone, Copy)]
struct Wiring {
    stdin: Option<RawFd>,
    stdout: Option<RawFd>,
}

impl PipelineBuilder {
    pub fn new<I>(stages: I) -> Self
    where
        I: IntoIterator<Item = Stage>,
    {
        Self {
            stages: stages.into_iter().collect(),
            stdin: Stdin::default(),
            stdout: Stdout::default(),
        }
    }

    /// Input of the first stage.
    pub fn stdin(mut self, stdin: Stdin) -> Self {
        self.stdin = stdin;
        self
    }

    /// Output of the last stage.
    pub fn stdout(mut self, stdout: Stdout) -> Self {
        self.stdout = stdout;
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        if self.stages.is_empty() {
            return Err(PipelineError::EmptyPipeline);
        }
        let argvs = self
            .stages
            .iter()
            .enumerate()
            .map(|(index, stage)| stage.exec_argv(index))
            .collect::<Result<Vec<_>>>()?;

        let k = self.stages.len();
        let mut fds = DescriptorSet::with_capacity(2 * (k - 1) + 2);

        let stdin = self.stdin.open()?;
        let stdin_fd = stdin.child.map(|fd| fds.insert(fd));
        let stdout = self.stdout.open()?;
        let stdout_fd = stdout.child.map(|fd| fds.insert(fd));

        let mut pipe_ends: Vec<(RawFd, RawFd)> = Vec::with_capacity(k - 1);
        for _ in 1..k {
            let pipe = Pipe::new().map_err(|e| {
                fds.close_all();
                PipelineError::PipeAllocation(e)
            })?;
            pipe_ends.push((fds.insert(pipe.read), fds.insert(pipe.write)));
        }
        debug!(stages = k, pipes = pipe_ends.len(), "allocated pipes");

        let wiring: Vec<Wiring> = (0..k)
            .map(|i| Wiring {
                stdin: if i > 0 { Some(pipe_ends[i - 1].0) } else { stdin_fd },
                stdout: if i < k - 1 { Some(pipe_ends[i].1) } else { stdout_fd },
            })
            .collect();

        let mut pids = Vec::with_capacity(k);
        for (index, stage) in self.stages.iter().enumerate() {
            // SAFETY: the child branch only calls async-signal-safe functions
            // (sigaction, dup2, close, execvp, write, _exit) and never returns.
            match unsafe { fork() } {
                Ok(ForkResult::Child) => exec_stage(&argvs[index], wiring[index], &mut fds),
                Ok(ForkResult::Parent { child }) => {
                    debug!(stage = index, pid = %child, command = %stage, "spawned stage");
                    pids.push(child);
                }
                Err(source) => {
                    fds.close_all();
                    drop(stdin.parent);
                    drop(stdout.parent);
                    warn!(
                        stage = index,
                        spawned = pids.len(),
                        error = %source,
                        "fork failed, reaping spawned stages"
                    );
                    for pid in pids {
                        if let Err(e) = reap(pid) {
                            warn!(%pid, error = %e, "failed to reap stage after fork failure");
                        }
                    }
                    return Err(PipelineError::ProcessCreation {
                        stage: index,
                        program: stage.program().to_string(),
                        source,
                    });
                }
            }
        }

        fds.close_all();

        Ok(Pipeline::new(
            self.stages,
            pids,
            pipe_ends.len(),
            stdin.parent,
            stdout.parent,
        ))
    }
}

/// Builds and spawns `stages` with inherited standard streams.
pub fn build<I>(stages: I) -> Result<Pipeline>
where
    I: IntoIterator<Item = Stage>,
{
    PipelineBuilder::new(stages).build()
}

/// Runs in the forked child. Must not allocate, lock, or return.
fn exec_stage(argv: &ExecArgv, wiring: Wiring, fds: &mut DescriptorSet) -> ! {
    // The Rust runtime ignores SIGPIPE and an ignored disposition survives
    // exec; external filters expect the default.
    unsafe {
        let _ = signal::signal(Signal::SIGPIPE, SigHandler::SigDfl);
    }

    // std reopens closed 0/1/2 at startup, so pipe ends are never already
    // sitting on the target descriptor.
    // SAFETY: every wired descriptor is owned by `fds`, which stays open
    // until `close_all` below.
    if let Some(fd) = wiring.stdin {
        if let Err(errno) = dup2_stdin(unsafe { BorrowedFd::borrow_raw(fd) }) {
            fail(argv.diagnostic(), errno, WIRING_FAILURE_CODE);
        }
    }
    if let Some(fd) = wiring.stdout {
        if let Err(errno) = dup2_stdout(unsafe { BorrowedFd::borrow_raw(fd) }) {
            fail(argv.diagnostic(), errno, WIRING_FAILURE_CODE);
        }
    }

    fds.close_all();

    unsafe {
        libc::execvp(argv.program(), argv.argv());
    }
    fail(argv.diagnostic(), Errno::last(), EXEC_FAILURE_CODE)
}

fn fail(prefix: &[u8], errno: Errno, code: i32) -> ! {
    write_stderr(prefix);
    write_stderr(errno.desc().as_bytes());
    write_stderr(b"\n");
    unsafe { libc::_exit(code) }
}

fn write_stderr(bytes: &[u8]) {
    unsafe {
        libc::write(
            libc::STDERR_FILENO,
            bytes.as_ptr() as *const libc::c_void,
            bytes.len(),
        );
    }
}
