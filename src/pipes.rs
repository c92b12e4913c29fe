use std::os::fd::OwnedFd;

use nix::errno::Errno;

/// One anonymous pipe between stage `i` and stage `i + 1`.
#[derive(Debug)]
pub struct Pipe {
    pub read: OwnedFd,
    pub write: OwnedFd,
}

impl Pipe {
    pub fn new() -> Result<Self, Errno> {
        let (read, write) = pipe_cloexec()?;
        Ok(Self { read, write })
    }
}

/// Creates a pipe with both ends marked close-on-exec.
///
/// A stage that needs an end gets it through `dup2`, which clears the flag
/// on the duplicate only.
pub fn pipe_cloexec() -> Result<(OwnedFd, OwnedFd), Errno> {
    pipe_cloexec_impl()
}

#[cfg(not(target_os = "macos"))]
fn pipe_cloexec_impl() -> Result<(OwnedFd, OwnedFd), Errno> {
    nix::unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC)
}

#[cfg(target_os = "macos")]
fn pipe_cloexec_impl() -> Result<(OwnedFd, OwnedFd), Errno> {
    use nix::fcntl::{fcntl, FcntlArg, FdFlag};

    let (read, write) = nix::unistd::pipe()?;
    fcntl(&read, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    fcntl(&write, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    Ok((read, write))
}
