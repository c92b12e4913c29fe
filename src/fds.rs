use std::os::fd::{AsRawFd, OwnedFd, RawFd};

/// A set of descriptors that are closed together.
///
/// The builder puts every pipe end and redirect descriptor in here. The
/// forked child calls [`close_all`](Self::close_all) right before exec and
/// the parent calls it once all stages are spawned, or on any error path.
#[derive(Debug, Default)]
pub struct DescriptorSet {
    fds: Vec<OwnedFd>,
}

impl DescriptorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fds: Vec::with_capacity(capacity),
        }
    }

    /// Takes ownership of `fd` and returns its raw number for later `dup2`.
    pub fn insert(&mut self, fd: OwnedFd) -> RawFd {
        let raw = fd.as_raw_fd();
        self.fds.push(fd);
        raw
    }

    pub fn len(&self) -> usize {
        self.fds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    pub fn contains(&self, raw: RawFd) -> bool {
        self.fds.iter().any(|fd| fd.as_raw_fd() == raw)
    }

    /// Closes every held descriptor. Safe to call after `fork`: draining
    /// never reallocates, it only runs `close(2)` for each entry.
    pub fn close_all(&mut self) {
        for fd in self.fds.drain(..) {
            drop(fd);
        }
    }
}
