//! Where the first stage reads from and the last stage writes to.

use std::fs::{File, OpenOptions};
use std::os::fd::OwnedFd;
use std::path::PathBuf;

use crate::error::{PipelineError, Result};
use crate::pipes::pipe_cloexec;

const DEV_NULL: &str = "/dev/null";

/// Standard input of stage 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Stdin {
    /// Keep the invoking process's stdin.
    #[default]
    Inherit,
    Null,
    File(PathBuf),
    /// The pipeline hands back a writer, see [`Pipeline::take_stdin`].
    ///
    /// [`Pipeline::take_stdin`]: crate::Pipeline::take_stdin
    Piped,
}

/// Standard output of the last stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Stdout {
    #[default]
    Inherit,
    Null,
    /// Truncate or create.
    File(PathBuf),
    Append(PathBuf),
    /// The pipeline hands back a reader, see [`Pipeline::take_stdout`].
    ///
    /// [`Pipeline::take_stdout`]: crate::Pipeline::take_stdout
    Piped,
}

/// An opened redirect: the descriptor the child dups onto its stream and,
/// for `Piped`, the end the parent keeps.
#[derive(Debug, Default)]
pub(crate) struct Opened {
    pub child: Option<OwnedFd>,
    pub parent: Option<File>,
}

impl Stdin {
    pub(crate) fn open(&self) -> Result<Opened> {
        match self {
            Stdin::Inherit => Ok(Opened::default()),
            Stdin::Null => open_read(DEV_NULL.into()),
            Stdin::File(path) => open_read(path.clone()),
            Stdin::Piped => {
                let (read, write) = pipe_cloexec().map_err(PipelineError::PipeAllocation)?;
                Ok(Opened {
                    child: Some(read),
                    parent: Some(File::from(write)),
                })
            }
        }
    }
}

impl Stdout {
    pub(crate) fn open(&self) -> Result<Opened> {
        match self {
            Stdout::Inherit => Ok(Opened::default()),
            Stdout::Null => open_write(DEV_NULL.into(), false),
            Stdout::File(path) => open_write(path.clone(), false),
            Stdout::Append(path) => open_write(path.clone(), true),
            Stdout::Piped => {
                let (read, write) = pipe_cloexec().map_err(PipelineError::PipeAllocation)?;
                Ok(Opened {
                    child: Some(write),
                    parent: Some(File::from(read)),
                })
            }
        }
    }
}

// std opens files with O_CLOEXEC, same as our pipes.
fn open_read(path: PathBuf) -> Result<Opened> {
    let file = File::open(&path).map_err(|e| PipelineError::redirect(path, e))?;
    Ok(Opened {
        child: Some(file.into()),
        parent: None,
    })
}

fn open_write(path: PathBuf, append: bool) -> Result<Opened> {
    let mut options = OpenOptions::new();
    if append {
        options.create(true).append(true);
    } else {
        options.create(true).write(true).truncate(true);
    }
    let file = options
        .open(&path)
        .map_err(|e| PipelineError::redirect(path, e))?;
    Ok(Opened {
        child: Some(file.into()),
        parent: None,
    })
}
