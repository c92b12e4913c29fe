//! Chains external programs through anonymous pipes, one process per stage,
//! the way a shell runs `a | b | c`.
//!
//! ```no_run
//! use rpipeline::{PipelineBuilder, Stage, Stdout};
//! use std::io::Read;
//!
//! let mut pipeline = PipelineBuilder::new([
//!     Stage::new("grep").args(["Nezer", "phonebook.txt"]),
//!     Stage::new("awk").arg("-F,").arg("{print $2}"),
//! ])
//! .stdout(Stdout::Piped)
//! .build()?;
//!
//! let mut numbers = String::new();
//! pipeline.take_stdout().unwrap().read_to_string(&mut numbers)?;
//! let statuses = pipeline.wait()?;
//! assert!(statuses.iter().all(|s| s.success()));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod builder;
mod error;
mod fds;
mod pipeline;
mod pipes;
mod redirects;
mod stage;
mod status;

pub mod lookup;

pub use builder::{build, PipelineBuilder};
pub use error::{PipelineError, Result};
pub use fds::DescriptorSet;
pub use pipeline::Pipeline;
pub use pipes::{pipe_cloexec, Pipe};
pub use redirects::{Stdin, Stdout};
pub use stage::{parse_command_line, CommandLine, Stage};
pub use status::{StageStatus, EXEC_FAILURE_CODE, WIRING_FAILURE_CODE};

pub use nix::unistd::Pid;
