use std::fmt::{self, Display};
use std::io;
use std::path::{Path, PathBuf};

use libc::{STDIN_FILENO, STDOUT_FILENO};
use log::{debug, info};
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;

use crate::command::Stage;
use crate::utils::RustFd;

/// Exit status of a child whose redirections could not be set up
pub const REDIR_FAILED: i32 = 1;

#[derive(Debug)]
pub enum RedirErr {
	Input { path: PathBuf, source: io::Error },
	Output { path: PathBuf, source: io::Error },
}

impl Display for RedirErr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RedirErr::Input { path, source } => write!(f,"Cannot open input file '{}': {}",path.display(),source),
			RedirErr::Output { path, source } => write!(f,"Cannot open output file '{}': {}",path.display(),source),
		}
	}
}

impl std::error::Error for RedirErr {}

/// Bind a stage's standard streams to its redirection targets.
///
/// Runs after pipe wiring, so a redirection always wins over the pipe for the same stream.
/// A stage without an infile or outfile is left untouched.
pub fn apply(stage: &Stage) -> Result<(), RedirErr> {
	if let Some(path) = stage.infile() {
		redirect_input(path).map_err(|source| RedirErr::Input { path: path.clone(), source })?;
	}
	if let Some(path) = stage.outfile() {
		redirect_output(path, stage.append()).map_err(|source| RedirErr::Output { path: path.clone(), source })?;
	}
	Ok(())
}

fn redirect_input(path: &Path) -> io::Result<()> {
	info!("Opening file for input redirection: {:?}", path);
	let file_fd = RustFd::open(path, OFlag::O_RDONLY, Mode::empty())?;
	debug!("Duping file FD {} to FD {}", file_fd, STDIN_FILENO);
	file_fd.dup2(&STDIN_FILENO)
	// file_fd is closed on drop
}

fn redirect_output(path: &Path, append: bool) -> io::Result<()> {
	info!("Opening file for output redirection: {:?} (append: {})", path, append);
	let mut flags = OFlag::O_WRONLY | OFlag::O_CREAT;
	flags |= if append { OFlag::O_APPEND } else { OFlag::O_TRUNC };
	let file_fd = RustFd::open(path, flags, Mode::from_bits_truncate(0o644))?;
	debug!("Duping file FD {} to FD {}", file_fd, STDOUT_FILENO);
	file_fd.dup2(&STDOUT_FILENO)
}
