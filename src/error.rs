use std::fmt::{Debug, Display};

use nix::errno::Errno;

use crate::jobs::ProcessGroup;

// Errors are grouped by how far they are allowed to travel.
// Setup errors abort a launch before anything runs, launch errors leave a partial group behind,
// and job errors are raised by control operations against the job table.
// Nothing in here is fatal to the shell; the main loop reports it and moves on.

pub type ShResult<T> = Result<T, ShErr>;

#[derive(Debug)]
pub enum ShErr {
	/// Pipe/fork/argv failures before any child exists
	Setup(String),
	/// A fork failed after part of the pipeline was already started
	Launch { group: ProcessGroup, errno: Errno },
	NoSuchJob { op: &'static str, id: usize },
	SignalDelivery { id: usize, errno: Errno },
	Parse(String),
	InvalidOpt(String),
	IoError(std::io::Error),
	ErrNo(Errno),

	// Not an actual error, used to unwind from `exit`
	CleanExit(i32),
}

impl ShErr {
	pub fn setup(msg: impl Into<String>) -> Self {
		Self::Setup(msg.into())
	}
	pub fn parse(msg: impl Into<String>) -> Self {
		Self::Parse(msg.into())
	}
	pub fn invalid_opt(msg: impl Into<String>) -> Self {
		Self::InvalidOpt(msg.into())
	}
	pub fn from_io() -> Self {
		Self::IoError(std::io::Error::last_os_error())
	}
}

impl Display for ShErr {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ShErr::Setup(msg) => write!(f,"Setup Error: {}",msg),
			ShErr::Launch { group, errno } => write!(f,"Launch Error: fork failed after {} process(es) in group {}: {}",group.members().len(),group.pgid(),errno),
			ShErr::NoSuchJob { op, .. } => write!(f,"{}: no such job",op),
			ShErr::SignalDelivery { id, errno } => write!(f,"Failed to signal job {}: {}",id,errno),
			ShErr::Parse(msg) => write!(f,"Parse Error: {}",msg),
			ShErr::InvalidOpt(msg) => write!(f,"Invalid Option: {}",msg),
			ShErr::IoError(error) => write!(f,"I/O Error: {}",error),
			ShErr::ErrNo(no) => write!(f,"ERRNO: {}",no),
			ShErr::CleanExit(_) => write!(f, ""),
		}
	}
}

impl std::error::Error for ShErr {}

impl From<std::io::Error> for ShErr {
	fn from(value: std::io::Error) -> Self {
		ShErr::IoError(value)
	}
}

impl From<Errno> for ShErr {
	fn from(value: Errno) -> Self {
		ShErr::ErrNo(value)
	}
}
