use std::ffi::CString;
use std::fmt;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, RawFd};
use std::path::Path;

use libc::{STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
use log::trace;
use nix::errno::Errno;
use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use nix::unistd::{close, dup, dup2, execvp, pipe};

use crate::error::ShResult;

/// Status a child exits with when its program cannot be executed
pub const CMD_NOT_FOUND: i32 = 127;

bitflags::bitflags! {
	#[derive(Debug,Clone,Copy,PartialEq,Eq)]
	pub struct ExecFlags: u32 {
		const BACKGROUND = 0b00000000000000000000000000000001;
		const IN_PIPE    = 0b00000000000000000000000000000010;
	}
}

/// An owned file descriptor.
///
/// Closing is idempotent, and the standard streams are never actually closed through a `RustFd`,
/// so `RustFd::new(STDOUT_FILENO)` can be used as a plain unbuffered writer.
#[derive(Hash, Eq, PartialEq, Debug)]
pub struct RustFd {
	fd: RawFd,
}

impl RustFd {
	pub fn new(fd: RawFd) -> io::Result<Self> {
		if fd < 0 {
			return Err(io::Error::new(io::ErrorKind::InvalidInput, "Invalid RustFd"))
		}
		Ok(RustFd { fd })
	}

	/// Wrapper for nix::unistd::pipe(), produces a read end and a write end
	pub fn pipe() -> ShResult<(Self,Self)> {
		let (r_fd,w_fd) = pipe()?;
		let r_fd = RustFd::new(r_fd.into_raw_fd())?;
		let w_fd = RustFd::new(w_fd.into_raw_fd())?;
		trace!("opened pipe: read {} write {}",r_fd,w_fd);
		Ok((r_fd,w_fd))
	}

	/// Open a file with the given flags and mode bits
	pub fn open(path: &Path, flags: OFlag, mode: Mode) -> io::Result<Self> {
		let fd = open(path, flags, mode).map_err(io::Error::from)?;
		Self::new(fd)
	}

	/// Produce a `RustFd` that points to the same resource
	pub fn dup(&self) -> io::Result<Self> {
		if !self.is_valid() {
			return Err(io::Error::new(io::ErrorKind::Other, "Invalid RustFd"));
		}
		let duped = dup(self.fd).map_err(io::Error::from)?;
		Self::new(duped)
	}

	/// 'self' is duplicated onto the given target descriptor
	pub fn dup2<T: AsRawFd>(&self, target: &T) -> io::Result<()> {
		let target_fd = target.as_raw_fd();
		if self.fd == target_fd {
			return Ok(())
		}
		if !self.is_valid() || target_fd < 0 {
			return Err(io::Error::new(io::ErrorKind::Other, "Invalid RustFd"));
		}
		loop {
			match dup2(self.fd, target_fd) {
				Ok(_) => return Ok(()),
				Err(Errno::EINTR) => continue,
				Err(e) => return Err(e.into())
			}
		}
	}

	pub fn close(&mut self) -> io::Result<()> {
		if !self.is_valid() {
			return Ok(())
		}
		let fd = std::mem::replace(&mut self.fd, -1);
		if matches!(fd, STDIN_FILENO | STDOUT_FILENO | STDERR_FILENO) {
			return Ok(())
		}
		close(fd).map_err(io::Error::from)
	}

	pub fn is_valid(&self) -> bool {
		self.fd >= 0
	}
}

impl Drop for RustFd {
	fn drop(&mut self) {
		let _ = self.close();
	}
}

impl io::Write for RustFd {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		if !self.is_valid() {
			return Err(io::Error::new(io::ErrorKind::Other, "Invalid RustFd"))
		}
		loop {
			let result = unsafe { libc::write(self.fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
			if result >= 0 {
				return Ok(result as usize)
			}
			let err = io::Error::last_os_error();
			if err.raw_os_error() != Some(libc::EINTR) {
				return Err(err)
			}
		}
	}
	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}

impl AsFd for RustFd {
	fn as_fd(&self) -> BorrowedFd<'_> {
		unsafe { BorrowedFd::borrow_raw(self.fd) }
	}
}

impl AsRawFd for RustFd {
	fn as_raw_fd(&self) -> RawFd {
		self.fd
	}
}

impl IntoRawFd for RustFd {
	fn into_raw_fd(self) -> RawFd {
		let fd = self.fd;
		std::mem::forget(self);
		fd
	}
}

impl FromRawFd for RustFd {
	unsafe fn from_raw_fd(fd: RawFd) -> Self {
		RustFd { fd }
	}
}

impl fmt::Display for RustFd {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.fd)
	}
}

/// Replace the current process image. Only returns by exiting with `CMD_NOT_FOUND`.
pub fn exec_external(argv: &[CString]) -> ! {
	let Some(command) = argv.first() else {
		std::process::exit(CMD_NOT_FOUND)
	};
	let Err(e) = execvp(command, argv);
	let name = command.to_string_lossy();
	match e {
		Errno::ENOENT => eprintln!("{}: command not found",name),
		Errno::EACCES => eprintln!("{}: Permission denied",name),
		_ => eprintln!("{}: {}",name,e)
	}
	std::process::exit(CMD_NOT_FOUND)
}

pub fn save_fds() -> ShResult<(RustFd,RustFd,RustFd)> {
	let stdin = RustFd::new(STDIN_FILENO)?;
	let stdout = RustFd::new(STDOUT_FILENO)?;
	let stderr = RustFd::new(STDERR_FILENO)?;
	Ok((
		stdin.dup()?,
		stdout.dup()?,
		stderr.dup()?
	))
}

pub fn restore_fds(mut stdio: (RustFd,RustFd,RustFd)) -> ShResult<()> {
	stdio.0.dup2(&STDIN_FILENO)?;
	stdio.0.close()?;
	stdio.1.dup2(&STDOUT_FILENO)?;
	stdio.1.close()?;
	stdio.2.dup2(&STDERR_FILENO)?;
	stdio.2.close()?;
	Ok(())
}
