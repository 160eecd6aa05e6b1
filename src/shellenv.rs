use std::io::Write;

use libc::{STDIN_FILENO, STDOUT_FILENO};
use log::{debug, info, trace, warn};
use nix::errno::Errno;
use nix::sys::signal::{signal, SigHandler, Signal};
use nix::unistd::{getpgrp, getpid, setpgid, Pid};

use crate::error::ShResult;
use crate::jobs::JobTable;
use crate::shopt::ShOpts;
use crate::signal::{self, ForegroundHandle};
use crate::utils::RustFd;

/// Everything the execution core mutates, passed around by reference.
#[derive(Debug)]
pub struct ShellState {
	pub jobs: JobTable,
	pub fg: ForegroundHandle,
	pub opts: ShOpts,
	shell_pid: Pid,
	shell_pgid: Pid,
	interactive: bool,
	pub last_status: i32,
}

impl ShellState {
	pub fn new(opts: ShOpts) -> Self {
		Self {
			jobs: JobTable::new(),
			fg: ForegroundHandle,
			opts,
			shell_pid: getpid(),
			shell_pgid: getpgrp(),
			interactive: false,
			last_status: 0,
		}
	}

	pub fn shell_pgid(&self) -> Pid {
		self.shell_pgid
	}

	/// False inside a forked pipeline stage, where the job table is only a copy
	pub fn in_shell_process(&self) -> bool {
		getpid() == self.shell_pid
	}

	pub fn is_interactive(&self) -> bool {
		self.interactive
	}

	/// Take over the terminal: own process group, handlers installed, terminal pointed at us.
	/// Does nothing when stdin is not a terminal.
	pub fn init_interactive(&mut self) -> ShResult<()> {
		if unsafe { libc::isatty(STDIN_FILENO) } != 1 {
			debug!("stdin is not a tty, job control stays off");
			return Ok(())
		}

		// Started in the background: wait to be brought forward before touching the tty
		loop {
			let term_pgrp = unsafe { libc::tcgetpgrp(STDIN_FILENO) };
			let pgrp = getpgrp();
			if term_pgrp < 0 || term_pgrp == pgrp.as_raw() {
				break
			}
			unsafe { libc::kill(-pgrp.as_raw(), libc::SIGTTIN) };
		}

		signal::sig_handler_setup()?;

		let pid = getpid();
		match setpgid(pid, pid) {
			// Already a session leader
			Ok(()) | Err(Errno::EPERM) => {}
			Err(e) => warn!("could not move the shell into its own process group: {}",e)
		}
		self.shell_pgid = getpgrp();
		attach_tty(self.shell_pgid)?;
		self.interactive = true;
		info!("interactive shell, pgid {}",self.shell_pgid);
		Ok(())
	}

	/// Refresh the job table and announce anything that finished since the last prompt
	pub fn notify_done(&mut self) -> ShResult<()> {
		if !self.in_shell_process() {
			return Ok(())
		}
		let done = self.jobs.refresh();
		if !self.opts.core.notify_done {
			return Ok(())
		}
		let mut stdout = RustFd::new(STDOUT_FILENO)?;
		for job in done {
			writeln!(stdout,"[{}] Done {}",job.id(),job.cmd())?;
		}
		Ok(())
	}
}

/// Give the controlling terminal to `pgid`.
/// SIGTTOU is held off for the duration, otherwise a shell outside the foreground group stops itself.
pub fn attach_tty(pgid: Pid) -> ShResult<()> {
	if pgid.as_raw() <= 0 {
		return Ok(())
	}
	let prev = unsafe { signal(Signal::SIGTTOU, SigHandler::SigIgn) }?;
	let result = loop {
		if unsafe { libc::tcsetpgrp(STDIN_FILENO, pgid.as_raw()) } == 0 {
			break Ok(())
		}
		match Errno::last() {
			Errno::EINTR => continue,
			e => break Err(e)
		}
	};
	unsafe { signal(Signal::SIGTTOU, prev) }?;
	trace!("terminal handed to pgid {}",pgid);
	Ok(result?)
}
