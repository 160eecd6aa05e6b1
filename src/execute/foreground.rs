use std::io::Write;

use libc::STDOUT_FILENO;
use log::{debug, info, trace, warn};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::Pid;

use crate::error::{ShErr, ShResult};
use crate::jobs::{ProcState, ProcessGroup};
use crate::shellenv::{attach_tty, ShellState};
use crate::signal::ForegroundHandle;
use crate::utils::RustFd;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
	/// Every member finished. `status` is the last stage's
	Completed { status: i32 },
	/// A member stopped and the group now lives in the job table
	Stopped { job_id: usize, sig: Signal },
}

impl ExitOutcome {
	pub fn status(&self) -> i32 {
		match self {
			ExitOutcome::Completed { status } => *status,
			ExitOutcome::Stopped { sig, .. } => 128 + *sig as i32,
		}
	}
}

/// Owns the terminal on behalf of a foreground group.
/// Gives it back to the shell and clears the foreground handle exactly once.
struct TermGuard {
	fg: ForegroundHandle,
	shell_pgid: Pid,
	tty: bool,
	released: bool,
}

impl TermGuard {
	fn acquire(pgid: Pid, state: &ShellState) -> Self {
		state.fg.set(pgid);
		let tty = state.is_interactive();
		if tty {
			if let Err(e) = attach_tty(pgid) {
				warn!("could not hand the terminal to pgid {}: {}",pgid,e);
			}
		}
		Self { fg: state.fg, shell_pgid: state.shell_pgid(), tty, released: false }
	}

	fn release(&mut self) {
		if self.released {
			return
		}
		self.released = true;
		if self.tty {
			if let Err(e) = attach_tty(self.shell_pgid) {
				warn!("could not reclaim the terminal: {}",e);
			}
		}
		self.fg.clear();
	}
}

impl Drop for TermGuard {
	fn drop(&mut self) {
		self.release();
	}
}

/// Run a freshly launched group in the foreground until it finishes or stops
pub fn run_foreground(group: ProcessGroup, cmd: &str, state: &mut ShellState) -> ShResult<ExitOutcome> {
	wait_in_foreground(group, cmd, state, false)
}

/// `fg`: take a job out of the table, continue it and wait on it
pub fn resume(state: &mut ShellState, job_id: usize) -> ShResult<ExitOutcome> {
	let job = state.jobs.remove(job_id).ok_or(ShErr::NoSuchJob { op: "fg", id: job_id })?;
	let cmd = job.cmd().to_string();
	info!("resuming job [{}] pgid {} in the foreground",job_id,job.pgid());
	wait_in_foreground(job.into_group(), &cmd, state, true)
}

fn wait_in_foreground(mut group: ProcessGroup, cmd: &str, state: &mut ShellState, cont: bool) -> ShResult<ExitOutcome> {
	group.activate();
	let pgid = group.pgid();
	let mut guard = TermGuard::acquire(pgid, state);

	if cont {
		match killpg(pgid, Signal::SIGCONT) {
			Ok(()) => group.mark_continued(),
			// Gone already; waitpid below collects whatever is left
			Err(Errno::ESRCH) => debug!("fg: group {} already gone",pgid),
			Err(errno) => {
				guard.release();
				let id = state.jobs.add(group, cmd, false);
				return Err(ShErr::SignalDelivery { id, errno })
			}
		}
	}

	wait_group(&mut group)?;
	guard.release();

	let stop_sig = group.members().iter().find_map(|m| match m.state() {
		ProcState::Stopped(sig) => Some(sig),
		_ => None
	});
	if let Some(sig) = stop_sig {
		let job_id = state.jobs.add(group, cmd, false);
		let mut stdout = RustFd::new(STDOUT_FILENO)?;
		writeln!(stdout,"\n[{}] Stopped {}",job_id,pgid)?;
		return Ok(ExitOutcome::Stopped { job_id, sig })
	}

	if state.opts.core.report_status {
		report_members(&group);
	}
	let status = group.last_code().unwrap_or(0);
	debug!("foreground group {} completed with status {}",pgid,status);
	Ok(ExitOutcome::Completed { status })
}

/// Block until every member has finished or one of them stops
fn wait_group(group: &mut ProcessGroup) -> ShResult<()> {
	let target = Pid::from_raw(-group.pgid().as_raw());
	while !group.live_pids().is_empty() && !group.any_stopped() {
		match waitpid(target, Some(WaitPidFlag::WUNTRACED)) {
			Ok(status) => {
				if !group.update(status) {
					trace!("ignoring status for foreign pid: {:?}",status);
				}
			}
			Err(Errno::EINTR) => continue,
			Err(Errno::ECHILD) => {
				// Whatever is left was collected elsewhere
				for pid in group.live_pids() {
					group.mark_reaped(pid);
				}
			}
			Err(e) => return Err(e.into())
		}
	}
	Ok(())
}

fn report_members(group: &ProcessGroup) {
	for member in group.members() {
		match member.state() {
			ProcState::Exited(code) if code != 0 => eprintln!("Command exited with status {}",code),
			ProcState::Signaled(sig) => eprintln!("Command terminated by signal {}",sig as i32),
			_ => {}
		}
	}
}
