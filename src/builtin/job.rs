use std::io::Write;

use libc::STDOUT_FILENO;
use nix::sys::signal::Signal;

use crate::error::{ShErr, ShResult};
use crate::execute::foreground;
use crate::jobs::JobState;
use crate::shellenv::ShellState;
use crate::utils::RustFd;

/// `jobs [-v]`
pub fn jobs(argv: &[String], state: &mut ShellState) -> ShResult<i32> {
	let mut verbose = false;
	for arg in &argv[1..] {
		match arg.as_str() {
			"-v" => verbose = true,
			_ => return Err(ShErr::parse(format!("jobs: invalid flag `{}'",arg)))
		}
	}
	let mut stdout = RustFd::new(STDOUT_FILENO)?;
	let width = state.opts.core.job_display_width;
	if !state.in_shell_process() {
		state.jobs.write_list(verbose, width, &mut stdout)?;
		return Ok(0)
	}
	let done = state.jobs.list(verbose, width, &mut stdout)?;
	if state.opts.core.notify_done {
		for job in done {
			writeln!(stdout,"[{}] Done {}",job.id(),job.cmd())?;
		}
	}
	Ok(0)
}

/// `fg [id]`
pub fn fg(argv: &[String], state: &mut ShellState) -> ShResult<i32> {
	state.notify_done()?;
	let id = target_job("fg", argv.get(1), state)?;
	let outcome = foreground::resume(state, id)?;
	Ok(outcome.status())
}

/// `bg [id]`
pub fn bg(argv: &[String], state: &mut ShellState) -> ShResult<i32> {
	state.notify_done()?;
	let id = target_job("bg", argv.get(1), state)?;
	let job = state.jobs.background(id)?;
	if job.state() != JobState::Done {
		let mut stdout = RustFd::new(STDOUT_FILENO)?;
		writeln!(stdout,"[{}] {} &",job.id(),job.cmd())?;
	}
	Ok(0)
}

/// `sig <id> <signo>`
pub fn sig(argv: &[String], state: &mut ShellState) -> ShResult<i32> {
	let (Some(id), Some(signo)) = (argv.get(1), argv.get(2)) else {
		return Err(ShErr::parse("usage: sig <job id> <signal number>"))
	};
	let id = parse_id("sig", id)?;
	let signal = signo.parse::<i32>()
		.ok()
		.and_then(|n| Signal::try_from(n).ok())
		.ok_or_else(|| ShErr::parse(format!("sig: invalid signal `{}'",signo)))?;
	state.jobs.signal(id, signal)?;
	Ok(0)
}

fn target_job(op: &'static str, arg: Option<&String>, state: &ShellState) -> ShResult<usize> {
	match arg {
		Some(arg) => parse_id(op, arg),
		None => state.jobs.last_id().ok_or(ShErr::NoSuchJob { op, id: 0 })
	}
}

fn parse_id(op: &'static str, arg: &str) -> ShResult<usize> {
	arg.parse::<usize>().map_err(|_| ShErr::parse(format!("{}: invalid job id `{}'",op,arg)))
}
