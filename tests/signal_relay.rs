// Own binary: installs the shell's signal handlers in the test process.

use std::sync::Once;
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use jobash::command::{Pipeline, Stage};
use jobash::execute::exec_pipeline;
use jobash::execute::launch::{launch, Launched};
use jobash::jobs::{ProcState, ProcessGroup};
use jobash::shellenv::ShellState;
use jobash::shopt::ShOpts;
use jobash::signal;
use jobash::utils::ExecFlags;

static HANDLERS: Once = Once::new();

fn state() -> ShellState {
	HANDLERS.call_once(|| signal::sig_handler_setup().unwrap());
	ShellState::new(ShOpts::default())
}

fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
	let deadline = Instant::now() + Duration::from_secs(10);
	while !cond() {
		assert!(Instant::now() < deadline, "timed out waiting for {}", what);
		thread::sleep(Duration::from_millis(10));
	}
}

/// Launch `sleep 30` as its own group and wait for the exec so its handlers are the defaults
fn sleeper(state: &mut ShellState) -> ProcessGroup {
	let Launched::Group(group) = launch(&Pipeline::single(Stage::new(["sleep", "30"])), ExecFlags::empty(), state).unwrap() else {
		panic!("expected a process group")
	};
	let pid = group.pgid();
	wait_until("exec of sleep", || {
		std::fs::read_to_string(format!("/proc/{}/comm", pid))
			.map(|comm| comm.trim() == "sleep")
			.unwrap_or(false)
	});
	group
}

fn still_running(pid: Pid) -> bool {
	waitpid(pid, Some(WaitPidFlag::WNOHANG)).unwrap() == WaitStatus::StillAlive
}

#[test]
fn sigchld_reaps_background_job_for_refresh() {
	let mut state = state();
	let pipeline = Pipeline::new(vec![Stage::new(["sh", "-c", "sleep 0.2; exit 3"])], true).unwrap();
	assert_eq!(exec_pipeline(&pipeline, &mut state).unwrap(), 0);
	let id = state.jobs.last_id().unwrap();
	let pid = state.jobs.get(id).unwrap().pgid();
	assert!(signal::is_watched(pid));

	// Only the handler unwatches a pid before refresh runs
	wait_until("SIGCHLD reap", || !signal::is_watched(pid));

	let done = state.jobs.refresh();
	assert_eq!(done.len(), 1);
	assert_eq!(done[0].id(), id);
	// A status taken from the relay, not an ECHILD from polling
	assert_eq!(done[0].group().members()[0].state(), ProcState::Exited(3));
	assert_eq!(done[0].group().last_code(), Some(3));
	assert!(state.jobs.is_empty());
}

#[test]
fn interrupt_and_stop_reach_only_the_foreground_group() {
	let mut state = state();

	let group = sleeper(&mut state);
	let pgid = group.pgid();

	// Nothing in the foreground: the shell swallows the signal
	state.fg.clear();
	unsafe { libc::raise(libc::SIGINT) };
	unsafe { libc::raise(libc::SIGTSTP) };
	thread::sleep(Duration::from_millis(100));
	assert!(still_running(pgid));

	state.fg.set(pgid);
	unsafe { libc::raise(libc::SIGINT) };
	state.fg.clear();
	assert_eq!(waitpid(pgid, None).unwrap(), WaitStatus::Signaled(pgid, Signal::SIGINT, false));

	let group = sleeper(&mut state);
	let pgid = group.pgid();
	state.fg.set(pgid);
	unsafe { libc::raise(libc::SIGTSTP) };
	state.fg.clear();
	assert_eq!(waitpid(pgid, Some(WaitPidFlag::WUNTRACED)).unwrap(), WaitStatus::Stopped(pgid, Signal::SIGTSTP));

	killpg(pgid, Signal::SIGKILL).unwrap();
	assert_eq!(waitpid(pgid, None).unwrap(), WaitStatus::Signaled(pgid, Signal::SIGKILL, false));
}
