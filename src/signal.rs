use std::sync::atomic::{AtomicI32, AtomicU64, AtomicUsize, Ordering};

use log::{debug, trace, warn};
use nix::sys::signal::{signal, SigHandler, Signal};
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use signal_hook::consts::signal::{SIGCHLD, SIGINT, SIGTSTP};

use crate::error::ShResult;

// Everything a handler touches lives in this file and is a plain atomic.
// Handlers never allocate, lock, or format; they read the foreground pgid, walk the pid
// registry, issue kill/waitpid and push raw statuses into the event ring.
// The main loop drains the ring from `JobTable::refresh`.

static FG_PGID: AtomicI32 = AtomicI32::new(0);

const WATCH_SLOTS: usize = 256;
const EVENT_SLOTS: usize = 256;

#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_SLOT: AtomicI32 = AtomicI32::new(0);
#[allow(clippy::declare_interior_mutable_const)]
const EMPTY_EVENT: AtomicU64 = AtomicU64::new(0);

/// Pids of background/stopped job members the SIGCHLD handler may reap
static WATCHED: [AtomicI32; WATCH_SLOTS] = [EMPTY_SLOT; WATCH_SLOTS];

/// Statuses collected by the SIGCHLD handler, waiting for `JobTable::refresh`
static EVENTS: EventRing = EventRing::new();

/// The process group currently owning the terminal.
///
/// Set before the terminal is handed over and cleared before the prompt comes back, so the
/// relay never forwards to a group that is already gone.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForegroundHandle;

impl ForegroundHandle {
	pub fn set(&self, pgid: Pid) {
		FG_PGID.store(pgid.as_raw(), Ordering::SeqCst);
	}
	pub fn clear(&self) {
		FG_PGID.store(0, Ordering::SeqCst);
	}
	pub fn current(&self) -> Option<Pid> {
		match FG_PGID.load(Ordering::SeqCst) {
			0 => None,
			pgid => Some(Pid::from_raw(pgid))
		}
	}
}

/// Install the shell's handlers. Called once at startup by interactive shells.
pub fn sig_handler_setup() -> ShResult<()> {
	unsafe {
		signal_hook::low_level::register(SIGINT, forward_interrupt)?;
		signal_hook::low_level::register(SIGTSTP, forward_stop)?;
		signal_hook::low_level::register(SIGCHLD, reap_watched)?;
		signal(Signal::SIGQUIT, SigHandler::SigIgn)?;
		signal(Signal::SIGTTIN, SigHandler::SigIgn)?;
		signal(Signal::SIGTTOU, SigHandler::SigIgn)?;
	}
	debug!("signal handlers installed");
	Ok(())
}

/// Runs in a freshly forked child: ignored dispositions survive exec, so put them back
pub fn reset_for_child() {
	for sig in [Signal::SIGINT, Signal::SIGTSTP, Signal::SIGQUIT, Signal::SIGTTIN, Signal::SIGTTOU, Signal::SIGCHLD] {
		let _ = unsafe { signal(sig, SigHandler::SigDfl) };
	}
}

fn forward_to_foreground(sig: libc::c_int) {
	let pgid = FG_PGID.load(Ordering::SeqCst);
	if pgid > 0 {
		unsafe { libc::kill(-pgid, sig) };
	}
}

fn forward_interrupt() {
	forward_to_foreground(libc::SIGINT);
}

fn forward_stop() {
	// The foreground controller sees the stop through waitpid
	forward_to_foreground(libc::SIGTSTP);
}

fn reap_watched() {
	let flags = libc::WNOHANG | libc::WUNTRACED | libc::WCONTINUED;
	for slot in WATCHED.iter() {
		let pid = slot.load(Ordering::Acquire);
		if pid <= 0 {
			continue
		}
		let mut status: libc::c_int = 0;
		let rc = unsafe { libc::waitpid(pid, &mut status, flags) };
		if rc == pid {
			EVENTS.push(pid, status);
			if libc::WIFEXITED(status) || libc::WIFSIGNALED(status) {
				let _ = slot.compare_exchange(pid, 0, Ordering::AcqRel, Ordering::Relaxed);
			}
		} else if rc < 0 {
			// ECHILD: someone else collected it
			let _ = slot.compare_exchange(pid, 0, Ordering::AcqRel, Ordering::Relaxed);
		}
	}
}

/// Single-producer (handler) single-consumer (main loop) ring of `(pid, raw status)`.
/// A full ring drops the event and counts it.
pub struct EventRing {
	slots: [AtomicU64; EVENT_SLOTS],
	head: AtomicUsize,
	tail: AtomicUsize,
	dropped: AtomicUsize,
}

impl Default for EventRing {
	fn default() -> Self {
		Self::new()
	}
}

impl EventRing {
	pub const fn new() -> Self {
		Self {
			slots: [EMPTY_EVENT; EVENT_SLOTS],
			head: AtomicUsize::new(0),
			tail: AtomicUsize::new(0),
			dropped: AtomicUsize::new(0),
		}
	}

	/// Signal-safe: atomics only
	pub fn push(&self, pid: libc::pid_t, status: libc::c_int) {
		let head = self.head.load(Ordering::Relaxed);
		let tail = self.tail.load(Ordering::Acquire);
		if head.wrapping_sub(tail) >= EVENT_SLOTS {
			self.dropped.fetch_add(1, Ordering::Relaxed);
			return
		}
		let packed = ((pid as u32 as u64) << 32) | status as u32 as u64;
		self.slots[head % EVENT_SLOTS].store(packed, Ordering::Relaxed);
		self.head.store(head.wrapping_add(1), Ordering::Release);
	}

	/// Hand every queued status to `f`, oldest first. Returns how many events were lost since
	/// the last drain.
	pub fn drain<F: FnMut(WaitStatus)>(&self, mut f: F) -> usize {
		let dropped = self.dropped.swap(0, Ordering::Relaxed);
		loop {
			let tail = self.tail.load(Ordering::Relaxed);
			let head = self.head.load(Ordering::Acquire);
			if tail == head {
				break
			}
			let packed = self.slots[tail % EVENT_SLOTS].load(Ordering::Relaxed);
			self.tail.store(tail.wrapping_add(1), Ordering::Release);
			let pid = Pid::from_raw((packed >> 32) as u32 as i32);
			let raw = packed as u32 as i32;
			match WaitStatus::from_raw(pid, raw) {
				Ok(status) => {
					trace!("relay event: {:?}",status);
					f(status)
				}
				Err(e) => warn!("undecodable wait status {} for pid {}: {}",raw,pid,e)
			}
		}
		dropped
	}
}

/// Drain the SIGCHLD handler's events
pub fn drain_events<F: FnMut(WaitStatus)>(f: F) {
	let dropped = EVENTS.drain(f);
	if dropped > 0 {
		// Lost statuses show up as ECHILD when the table polls those pids
		warn!("signal relay dropped {} child status event(s)",dropped);
	}
}

/// Let the SIGCHLD handler reap `pid`
pub fn watch_pid(pid: Pid) {
	let raw = pid.as_raw();
	if raw <= 0 || WATCHED.iter().any(|slot| slot.load(Ordering::Acquire) == raw) {
		return
	}
	for slot in WATCHED.iter() {
		if slot.compare_exchange(0, raw, Ordering::AcqRel, Ordering::Relaxed).is_ok() {
			trace!("watching pid {}",pid);
			return
		}
	}
	// Still reaped by JobTable::refresh, just not eagerly
	debug!("pid registry full, pid {} left to polling",pid);
}

pub fn unwatch_pid(pid: Pid) {
	let raw = pid.as_raw();
	for slot in WATCHED.iter() {
		if slot.compare_exchange(raw, 0, Ordering::AcqRel, Ordering::Relaxed).is_ok() {
			trace!("unwatched pid {}",pid);
		}
	}
}

pub fn is_watched(pid: Pid) -> bool {
	WATCHED.iter().any(|slot| slot.load(Ordering::Acquire) == pid.as_raw())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn watch_and_unwatch() {
		let pid = Pid::from_raw(5_800_001);
		watch_pid(pid);
		watch_pid(pid);
		assert!(is_watched(pid));
		unwatch_pid(pid);
		assert!(!is_watched(pid));
	}

	#[test]
	fn ring_decodes_statuses_in_order() {
		let ring = EventRing::new();
		ring.push(5_800_200, 3 << 8);
		ring.push(5_800_201, (libc::SIGTSTP << 8) | 0x7f);
		ring.push(5_800_202, libc::SIGKILL);
		let mut seen = vec![];
		assert_eq!(ring.drain(|status| seen.push(status)), 0);
		assert_eq!(seen, vec![
			WaitStatus::Exited(Pid::from_raw(5_800_200), 3),
			WaitStatus::Stopped(Pid::from_raw(5_800_201), Signal::SIGTSTP),
			WaitStatus::Signaled(Pid::from_raw(5_800_202), Signal::SIGKILL, false),
		]);
		assert_eq!(ring.drain(|_| panic!("ring should be empty")), 0);
	}

	#[test]
	fn full_ring_counts_dropped_events() {
		let ring = EventRing::new();
		for i in 0..EVENT_SLOTS + 10 {
			ring.push(5_800_300 + i as i32, 0);
		}
		let mut count = 0;
		assert_eq!(ring.drain(|_| count += 1), 10);
		assert_eq!(count, EVENT_SLOTS);

		// Space is reclaimed once drained
		ring.push(5_800_299, 0);
		let mut last = None;
		assert_eq!(ring.drain(|status| last = Some(status)), 0);
		assert_eq!(last, Some(WaitStatus::Exited(Pid::from_raw(5_800_299), 0)));
	}

	#[test]
	fn foreground_handle_round_trip() {
		let handle = ForegroundHandle;
		handle.set(Pid::from_raw(5_800_100));
		assert_eq!(handle.current(), Some(Pid::from_raw(5_800_100)));
		handle.clear();
		assert_eq!(handle.current(), None);
	}
}
