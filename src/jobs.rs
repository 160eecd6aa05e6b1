use std::fmt::{self, Display};
use std::io::Write;

use log::{debug, info, trace, warn};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::error::{ShErr, ShResult};
use crate::signal;

/// Job listings cut commands down to this many characters unless asked not to
pub const DEFAULT_DISPLAY_WIDTH: usize = 80;

/// Last observed state of a single process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
	Running,
	Stopped(Signal),
	Exited(i32),
	Signaled(Signal),
	/// Collected somewhere we could not see the status
	Reaped,
}

impl ProcState {
	pub fn is_alive(&self) -> bool {
		matches!(self, ProcState::Running | ProcState::Stopped(_))
	}
	pub fn is_stopped(&self) -> bool {
		matches!(self, ProcState::Stopped(_))
	}
	/// Shell-style status code, signals map to 128 + signo
	pub fn code(&self) -> Option<i32> {
		match self {
			ProcState::Exited(code) => Some(*code),
			ProcState::Signaled(sig) => Some(128 + *sig as i32),
			_ => None
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
	pid: Pid,
	state: ProcState,
}

impl Member {
	pub fn pid(&self) -> Pid {
		self.pid
	}
	pub fn state(&self) -> ProcState {
		self.state
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupPhase {
	/// Children are still being forked
	Launching,
	Active,
	/// No member is alive anymore
	Reaped,
}

/// A process group created for one pipeline. The pgid is the first member's pid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessGroup {
	pgid: Option<Pid>,
	members: Vec<Member>,
	launched: bool,
}

impl Default for ProcessGroup {
	fn default() -> Self {
		Self::launching()
	}
}

impl ProcessGroup {
	pub fn launching() -> Self {
		Self { pgid: None, members: vec![], launched: false }
	}

	/// Record a freshly forked member. The first one establishes the group id.
	pub fn push(&mut self, pid: Pid) -> Pid {
		let pgid = *self.pgid.get_or_insert(pid);
		self.members.push(Member { pid, state: ProcState::Running });
		pgid
	}

	/// Called once every stage has been forked
	pub fn activate(&mut self) {
		self.launched = true;
	}

	/// The group id, or `0` while no member exists yet
	pub fn pgid(&self) -> Pid {
		self.pgid.unwrap_or(Pid::from_raw(0))
	}

	pub fn members(&self) -> &[Member] {
		&self.members
	}

	pub fn pids(&self) -> impl Iterator<Item = Pid> + '_ {
		self.members.iter().map(|m| m.pid)
	}

	pub fn live_pids(&self) -> Vec<Pid> {
		self.members.iter().filter(|m| m.state.is_alive()).map(|m| m.pid).collect()
	}

	pub fn contains(&self, pid: Pid) -> bool {
		self.members.iter().any(|m| m.pid == pid)
	}

	pub fn phase(&self) -> GroupPhase {
		if !self.launched {
			GroupPhase::Launching
		} else if self.members.iter().any(|m| m.state.is_alive()) {
			GroupPhase::Active
		} else {
			GroupPhase::Reaped
		}
	}

	pub fn any_stopped(&self) -> bool {
		self.members.iter().any(|m| m.state.is_stopped())
	}

	/// Apply a wait status to the member it belongs to. Returns false for foreign pids.
	pub fn update(&mut self, status: WaitStatus) -> bool {
		let Some(pid) = status.pid() else {
			return false
		};
		let pgid = self.pgid();
		let Some(member) = self.members.iter_mut().find(|m| m.pid == pid) else {
			return false
		};
		let new_state = match status {
			WaitStatus::Exited(_, code) => ProcState::Exited(code),
			WaitStatus::Signaled(_, sig, _) => ProcState::Signaled(sig),
			WaitStatus::Stopped(_, sig) => ProcState::Stopped(sig),
			WaitStatus::Continued(_) => ProcState::Running,
			_ => return true
		};
		trace!("member {} of group {}: {:?} -> {:?}",pid,pgid,member.state,new_state);
		member.state = new_state;
		true
	}

	pub fn mark_reaped(&mut self, pid: Pid) {
		if let Some(member) = self.members.iter_mut().find(|m| m.pid == pid && m.state.is_alive()) {
			member.state = ProcState::Reaped;
		}
	}

	/// Stopped members are assumed running again after a SIGCONT
	pub fn mark_continued(&mut self) {
		for member in self.members.iter_mut().filter(|m| m.state.is_stopped()) {
			member.state = ProcState::Running;
		}
	}

	/// Status of the last stage, which is what the pipeline as a whole reports
	pub fn last_code(&self) -> Option<i32> {
		self.members.last().and_then(|m| m.state.code())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
	Running,
	Stopped,
	Done,
}

impl Display for JobState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			JobState::Running => write!(f,"Running"),
			JobState::Stopped => write!(f,"Stopped"),
			JobState::Done => write!(f,"Done"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
	id: usize,
	group: ProcessGroup,
	cmd: String,
	state: JobState,
}

impl Job {
	pub fn id(&self) -> usize {
		self.id
	}
	pub fn pgid(&self) -> Pid {
		self.group.pgid()
	}
	pub fn group(&self) -> &ProcessGroup {
		&self.group
	}
	pub fn into_group(self) -> ProcessGroup {
		self.group
	}
	pub fn cmd(&self) -> &str {
		&self.cmd
	}
	pub fn state(&self) -> JobState {
		self.state
	}

	fn sync_state(&mut self) {
		self.state = if self.group.phase() == GroupPhase::Reaped {
			JobState::Done
		} else if self.group.any_stopped() {
			JobState::Stopped
		} else {
			JobState::Running
		}
	}

	/// `[<id>] <state> <cmd> [<pgid>]`, with cmd cut to `width` characters when given
	pub fn display(&self, width: Option<usize>) -> String {
		let cmd = match width {
			Some(max) if self.cmd.chars().count() > max => {
				let cut = self.cmd.chars().take(max.saturating_sub(3)).collect::<String>();
				format!("{}...",cut)
			}
			_ => self.cmd.clone()
		};
		format!("[{}] {} {} [{}]",self.id,self.state,cmd,self.pgid())
	}
}

/// Background and stopped pipelines.
///
/// Ids are handed out monotonically and never reused. A pgid is tracked by at most one job.
/// Live member pids are registered with the signal relay so SIGCHLD can reap them; the
/// statuses it collects are folded back in on `refresh`.
#[derive(Debug)]
pub struct JobTable {
	jobs: Vec<Job>,
	next_id: usize,
}

impl Default for JobTable {
	fn default() -> Self {
		Self::new()
	}
}

impl JobTable {
	pub fn new() -> Self {
		Self { jobs: vec![], next_id: 1 }
	}

	pub fn len(&self) -> usize {
		self.jobs.len()
	}

	pub fn is_empty(&self) -> bool {
		self.jobs.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Job> {
		self.jobs.iter()
	}

	pub fn get(&self, id: usize) -> Option<&Job> {
		self.jobs.iter().find(|j| j.id == id)
	}

	pub fn query_pgid(&self, pgid: Pid) -> Option<&Job> {
		self.jobs.iter().find(|j| j.pgid() == pgid)
	}

	/// Most recently added job, the default target of `fg`/`bg`
	pub fn last_id(&self) -> Option<usize> {
		self.jobs.iter().map(|j| j.id).max()
	}

	/// Track a group. If its pgid is already tracked, that job is updated instead of duplicated.
	pub fn add(&mut self, mut group: ProcessGroup, cmd: impl Into<String>, running: bool) -> usize {
		group.activate();
		for pid in group.live_pids() {
			signal::watch_pid(pid);
		}
		let pgid = group.pgid();
		let state = if running { JobState::Running } else { JobState::Stopped };

		if let Some(job) = self.jobs.iter_mut().find(|j| j.pgid() == pgid) {
			debug!("pgid {} already tracked as job {}, updating",pgid,job.id);
			job.group = group;
			job.cmd = cmd.into();
			job.state = state;
			return job.id
		}

		let id = self.next_id;
		self.next_id += 1;
		info!("new job [{}] pgid {} ({})",id,pgid,state);
		self.jobs.push(Job { id, group, cmd: cmd.into(), state });
		id
	}

	/// Stop tracking a job without touching its processes
	pub fn remove(&mut self, id: usize) -> Option<Job> {
		let pos = self.jobs.iter().position(|j| j.id == id)?;
		let job = self.jobs.remove(pos);
		for pid in job.group.pids() {
			signal::unwatch_pid(pid);
		}
		Some(job)
	}

	/// Fold in every state change since the last call, then prune finished jobs.
	/// Returns the pruned jobs.
	pub fn refresh(&mut self) -> Vec<Job> {
		signal::drain_events(|status| {
			let Some(pid) = status.pid() else { return };
			if !self.jobs.iter_mut().any(|j| j.group.update(status)) {
				trace!("relay reported untracked pid {}",pid);
			}
		});

		for job in self.jobs.iter_mut() {
			for pid in job.group.live_pids() {
				poll_member(&mut job.group, pid);
			}
			job.sync_state();
		}

		let (done, live): (Vec<Job>, Vec<Job>) = std::mem::take(&mut self.jobs)
			.into_iter()
			.partition(|j| j.state == JobState::Done);
		self.jobs = live;
		for job in &done {
			debug!("pruning finished job [{}] pgid {}",job.id,job.pgid());
			for pid in job.group.pids() {
				signal::unwatch_pid(pid);
			}
		}
		done
	}

	/// Write one line per job. Commands are truncated to `width` unless `verbose` is set.
	pub fn list<W: Write>(&mut self, verbose: bool, width: usize, out: &mut W) -> ShResult<Vec<Job>> {
		let done = self.refresh();
		self.write_list(verbose, width, out)?;
		Ok(done)
	}

	/// Write the table as last observed, without waiting on anything.
	/// Forked children use this: the shell's jobs are not their children.
	pub fn write_list<W: Write>(&self, verbose: bool, width: usize, out: &mut W) -> ShResult<()> {
		let width = if verbose { None } else { Some(width) };
		for job in &self.jobs {
			writeln!(out,"{}",job.display(width))?;
		}
		Ok(())
	}

	/// Resume a job in the background and keep tracking it
	pub fn background(&mut self, id: usize) -> ShResult<&Job> {
		let pos = self.jobs.iter().position(|j| j.id == id).ok_or(ShErr::NoSuchJob { op: "bg", id })?;
		let job = &mut self.jobs[pos];
		match killpg(job.pgid(), Signal::SIGCONT) {
			Ok(()) => {
				job.group.mark_continued();
				job.state = JobState::Running;
			}
			Err(Errno::ESRCH) => {
				// Group vanished before we got to it; the next refresh prunes it
				debug!("bg: group {} already gone",job.pgid());
				for pid in job.group.live_pids() {
					job.group.mark_reaped(pid);
				}
				job.state = JobState::Done;
			}
			Err(errno) => return Err(ShErr::SignalDelivery { id, errno })
		}
		Ok(&self.jobs[pos])
	}

	/// Deliver an arbitrary signal to a job's whole group
	pub fn signal(&mut self, id: usize, sig: Signal) -> ShResult<()> {
		let job = self.get(id).ok_or(ShErr::NoSuchJob { op: "sig", id })?;
		let pgid = job.pgid();
		match killpg(pgid, sig) {
			Ok(()) => {
				debug!("sent {} to job [{}] pgid {}",sig,id,pgid);
				if sig == Signal::SIGCONT {
					if let Some(job) = self.jobs.iter_mut().find(|j| j.id == id) {
						job.group.mark_continued();
						job.state = JobState::Running;
					}
				}
				Ok(())
			}
			Err(Errno::ESRCH) => {
				warn!("job [{}] pgid {} no longer exists, removing it",id,pgid);
				self.remove(id);
				Ok(())
			}
			Err(errno) => Err(ShErr::SignalDelivery { id, errno })
		}
	}

	/// SIGKILL every tracked group, reap every member and empty the table
	pub fn kill_all(&mut self) {
		for job in std::mem::take(&mut self.jobs) {
			let pgid = job.pgid();
			for pid in job.group.pids() {
				signal::unwatch_pid(pid);
			}
			if let Err(e) = killpg(pgid, Signal::SIGKILL) {
				debug!("kill_all: killpg {} failed: {}",pgid,e);
			}
			for pid in job.group.live_pids() {
				reap_blocking(pid);
			}
			info!("killed job [{}] pgid {}",job.id,pgid);
		}
	}
}

fn poll_member(group: &mut ProcessGroup, pid: Pid) {
	let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
	loop {
		match waitpid(pid, Some(flags)) {
			Ok(WaitStatus::StillAlive) => return,
			Ok(status) => {
				group.update(status);
				return
			}
			Err(Errno::EINTR) => continue,
			Err(Errno::ECHILD) => {
				// Already collected elsewhere
				group.mark_reaped(pid);
				return
			}
			Err(e) => {
				warn!("waitpid({}) failed: {}",pid,e);
				return
			}
		}
	}
}

fn reap_blocking(pid: Pid) {
	loop {
		match waitpid(pid, None) {
			Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) => return,
			Ok(_) | Err(Errno::EINTR) => continue,
			Err(_) => return
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	// Above PID_MAX_LIMIT, so these never name a real process
	fn fake_group(pids: &[i32]) -> ProcessGroup {
		let mut group = ProcessGroup::launching();
		for pid in pids {
			group.push(Pid::from_raw(*pid));
		}
		group.activate();
		group
	}

	#[test]
	fn pgid_is_first_member() {
		let group = fake_group(&[5_900_001, 5_900_002, 5_900_003]);
		assert_eq!(group.pgid(), Pid::from_raw(5_900_001));
		assert_eq!(group.members().len(), 3);
		assert_eq!(group.phase(), GroupPhase::Active);
	}

	#[test]
	fn group_phases() {
		let mut group = ProcessGroup::launching();
		assert_eq!(group.phase(), GroupPhase::Launching);
		group.push(Pid::from_raw(5_900_010));
		group.activate();
		assert_eq!(group.phase(), GroupPhase::Active);
		group.update(WaitStatus::Exited(Pid::from_raw(5_900_010), 0));
		assert_eq!(group.phase(), GroupPhase::Reaped);
	}

	#[test]
	fn ids_are_monotonic_and_not_reused() {
		let mut table = JobTable::new();
		let first = table.add(fake_group(&[5_900_100]), "sleep 5", true);
		let second = table.add(fake_group(&[5_900_101]), "sleep 6", true);
		assert!(second > first);
		table.remove(second);
		let third = table.add(fake_group(&[5_900_102]), "sleep 7", true);
		assert!(third > second);
		table.kill_all();
	}

	#[test]
	fn same_pgid_is_not_duplicated() {
		let mut table = JobTable::new();
		let id = table.add(fake_group(&[5_900_200]), "vim", true);
		let again = table.add(fake_group(&[5_900_200]), "vim", false);
		assert_eq!(id, again);
		assert_eq!(table.len(), 1);
		assert_eq!(table.get(id).unwrap().state(), JobState::Stopped);
		table.remove(id);
	}

	#[test]
	fn state_follows_members() {
		let mut job = Job { id: 1, group: fake_group(&[5_900_300, 5_900_301]), cmd: "a | b".into(), state: JobState::Running };
		job.group.update(WaitStatus::Stopped(Pid::from_raw(5_900_301), Signal::SIGTSTP));
		job.sync_state();
		assert_eq!(job.state(), JobState::Stopped);

		job.group.update(WaitStatus::Continued(Pid::from_raw(5_900_301)));
		job.sync_state();
		assert_eq!(job.state(), JobState::Running);

		job.group.update(WaitStatus::Exited(Pid::from_raw(5_900_300), 0));
		job.sync_state();
		assert_eq!(job.state(), JobState::Running);

		job.group.update(WaitStatus::Signaled(Pid::from_raw(5_900_301), Signal::SIGTERM, false));
		job.sync_state();
		assert_eq!(job.state(), JobState::Done);
		assert_eq!(job.group().last_code(), Some(128 + 15));
	}

	#[test]
	fn already_reaped_jobs_are_pruned() {
		let mut table = JobTable::new();
		let id = table.add(fake_group(&[5_900_400]), "ghost", true);
		let done = table.refresh();
		assert_eq!(done.len(), 1);
		assert_eq!(done[0].id(), id);
		assert_eq!(done[0].state(), JobState::Done);
		assert!(table.is_empty());
	}

	#[test]
	fn unknown_ids_are_errors() {
		let mut table = JobTable::new();
		assert!(matches!(table.background(7), Err(ShErr::NoSuchJob { op: "bg", id: 7 })));
		assert!(matches!(table.signal(7, Signal::SIGTERM), Err(ShErr::NoSuchJob { op: "sig", id: 7 })));
	}

	#[test]
	fn write_list_leaves_the_table_alone() {
		let mut table = JobTable::new();
		table.add(fake_group(&[5_900_500]), "sleep 30", true);
		let mut out = vec![];
		table.write_list(false, DEFAULT_DISPLAY_WIDTH, &mut out).unwrap();
		assert_eq!(String::from_utf8(out).unwrap(), "[1] Running sleep 30 [5900500]\n");
		assert_eq!(table.len(), 1);
		table.remove(1);
	}

	#[test]
	fn display_format() {
		let job = Job { id: 3, group: fake_group(&[4242]), cmd: "sleep 5".into(), state: JobState::Running };
		insta::assert_snapshot!(job.display(Some(DEFAULT_DISPLAY_WIDTH)), @"[3] Running sleep 5 [4242]");
	}

	#[test]
	fn display_truncates_long_commands() {
		let job = Job { id: 1, group: fake_group(&[4243]), cmd: "x".repeat(20), state: JobState::Stopped };
		insta::assert_snapshot!(job.display(Some(10)), @"[1] Stopped xxxxxxx... [4243]");
		assert_eq!(job.display(None), format!("[1] Stopped {} [4243]", "x".repeat(20)));
	}
}
