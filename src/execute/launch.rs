use std::ffi::CString;
use std::io::{self, Write};

use log::{debug, info, trace, warn};
use nix::errno::Errno;
use nix::unistd::{fork, getpid, setpgid, ForkResult, Pid};

use crate::builtin::{self, BuiltinFn};
use crate::command::{Pipeline, Stage};
use crate::error::{ShErr, ShResult};
use crate::jobs::ProcessGroup;
use crate::shellenv::{attach_tty, ShellState};
use crate::signal;
use crate::utils::{exec_external, restore_fds, save_fds, ExecFlags};

use super::pipes::PipeFabric;
use super::redir::{self, REDIR_FAILED};

#[derive(Debug)]
pub enum Launched {
	/// Ran inside the shell process
	Builtin(i32),
	Group(ProcessGroup),
}

/// Start every stage of `pipeline`.
///
/// A lone builtin runs in the shell itself. Anything else gets one child per stage, all in a
/// fresh process group whose id is the first child's pid.
pub fn launch(pipeline: &Pipeline, flags: ExecFlags, state: &mut ShellState) -> ShResult<Launched> {
	if !flags.contains(ExecFlags::IN_PIPE) {
		let stage = &pipeline.stages()[0];
		if let Some(func) = builtin::lookup(stage.name()) {
			trace!("running builtin {} in the shell",stage.name());
			return run_inline(stage, func, state).map(Launched::Builtin)
		}
	}

	let argvs = pipeline.stages()
		.iter()
		.map(Stage::c_argv)
		.collect::<ShResult<Vec<Vec<CString>>>>()?;

	// Children inherit unflushed buffers
	io::stdout().flush()?;
	io::stderr().flush()?;

	let mut fabric = PipeFabric::build(pipeline.len())?;
	let mut group = ProcessGroup::launching();
	// The terminal moves with the first fork so no stage reads it from the background
	let take_tty = !flags.contains(ExecFlags::BACKGROUND) && state.is_interactive();

	for (i, (stage, argv)) in pipeline.stages().iter().zip(argvs.iter()).enumerate() {
		match unsafe { fork() } {
			Ok(ForkResult::Child) => {
				let fabric = std::mem::take(&mut fabric);
				exec_stage(stage, argv, i, fabric, group.pgid(), take_tty, state)
			}
			Ok(ForkResult::Parent { child }) => {
				let pgid = group.push(child);
				// Both sides call setpgid, whichever runs first wins
				match setpgid(child, pgid) {
					Ok(()) | Err(Errno::EACCES) | Err(Errno::ESRCH) => {}
					Err(e) => warn!("setpgid({}, {}) failed: {}",child,pgid,e)
				}
				if i == 0 && take_tty {
					if let Err(e) = attach_tty(pgid) {
						warn!("could not hand the terminal to pgid {}: {}",pgid,e);
					}
				}
				debug!("stage {} ({}) forked as pid {} in group {}",i,stage.name(),child,pgid);
			}
			Err(errno) => {
				fabric.close_all()?;
				if group.members().is_empty() {
					return Err(ShErr::setup(format!("fork failed: {}",errno)))
				}
				warn!("fork failed at stage {} of {}: {}",i + 1,pipeline.len(),errno);
				if take_tty {
					attach_tty(state.shell_pgid())?;
				}
				return Err(ShErr::Launch { group, errno })
			}
		}
	}

	fabric.close_all()?;
	group.activate();
	info!("launched group {} with {} member(s)",group.pgid(),group.members().len());
	Ok(Launched::Group(group))
}

/// Builtin in the shell process. Redirections are applied to the shell's own stdio and undone after.
fn run_inline(stage: &Stage, func: BuiltinFn, state: &mut ShellState) -> ShResult<i32> {
	if !stage.has_redirs() {
		return func(stage.argv(), state)
	}
	let saved = save_fds()?;
	let result = match redir::apply(stage) {
		Ok(()) => func(stage.argv(), state),
		Err(e) => {
			eprintln!("{}",e);
			Ok(REDIR_FAILED)
		}
	};
	io::stdout().flush()?;
	restore_fds(saved)?;
	result
}

/// Child side of a stage. Never returns.
fn exec_stage(stage: &Stage, argv: &[CString], index: usize, fabric: PipeFabric, pgid: Pid, take_tty: bool, state: &mut ShellState) -> ! {
	signal::reset_for_child();
	let pgid = if pgid.as_raw() == 0 { getpid() } else { pgid };
	let _ = setpgid(Pid::from_raw(0), pgid);
	if take_tty {
		let _ = attach_tty(pgid);
	}

	if let Err(e) = fabric.wire_stage(index) {
		eprintln!("{}: {}",stage.name(),e);
		std::process::exit(REDIR_FAILED)
	}
	if let Err(e) = redir::apply(stage) {
		eprintln!("{}",e);
		std::process::exit(REDIR_FAILED)
	}

	if let Some(func) = builtin::lookup(stage.name()) {
		let code = match func(stage.argv(), state) {
			Ok(code) => code,
			Err(ShErr::CleanExit(code)) => code,
			Err(e) => {
				eprintln!("{}",e);
				1
			}
		};
		let _ = io::stdout().flush();
		std::process::exit(code)
	}

	exec_external(argv)
}
