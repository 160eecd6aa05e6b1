use std::io::Write;

use libc::STDOUT_FILENO;
use log::{debug, warn};

use crate::command::Pipeline;
use crate::error::{ShErr, ShResult};
use crate::shellenv::ShellState;
use crate::utils::{ExecFlags, RustFd};

pub mod foreground;
pub mod launch;
pub mod pipes;
pub mod redir;

use foreground::run_foreground;
use launch::Launched;

/// Launch a pipeline and either wait on it or hand it to the job table.
/// Returns the status the pipeline reports, which is also stored as the shell's last status.
pub fn exec_pipeline(pipeline: &Pipeline, state: &mut ShellState) -> ShResult<i32> {
	let mut flags = ExecFlags::empty();
	if pipeline.background() {
		flags |= ExecFlags::BACKGROUND;
	}
	if pipeline.len() > 1 {
		flags |= ExecFlags::IN_PIPE;
	}
	let cmd = pipeline.display_cmd();
	debug!("executing `{}' with flags {:?}",cmd,flags);

	let status = match launch::launch(pipeline, flags, state) {
		Ok(Launched::Builtin(status)) => status,
		Ok(Launched::Group(group)) if flags.contains(ExecFlags::BACKGROUND) => {
			let pgid = group.pgid();
			state.jobs.add(group, cmd, true);
			let mut stdout = RustFd::new(STDOUT_FILENO)?;
			writeln!(stdout,"[bg] {}",pgid)?;
			0
		}
		Ok(Launched::Group(group)) => run_foreground(group, &cmd, state)?.status(),
		Err(ShErr::Launch { group, errno }) => {
			// Keep the stages that did start reachable for refresh and kill_all
			let id = state.jobs.add(group.clone(), cmd, true);
			warn!("partially launched pipeline tracked as job [{}]",id);
			return Err(ShErr::Launch { group, errno })
		}
		Err(e) => return Err(e)
	};

	state.last_status = status;
	Ok(status)
}
