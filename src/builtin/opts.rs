use std::io::Write;

use libc::STDOUT_FILENO;

use crate::error::{ShErr, ShResult};
use crate::shellenv::ShellState;
use crate::utils::RustFd;

/// `setopt core.notify_done=false prompt.text="$ "`
pub fn setopt(argv: &[String], state: &mut ShellState) -> ShResult<i32> {
	if argv.len() < 2 {
		return Err(ShErr::invalid_opt("setopt: expected key=value"))
	}
	for arg in &argv[1..] {
		let Some((key, value)) = arg.split_once('=') else {
			return Err(ShErr::invalid_opt(format!("setopt: expected key=value, got `{}'",arg)))
		};
		state.opts.set_str(key, value)?;
	}
	Ok(0)
}

pub fn getopt(argv: &[String], state: &mut ShellState) -> ShResult<i32> {
	let mut stdout = RustFd::new(STDOUT_FILENO)?;
	if argv.len() < 2 {
		let all = serde_json::to_string_pretty(&state.opts)
			.map_err(|e| ShErr::invalid_opt(e.to_string()))?;
		writeln!(stdout,"{}",all)?;
		return Ok(0)
	}
	for key in &argv[1..] {
		let value = state.opts.get(key)?;
		writeln!(stdout,"{}",value)?;
	}
	Ok(0)
}
