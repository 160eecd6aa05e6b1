use std::env;
use std::io::Write;

use libc::STDOUT_FILENO;

use crate::error::ShResult;
use crate::shellenv::ShellState;
use crate::utils::RustFd;

pub fn execute(_argv: &[String], _state: &mut ShellState) -> ShResult<i32> {
	let pwd = env::current_dir()?;
	let mut stdout = RustFd::new(STDOUT_FILENO)?;
	writeln!(stdout,"{}",pwd.display())?;
	Ok(0)
}
