use std::env;
use std::path::PathBuf;

use log::debug;

use crate::error::ShResult;
use crate::shellenv::ShellState;

pub fn execute(argv: &[String], _state: &mut ShellState) -> ShResult<i32> {
	let new_pwd = match argv.get(1).map(String::as_str) {
		Some("-") => env::var("OLDPWD").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("/")),
		Some(arg) => PathBuf::from(arg),
		None => env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("/"))
	};
	let old_pwd = env::current_dir()?;
	if let Err(e) = env::set_current_dir(&new_pwd) {
		eprintln!("cd: {}: {}",new_pwd.display(),e);
		return Ok(1)
	}
	let pwd = env::current_dir()?;
	debug!("cd: {} -> {}",old_pwd.display(),pwd.display());
	env::set_var("OLDPWD", old_pwd);
	env::set_var("PWD", pwd);
	Ok(0)
}
