use log::warn;

use crate::error::{ShErr, ShResult};
use crate::shellenv::ShellState;

/// `exit`/`quit [code]`. Unwinds to the main loop, which kills remaining jobs before leaving.
/// A non-numeric code is reported and the last status is used instead.
pub fn exit(argv: &[String], state: &mut ShellState) -> ShResult<i32> {
	let code = match argv.get(1) {
		Some(arg) => match arg.parse::<i32>() {
			Ok(code) => code,
			Err(_) => {
				eprintln!("{}: {}: numeric argument required",argv[0],arg);
				warn!("exit with invalid code `{}', using last status {}",arg,state.last_status);
				state.last_status
			}
		},
		None => state.last_status
	};
	Err(ShErr::CleanExit(code))
}
