use std::path::PathBuf;

use clap::{Arg, ArgAction, Command};
use log::{debug, error, info};

use jobash::error::{ShErr, ShResult};
use jobash::execute::exec_pipeline;
use jobash::parse::parse_line;
use jobash::prompt::{self, Input};
use jobash::shellenv::ShellState;
use jobash::shopt::{ShOpts, OPTS_ENV_VAR};

fn cli() -> Command {
	Command::new("jobash")
		.about("A small job-control shell")
		.arg(
			Arg::new("command")
				.short('c')
				.value_name("LINE")
				.help("Run one line and exit with its status")
				.action(ArgAction::Set)
		)
		.arg(
			Arg::new("opts")
				.long("opts")
				.value_name("FILE")
				.value_parser(clap::value_parser!(PathBuf))
				.help("Options file (json), defaults to $JOBASH_OPTS")
				.action(ArgAction::Set)
		)
}

fn load_opts(path: Option<&PathBuf>) -> ShOpts {
	let path = path.cloned().or_else(|| std::env::var_os(OPTS_ENV_VAR).map(PathBuf::from));
	let Some(path) = path else {
		return ShOpts::default()
	};
	ShOpts::load(&path).unwrap_or_else(|e| {
		eprintln!("jobash: {}, using defaults",e);
		ShOpts::default()
	})
}

/// Run every pipeline on a line. Errors stop the line, `exit` propagates as `CleanExit`.
fn run_line(line: &str, state: &mut ShellState) -> ShResult<()> {
	for pipeline in parse_line(line)? {
		exec_pipeline(&pipeline, state)?;
	}
	Ok(())
}

fn repl(state: &mut ShellState) -> ShResult<i32> {
	let mut rl = prompt::init_prompt(&state.opts)?;
	loop {
		if let Err(e) = state.notify_done() {
			error!("job refresh failed: {}",e);
		}
		let line = match prompt::read_line(&mut rl, &state.opts.prompt.text)? {
			Input::Line(line) => line,
			Input::Interrupted => continue,
			Input::Eof => return Ok(state.last_status)
		};
		match run_line(&line, state) {
			Ok(()) => {}
			Err(ShErr::CleanExit(code)) => return Ok(code),
			Err(e) => {
				eprintln!("{}",e);
				state.last_status = 1;
			}
		}
	}
}

fn main() {
	env_logger::init();
	let matches = cli().get_matches();
	let opts = load_opts(matches.get_one::<PathBuf>("opts"));
	let mut state = ShellState::new(opts);

	let code = if let Some(line) = matches.get_one::<String>("command") {
		debug!("running single line: {}",line);
		match run_line(line, &mut state) {
			Ok(()) => state.last_status,
			Err(ShErr::CleanExit(code)) => code,
			Err(e) => {
				eprintln!("{}",e);
				1
			}
		}
	} else {
		if let Err(e) = state.init_interactive() {
			eprintln!("jobash: job control unavailable: {}",e);
		}
		repl(&mut state).unwrap_or_else(|e| {
			eprintln!("{}",e);
			1
		})
	};

	state.jobs.kill_all();
	info!("exiting with status {}",code);
	std::process::exit(code)
}
