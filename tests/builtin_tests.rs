// The working directory and stdio are process-wide, so these share one test.

use std::env;

use jobash::command::{Pipeline, Stage};
use jobash::execute::exec_pipeline;
use jobash::shellenv::ShellState;
use jobash::shopt::ShOpts;

#[test]
fn builtins_run_in_the_shell_process() {
	let mut state = ShellState::new(ShOpts::default());
	let start = env::current_dir().unwrap();
	let tmp = env::temp_dir().canonicalize().unwrap();

	// cd changes the shell's own directory
	let cd = Pipeline::single(Stage::new(["cd".to_string(), tmp.display().to_string()]));
	assert_eq!(exec_pipeline(&cd, &mut state).unwrap(), 0);
	assert_eq!(env::current_dir().unwrap(), tmp);

	let missing = Pipeline::single(Stage::new(["cd", "/jobash/does/not/exist"]));
	assert_eq!(exec_pipeline(&missing, &mut state).unwrap(), 1);
	assert_eq!(env::current_dir().unwrap(), tmp);

	// Redirected builtin output lands in the file and stdout is restored afterwards
	let out = tmp.join(format!("jobash-builtin-{}", std::process::id()));
	let echo = Pipeline::single(Stage::new(["echo", "-n", "hello", "there"]).with_outfile(&out, false));
	assert_eq!(exec_pipeline(&echo, &mut state).unwrap(), 0);
	let pwd = Pipeline::single(Stage::new(["pwd"]).with_outfile(&out, true));
	assert_eq!(exec_pipeline(&pwd, &mut state).unwrap(), 0);
	assert_eq!(std::fs::read_to_string(&out).unwrap(), format!("hello there{}\n", tmp.display()));

	// A failed redirection skips the builtin
	let bad = Pipeline::single(Stage::new(["pwd"]).with_outfile("/jobash/does/not/exist/out", false));
	assert_eq!(exec_pipeline(&bad, &mut state).unwrap(), 1);

	// Options round-trip through setopt
	let setopt = Pipeline::single(Stage::new(["setopt", "core.job_display_width=20"]));
	assert_eq!(exec_pipeline(&setopt, &mut state).unwrap(), 0);
	assert_eq!(state.opts.core.job_display_width, 20);

	// exit unwinds instead of returning a status
	let exit = Pipeline::single(Stage::new(["exit", "3"]));
	assert!(matches!(exec_pipeline(&exit, &mut state), Err(jobash::error::ShErr::CleanExit(3))));

	let _ = std::fs::remove_file(out);
	env::set_current_dir(start).unwrap();
}
