use crate::error::ShResult;
use crate::shellenv::ShellState;

pub mod cd;
pub mod control;
pub mod echo;
pub mod job;
pub mod opts;
pub mod pwd;

/// A builtin gets the full argv (name included) and returns its exit status
pub type BuiltinFn = fn(&[String], &mut ShellState) -> ShResult<i32>;

pub const BUILTINS: [(&str, BuiltinFn); 11] = [
	("cd", cd::execute),
	("pwd", pwd::execute),
	("echo", echo::execute),
	("jobs", job::jobs),
	("fg", job::fg),
	("bg", job::bg),
	("sig", job::sig),
	("exit", control::exit),
	("quit", control::exit),
	("setopt", opts::setopt),
	("getopt", opts::getopt),
];

pub fn lookup(name: &str) -> Option<BuiltinFn> {
	BUILTINS.iter().find(|(builtin, _)| *builtin == name).map(|(_, func)| *func)
}

pub fn is_builtin(name: &str) -> bool {
	lookup(name).is_some()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lookup_by_name() {
		assert!(is_builtin("jobs"));
		assert!(is_builtin("quit"));
		assert!(!is_builtin("ls"));
		assert!(!is_builtin(""));
	}
}
