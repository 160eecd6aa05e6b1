use std::io::Write;

use libc::{STDERR_FILENO, STDOUT_FILENO};

use crate::error::ShResult;
use crate::shellenv::ShellState;
use crate::utils::RustFd;

bitflags::bitflags! {
	#[derive(Debug,Clone,Copy)]
	pub struct EchoFlags: u8 {
		const NO_NEWLINE = 0b01;
		const STDERR     = 0b10;
	}
}

pub fn execute(argv: &[String], _state: &mut ShellState) -> ShResult<i32> {
	let mut flags = EchoFlags::empty();
	let mut args = argv.iter().skip(1).peekable();

	// Leading option words, anything unrecognised starts the text
	while let Some(arg) = args.peek() {
		let Some(opts) = arg.strip_prefix('-').filter(|o| !o.is_empty()) else { break };
		let mut new_flags = EchoFlags::empty();
		for opt in opts.chars() {
			match opt {
				'n' => new_flags |= EchoFlags::NO_NEWLINE,
				'r' => new_flags |= EchoFlags::STDERR,
				_ => {
					new_flags = EchoFlags::empty();
					break
				}
			}
		}
		if new_flags.is_empty() {
			break
		}
		flags |= new_flags;
		args.next();
	}

	let mut output = args.map(String::as_str).collect::<Vec<_>>().join(" ");
	if !flags.contains(EchoFlags::NO_NEWLINE) {
		output.push('\n');
	}
	let fd = if flags.contains(EchoFlags::STDERR) { STDERR_FILENO } else { STDOUT_FILENO };
	let mut out = RustFd::new(fd)?;
	out.write_all(output.as_bytes())?;
	Ok(0)
}
