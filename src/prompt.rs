use log::debug;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, EditMode, Editor};

use crate::error::{ShErr, ShResult};
use crate::shopt::ShOpts;

pub type LineEditor = Editor<(), DefaultHistory>;

/// What the REPL got back from the line editor
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
	Line(String),
	/// ^C at the prompt, nothing to run
	Interrupted,
	Eof,
}

pub fn build_editor_config(opts: &ShOpts) -> ShResult<Config> {
	let edit_mode = match opts.prompt.edit_mode.as_str() {
		"emacs" => EditMode::Emacs,
		"vi" => EditMode::Vi,
		other => return Err(ShErr::invalid_opt(format!("Invalid prompt.edit_mode value: {}",other)))
	};
	let config = Config::builder()
		.max_history_size(opts.prompt.max_hist)
		.map_err(|e| ShErr::invalid_opt(format!("Invalid max history size: {}",e)))?
		.auto_add_history(true)
		.edit_mode(edit_mode)
		.build();
	Ok(config)
}

/// History is kept in memory only
pub fn init_prompt(opts: &ShOpts) -> ShResult<LineEditor> {
	let config = build_editor_config(opts)?;
	let rl = Editor::with_config(config).map_err(readline_err)?;
	debug!("line editor ready ({} mode)",opts.prompt.edit_mode);
	Ok(rl)
}

pub fn read_line(rl: &mut LineEditor, prompt: &str) -> ShResult<Input> {
	match rl.readline(prompt) {
		Ok(line) => Ok(Input::Line(line)),
		Err(ReadlineError::Interrupted) => Ok(Input::Interrupted),
		Err(ReadlineError::Eof) => Ok(Input::Eof),
		Err(e) => Err(readline_err(e))
	}
}

fn readline_err(e: ReadlineError) -> ShErr {
	match e {
		ReadlineError::Io(e) => ShErr::IoError(e),
		other => ShErr::IoError(std::io::Error::new(std::io::ErrorKind::Other, other.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn edit_mode_is_validated() {
		let mut opts = ShOpts::default();
		assert!(build_editor_config(&opts).is_ok());
		opts.prompt.edit_mode = "ed".into();
		assert!(matches!(build_editor_config(&opts), Err(ShErr::InvalidOpt(_))));
	}
}
