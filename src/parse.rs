use std::collections::VecDeque;

use log::trace;

use crate::command::{Pipeline, Stage};
use crate::error::{ShErr, ShResult};

// Just enough syntax to drive the execution core: words, quotes, pipes,
// `<`/`>`/`>>` redirections, `&` and `;`. Nothing is expanded.

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tk {
	Word(String),
	Pipe,
	In,
	Out,
	Append,
	Amp,
	Semi,
}

fn tokenize(line: &str) -> ShResult<VecDeque<Tk>> {
	let mut chars = line.chars().peekable();
	let mut tokens = VecDeque::new();
	let mut word = String::new();
	let mut in_word = false;

	macro_rules! flush_word {
		() => {
			if in_word {
				tokens.push_back(Tk::Word(std::mem::take(&mut word)));
				in_word = false;
			}
		};
	}

	while let Some(ch) = chars.next() {
		match ch {
			' ' | '\t' | '\n' => flush_word!(),
			'|' => { flush_word!(); tokens.push_back(Tk::Pipe) }
			'<' => { flush_word!(); tokens.push_back(Tk::In) }
			'>' => {
				flush_word!();
				if chars.peek() == Some(&'>') {
					chars.next();
					tokens.push_back(Tk::Append)
				} else {
					tokens.push_back(Tk::Out)
				}
			}
			'&' => { flush_word!(); tokens.push_back(Tk::Amp) }
			';' => { flush_word!(); tokens.push_back(Tk::Semi) }
			'\'' | '"' => {
				in_word = true;
				loop {
					match chars.next() {
						Some(c) if c == ch => break,
						Some(c) => word.push(c),
						None => return Err(ShErr::parse(format!("unterminated {} quote",ch)))
					}
				}
			}
			_ => {
				in_word = true;
				word.push(ch)
			}
		}
	}
	if in_word {
		tokens.push_back(Tk::Word(word));
	}
	Ok(tokens)
}

/// Split a line into the pipelines it contains, in order
pub fn parse_line(line: &str) -> ShResult<Vec<Pipeline>> {
	let mut tokens = tokenize(line)?;
	trace!("tokens: {:?}",tokens);
	let mut pipelines = vec![];
	let mut stages: Vec<Stage> = vec![];
	let mut current = StageBuilder::default();

	while let Some(tk) = tokens.pop_front() {
		match tk {
			Tk::Word(w) => current.argv.push(w),
			Tk::In | Tk::Out | Tk::Append => {
				let Some(Tk::Word(target)) = tokens.pop_front() else {
					return Err(ShErr::parse("expected a file name after redirection"))
				};
				match tk {
					Tk::In => current.infile = Some(target),
					_ => current.outfile = Some((target, tk == Tk::Append))
				}
			}
			Tk::Pipe => {
				stages.push(current.finish()?);
				current = StageBuilder::default();
			}
			Tk::Amp | Tk::Semi => {
				if current.is_empty() && stages.is_empty() {
					if tk == Tk::Amp {
						return Err(ShErr::parse("`&' with no command"))
					}
					continue
				}
				stages.push(current.finish()?);
				current = StageBuilder::default();
				pipelines.push(Pipeline::new(std::mem::take(&mut stages), tk == Tk::Amp)?);
			}
		}
	}

	if !current.is_empty() || !stages.is_empty() {
		stages.push(current.finish()?);
		pipelines.push(Pipeline::new(stages, false)?);
	}
	Ok(pipelines)
}

#[derive(Default)]
struct StageBuilder {
	argv: Vec<String>,
	infile: Option<String>,
	outfile: Option<(String, bool)>,
}

impl StageBuilder {
	fn is_empty(&self) -> bool {
		self.argv.is_empty() && self.infile.is_none() && self.outfile.is_none()
	}
	fn finish(self) -> ShResult<Stage> {
		if self.argv.is_empty() {
			return Err(ShErr::parse("missing command in pipeline"))
		}
		let mut stage = Stage::new(self.argv);
		if let Some(path) = self.infile {
			stage = stage.with_infile(path);
		}
		if let Some((path, append)) = self.outfile {
			stage = stage.with_outfile(path, append);
		}
		Ok(stage)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pipeline_with_redirections() {
		let pipelines = parse_line("cat < in.txt | sort -r >> out.txt").unwrap();
		assert_eq!(pipelines.len(), 1);
		let p = &pipelines[0];
		assert_eq!(p.len(), 2);
		assert!(!p.background());
		assert_eq!(p.stages()[0].infile().unwrap().to_str(), Some("in.txt"));
		assert_eq!(p.stages()[1].argv(), ["sort", "-r"]);
		assert!(p.stages()[1].append());
	}

	#[test]
	fn separators_and_background() {
		let pipelines = parse_line("sleep 5 & echo hi; ls>out").unwrap();
		assert_eq!(pipelines.len(), 3);
		assert!(pipelines[0].background());
		assert!(!pipelines[1].background());
		assert_eq!(pipelines[2].stages()[0].outfile().unwrap().to_str(), Some("out"));
		assert!(!pipelines[2].stages()[0].append());
	}

	#[test]
	fn quotes_group_words() {
		let pipelines = parse_line(r#"echo "a | b" 'c;d'"#).unwrap();
		assert_eq!(pipelines[0].stages()[0].argv(), ["echo", "a | b", "c;d"]);
	}

	#[test]
	fn trailing_words_are_kept() {
		let pipelines = parse_line("echo a ''").unwrap();
		assert_eq!(pipelines[0].stages()[0].argv(), ["echo", "a", ""]);
		let pipelines = parse_line("wc -l").unwrap();
		assert_eq!(pipelines[0].stages()[0].argv(), ["wc", "-l"]);
	}

	#[test]
	fn empty_and_blank_lines() {
		assert!(parse_line("").unwrap().is_empty());
		assert!(parse_line("  ;; ").unwrap().is_empty());
	}

	#[test]
	fn malformed_lines() {
		assert!(matches!(parse_line("ls |"), Err(ShErr::Parse(_))));
		assert!(matches!(parse_line("| ls"), Err(ShErr::Parse(_))));
		assert!(matches!(parse_line("cat <"), Err(ShErr::Parse(_))));
		assert!(matches!(parse_line("echo 'oops"), Err(ShErr::Parse(_))));
		assert!(matches!(parse_line("&"), Err(ShErr::Parse(_))));
	}
}
