use std::ffi::CString;
use std::fmt::{self, Display};
use std::path::PathBuf;

use crate::error::{ShErr, ShResult};

/// One segment of a pipeline: an argument vector plus its own redirections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
	argv: Vec<String>,
	infile: Option<PathBuf>,
	outfile: Option<PathBuf>,
	append: bool,
}

impl Stage {
	pub fn new<S: Into<String>>(argv: impl IntoIterator<Item = S>) -> Self {
		Self {
			argv: argv.into_iter().map(Into::into).collect(),
			infile: None,
			outfile: None,
			append: false
		}
	}
	pub fn with_infile(mut self, path: impl Into<PathBuf>) -> Self {
		self.infile = Some(path.into());
		self
	}
	pub fn with_outfile(mut self, path: impl Into<PathBuf>, append: bool) -> Self {
		self.outfile = Some(path.into());
		self.append = append;
		self
	}
	pub fn argv(&self) -> &[String] {
		&self.argv
	}
	pub fn name(&self) -> &str {
		self.argv.first().map(String::as_str).unwrap_or_default()
	}
	pub fn infile(&self) -> Option<&PathBuf> {
		self.infile.as_ref()
	}
	pub fn outfile(&self) -> Option<&PathBuf> {
		self.outfile.as_ref()
	}
	pub fn append(&self) -> bool {
		self.append
	}
	pub fn has_redirs(&self) -> bool {
		self.infile.is_some() || self.outfile.is_some()
	}

	/// Converts argv for execvp. Done before forking so the child never allocates for it.
	pub fn c_argv(&self) -> ShResult<Vec<CString>> {
		if self.argv.is_empty() {
			return Err(ShErr::setup("empty command"))
		}
		self.argv
			.iter()
			.map(|arg| CString::new(arg.as_str()).map_err(|_| ShErr::setup(format!("argument contains a nul byte: {:?}",arg))))
			.collect()
	}
}

impl Display for Stage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f,"{}",self.argv.join(" "))?;
		if let Some(path) = &self.infile {
			write!(f," < {}",path.display())?;
		}
		if let Some(path) = &self.outfile {
			let op = if self.append { ">>" } else { ">" };
			write!(f," {} {}",op,path.display())?;
		}
		Ok(())
	}
}

/// An ordered chain of stages launched as a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
	stages: Vec<Stage>,
	background: bool,
}

impl Pipeline {
	pub fn new(stages: Vec<Stage>, background: bool) -> ShResult<Self> {
		if stages.is_empty() {
			return Err(ShErr::parse("a pipeline needs at least one command"))
		}
		Ok(Self { stages, background })
	}
	pub fn single(stage: Stage) -> Self {
		Self { stages: vec![stage], background: false }
	}
	pub fn stages(&self) -> &[Stage] {
		&self.stages
	}
	pub fn len(&self) -> usize {
		self.stages.len()
	}
	pub fn is_empty(&self) -> bool {
		self.stages.is_empty()
	}
	pub fn background(&self) -> bool {
		self.background
	}
	pub fn set_background(&mut self, background: bool) {
		self.background = background;
	}
	/// The string shown in job listings
	pub fn display_cmd(&self) -> String {
		self.stages.iter().map(|stage| stage.to_string()).collect::<Vec<_>>().join(" | ")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn display_joins_stages_and_redirs() {
		let pipeline = Pipeline::new(vec![
			Stage::new(["cat"]).with_infile("in.txt"),
			Stage::new(["sort", "-r"]),
			Stage::new(["uniq"]).with_outfile("out.txt", true),
		], false).unwrap();
		assert_eq!(pipeline.display_cmd(), "cat < in.txt | sort -r | uniq >> out.txt");
	}

	#[test]
	fn empty_pipeline_is_rejected() {
		assert!(Pipeline::new(vec![], true).is_err());
	}

	#[test]
	fn nul_in_argv_is_a_setup_error() {
		let stage = Stage::new(["echo", "a\0b"]);
		assert!(matches!(stage.c_argv(), Err(ShErr::Setup(_))));
	}
}
