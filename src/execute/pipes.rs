use std::io;
use std::os::fd::{AsRawFd, RawFd};

use libc::{STDIN_FILENO, STDOUT_FILENO};
use log::{debug, trace};

use crate::error::{ShErr, ShResult};
use crate::utils::RustFd;

/// The pipe connecting stage `i` to stage `i + 1`
#[derive(Debug)]
pub struct Junction {
	r_pipe: RustFd,
	w_pipe: RustFd,
}

impl Junction {
	pub fn read_end(&self) -> &RustFd {
		&self.r_pipe
	}
	pub fn write_end(&self) -> &RustFd {
		&self.w_pipe
	}
}

/// Every pipe a pipeline needs, created up front.
///
/// Each process holding a copy of the fabric closes it exactly once: children right after
/// wiring their own stage, the parent after the last fork. Dropping the fabric closes whatever
/// is still open.
#[derive(Debug, Default)]
pub struct PipeFabric {
	junctions: Vec<Junction>,
}

impl PipeFabric {
	/// Allocate the `stages - 1` pipes for a pipeline.
	/// If any pipe fails, the ones already created are closed and nothing is returned.
	pub fn build(stages: usize) -> ShResult<Self> {
		let count = stages.saturating_sub(1);
		let mut junctions = Vec::with_capacity(count);
		for i in 0..count {
			let (r_pipe,w_pipe) = RustFd::pipe().map_err(|e| ShErr::setup(format!("pipe {} of {}: {}",i + 1,count,e)))?;
			junctions.push(Junction { r_pipe, w_pipe });
		}
		debug!("built pipe fabric with {} junction(s) for {} stage(s)",count,stages);
		Ok(Self { junctions })
	}

	pub fn len(&self) -> usize {
		self.junctions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.junctions.is_empty()
	}

	pub fn junctions(&self) -> &[Junction] {
		&self.junctions
	}

	/// The read end stage `stage` takes its input from, if it is not the first stage
	pub fn input_for(&self, stage: usize) -> Option<&RustFd> {
		stage.checked_sub(1).and_then(|i| self.junctions.get(i)).map(Junction::read_end)
	}

	/// The write end stage `stage` sends its output to, if it is not the last stage
	pub fn output_for(&self, stage: usize) -> Option<&RustFd> {
		self.junctions.get(stage).map(Junction::write_end)
	}

	/// Runs in the child: put this stage's pipe ends on stdin/stdout, then close the whole fabric.
	pub fn wire_stage(mut self, stage: usize) -> io::Result<()> {
		if let Some(r_pipe) = self.input_for(stage) {
			r_pipe.dup2(&STDIN_FILENO)?;
		}
		if let Some(w_pipe) = self.output_for(stage) {
			w_pipe.dup2(&STDOUT_FILENO)?;
		}
		self.close_all()
	}

	pub fn close_all(&mut self) -> io::Result<()> {
		for junction in self.junctions.iter_mut() {
			trace!("closing junction fds {} {}",junction.r_pipe,junction.w_pipe);
			junction.r_pipe.close()?;
			junction.w_pipe.close()?;
		}
		self.junctions.clear();
		Ok(())
	}

	pub fn raw_fds(&self) -> Vec<RawFd> {
		self.junctions
			.iter()
			.flat_map(|j| [j.r_pipe.as_raw_fd(), j.w_pipe.as_raw_fd()])
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn one_stage_needs_no_pipes() {
		let fabric = PipeFabric::build(1).unwrap();
		assert!(fabric.is_empty());
		assert!(fabric.input_for(0).is_none());
		assert!(fabric.output_for(0).is_none());
	}

	#[test]
	fn n_stages_get_n_minus_one_junctions() {
		let fabric = PipeFabric::build(4).unwrap();
		assert_eq!(fabric.len(), 3);
		assert_eq!(fabric.raw_fds().len(), 6);
	}

	#[test]
	fn stages_are_wired_to_adjacent_junctions() {
		let fabric = PipeFabric::build(3).unwrap();
		let fds = fabric.raw_fds();
		// first stage only writes, last only reads
		assert!(fabric.input_for(0).is_none());
		assert_eq!(fabric.output_for(0).unwrap().as_raw_fd(), fds[1]);
		assert_eq!(fabric.input_for(1).unwrap().as_raw_fd(), fds[0]);
		assert_eq!(fabric.output_for(1).unwrap().as_raw_fd(), fds[3]);
		assert_eq!(fabric.input_for(2).unwrap().as_raw_fd(), fds[2]);
		assert!(fabric.output_for(2).is_none());
	}

	#[test]
	fn close_all_closes_every_descriptor() {
		let mut fabric = PipeFabric::build(3).unwrap();
		fabric.close_all().unwrap();
		assert!(fabric.is_empty());
		assert!(fabric.raw_fds().is_empty());
		// closing twice is harmless
		fabric.close_all().unwrap();
	}
}
