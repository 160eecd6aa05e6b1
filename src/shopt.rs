use std::collections::VecDeque;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ShErr, ShResult};
use crate::jobs::DEFAULT_DISPLAY_WIDTH;

/// Environment variable naming an options file, used when `--opts` is not given
pub const OPTS_ENV_VAR: &str = "JOBASH_OPTS";

#[derive(Serialize, Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct ShOpts {
	pub core: ShOptsCore,
	pub prompt: ShOptsPrompt,
}

impl ShOpts {
	pub fn new() -> Self {
		let core = ShOptsCore {
			job_display_width: DEFAULT_DISPLAY_WIDTH,
			report_status: true,
			notify_done: true,
		};
		let prompt = ShOptsPrompt {
			text: "jobash> ".into(),
			edit_mode: "emacs".into(),
			max_hist: 1000,
		};
		Self { core, prompt }
	}

	/// Read options from a json file. Missing keys keep their defaults.
	pub fn load(path: &Path) -> ShResult<Self> {
		let raw = std::fs::read_to_string(path)?;
		let opts = serde_json::from_str::<ShOpts>(&raw)
			.map_err(|e| ShErr::invalid_opt(format!("{}: {}",path.display(),e)))?;
		info!("loaded options from {}",path.display());
		Ok(opts)
	}

	pub fn get(&self, query: &str) -> ShResult<Value> {
		let mut query = split_query(query)?;
		let key = pop_key(&mut query)?;
		match key.as_str() {
			"core" => self.core.get(query),
			"prompt" => self.prompt.get(query),
			_ => Err(ShErr::invalid_opt(format!("Invalid shopt key: {}",key)))
		}
	}

	pub fn set(&mut self, query: &str, value: Value) -> ShResult<()> {
		let mut query = split_query(query)?;
		let key = pop_key(&mut query)?;
		debug!("setting shopt {}.{:?} = {}",key,query,value);
		match key.as_str() {
			"core" => self.core.set(query, value),
			"prompt" => self.prompt.set(query, value),
			_ => Err(ShErr::invalid_opt(format!("Invalid shopt key: {}",key)))
		}
	}

	/// `setopt` form: the value is read as json, falling back to a bare string
	pub fn set_str(&mut self, query: &str, raw: &str) -> ShResult<()> {
		let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
		self.set(query, value)
	}
}

impl Default for ShOpts {
	fn default() -> Self {
		Self::new()
	}
}

fn split_query(query: &str) -> ShResult<VecDeque<String>> {
	if query.is_empty() {
		return Err(ShErr::invalid_opt("empty shopt key"))
	}
	Ok(query.split('.').map(|seg| seg.to_string()).collect())
}

fn pop_key(query: &mut VecDeque<String>) -> ShResult<String> {
	query.pop_front().ok_or_else(|| ShErr::invalid_opt("incomplete shopt key"))
}

fn invalid_value(key: &str, value: &Value) -> ShErr {
	ShErr::invalid_opt(format!("Invalid value for {}: {}",key,value))
}

#[derive(Serialize, Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct ShOptsCore {
	/// Commands longer than this are cut in `jobs` output
	pub job_display_width: usize,
	/// Report non-zero exits and fatal signals of foreground members
	pub report_status: bool,
	/// Print `[id] Done cmd` when a background job is pruned
	pub notify_done: bool,
}

impl Default for ShOptsCore {
	fn default() -> Self {
		ShOpts::new().core
	}
}

impl ShOptsCore {
	pub fn get(&self, mut query: VecDeque<String>) -> ShResult<Value> {
		let key = pop_key(&mut query)?;
		match key.as_str() {
			"job_display_width" => Ok(Value::Number(self.job_display_width.into())),
			"report_status" => Ok(Value::Bool(self.report_status)),
			"notify_done" => Ok(Value::Bool(self.notify_done)),
			_ => Err(ShErr::invalid_opt(format!("Invalid core opts key: {}",key)))
		}
	}
	pub fn set(&mut self, mut query: VecDeque<String>, value: Value) -> ShResult<()> {
		let key = pop_key(&mut query)?;
		match key.as_str() {
			"job_display_width" => {
				let width = value.as_u64().filter(|w| *w > 3).ok_or_else(|| invalid_value("core.job_display_width", &value))?;
				self.job_display_width = width as usize;
			}
			"report_status" => {
				self.report_status = value.as_bool().ok_or_else(|| invalid_value("core.report_status", &value))?;
			}
			"notify_done" => {
				self.notify_done = value.as_bool().ok_or_else(|| invalid_value("core.notify_done", &value))?;
			}
			_ => return Err(ShErr::invalid_opt(format!("Invalid core opts key: {}",key)))
		}
		Ok(())
	}
}

#[derive(Serialize, Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct ShOptsPrompt {
	pub text: String,
	pub edit_mode: String,
	pub max_hist: usize,
}

impl Default for ShOptsPrompt {
	fn default() -> Self {
		ShOpts::new().prompt
	}
}

impl ShOptsPrompt {
	pub fn get(&self, mut query: VecDeque<String>) -> ShResult<Value> {
		let key = pop_key(&mut query)?;
		match key.as_str() {
			"text" => Ok(Value::String(self.text.clone())),
			"edit_mode" => Ok(Value::String(self.edit_mode.clone())),
			"max_hist" => Ok(Value::Number(self.max_hist.into())),
			_ => Err(ShErr::invalid_opt(format!("Invalid key for prompt opts: {}",key)))
		}
	}

	pub fn set(&mut self, mut query: VecDeque<String>, value: Value) -> ShResult<()> {
		let key = pop_key(&mut query)?;
		match key.as_str() {
			"text" => {
				self.text = value.as_str().ok_or_else(|| invalid_value("prompt.text", &value))?.to_string();
			}
			"edit_mode" => {
				let mode = value.as_str().filter(|m| matches!(*m, "vi" | "emacs")).ok_or_else(|| invalid_value("prompt.edit_mode", &value))?;
				self.edit_mode = mode.to_string();
			}
			"max_hist" => {
				self.max_hist = value.as_u64().ok_or_else(|| invalid_value("prompt.max_hist", &value))? as usize;
			}
			_ => return Err(ShErr::invalid_opt(format!("Invalid key for prompt opts: {}",key)))
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn dotted_get_and_set() {
		let mut opts = ShOpts::new();
		assert_eq!(opts.get("core.job_display_width").unwrap(), Value::from(80));
		opts.set("core.notify_done", Value::Bool(false)).unwrap();
		assert_eq!(opts.get("core.notify_done").unwrap(), Value::Bool(false));
	}

	#[test]
	fn set_str_parses_json_then_falls_back() {
		let mut opts = ShOpts::new();
		opts.set_str("core.job_display_width", "40").unwrap();
		assert_eq!(opts.core.job_display_width, 40);
		opts.set_str("prompt.text", "$ ").unwrap();
		assert_eq!(opts.prompt.text, "$ ");
		opts.set_str("prompt.edit_mode", "vi").unwrap();
		assert_eq!(opts.prompt.edit_mode, "vi");
	}

	#[test]
	fn bad_keys_and_values_are_rejected() {
		let mut opts = ShOpts::new();
		assert!(matches!(opts.get("nope.key"), Err(ShErr::InvalidOpt(_))));
		assert!(matches!(opts.get("core"), Err(ShErr::InvalidOpt(_))));
		assert!(matches!(opts.set_str("core.report_status", "maybe"), Err(ShErr::InvalidOpt(_))));
		assert!(matches!(opts.set_str("prompt.edit_mode", "ed"), Err(ShErr::InvalidOpt(_))));
		assert_eq!(opts, ShOpts::new());
	}

	#[test]
	fn partial_json_keeps_defaults() {
		let opts: ShOpts = serde_json::from_str(r#"{ "core": { "notify_done": false } }"#).unwrap();
		assert!(!opts.core.notify_done);
		assert_eq!(opts.core.job_display_width, DEFAULT_DISPLAY_WIDTH);
		assert_eq!(opts.prompt, ShOpts::new().prompt);
	}
}
