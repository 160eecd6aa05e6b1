pub mod builtin;
pub mod command;
pub mod error;
pub mod execute;
pub mod jobs;
pub mod parse;
pub mod prompt;
pub mod shellenv;
pub mod shopt;
pub mod signal;
pub mod utils;
