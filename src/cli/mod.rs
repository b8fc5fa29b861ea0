mod commands;

pub use commands::{Command, Opt};
