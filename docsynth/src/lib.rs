pub mod cli;
pub mod generator;
pub mod load_config;
pub mod remote;

pub use cli::{run, Cli, Commands};
