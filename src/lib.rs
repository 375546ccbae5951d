pub mod browser;
pub mod cli;
pub mod config;
pub mod update;
pub mod upload;

pub use cli::{run, Cli};
