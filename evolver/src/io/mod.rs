//! Side-effecting components: processes, files, and external commands.

pub mod config;
pub mod evaluator;
pub mod oracle;
pub mod problem;
pub mod process;
pub mod prompt;
pub mod result;
pub mod sandbox;
pub mod workspace;
