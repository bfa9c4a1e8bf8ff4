//! Isolation forks: detached copies of the application under test.

pub mod config;
pub mod fork;

pub use config::SandboxConfig;
pub use fork::{Fork, ForkError, ForkManager};
