//! Process surface of churn: file configuration and the built-in `tally`
//! target. The `churn` binary wires these to the driver.

pub mod config;
pub mod tally;

pub use config::{Config, TallyConfig};
