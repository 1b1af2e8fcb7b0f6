//! ambiently terminal host
//!
//! Loads configuration, decodes the loop files, and drives the mixer from
//! line commands on stdin.

pub mod command;
pub mod config;
pub mod error;
pub mod session;

pub use command::{Command, Target};
pub use config::AppConfig;
pub use error::{CliError, Result};
pub use session::{Reply, Session};
