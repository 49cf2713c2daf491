//! WAL archiving and base-backup tool: archives single WAL segments and
//! takes/restores whole-cluster base backups against a pluggable storage
//! backend (local filesystem or S3).

pub mod archive;
pub mod config;
pub mod database;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod operator;
pub mod pipeline;

pub use config::{Cli, Command, Config};
pub use error::LawError;
pub use operator::Operator;
