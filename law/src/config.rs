use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use law_storage::AwsCredentials;

use crate::error::LawError;

/// CLI surface. Flags take precedence over the environment variables named
/// in each `env(...)` attribute, which in turn take precedence over
/// `crate::defaults`.
#[derive(Debug, Parser)]
#[command(name = "law", about = "WAL archiving and base-backup tool")]
pub struct Cli {
    /// Storage source name, e.g. `file:///var/backups` or `s3://host/bucket/prefix`.
    #[arg(long, global = true, env = "STORAGE_URL")]
    pub storage: Option<String>,

    /// Write a pprof-style CPU profile to this path on exit. Accepted for
    /// interface compatibility; profiling itself is out of scope here.
    #[arg(long, global = true)]
    pub cpuprofile: Option<Utf8PathBuf>,

    /// Write a heap profile to this path on exit. Same caveat as `cpuprofile`.
    #[arg(long, global = true)]
    pub memprofile: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ship one WAL segment to the storage backend.
    WalPush {
        #[arg(long)]
        segment: Utf8PathBuf,
    },
    /// Fetch one WAL segment from the storage backend.
    WalFetch {
        #[arg(long)]
        segment: String,
        #[arg(long)]
        destination: Utf8PathBuf,
    },
    /// Take a base backup of a cluster directory.
    BackupPush {
        #[arg(long)]
        cluster: Utf8PathBuf,
        /// Bytes per second; 0 disables throttling.
        #[arg(long, default_value_t = 0)]
        rate_limit: u64,
    },
    /// Restore a named base backup into a cluster directory.
    BackupFetch {
        #[arg(long)]
        cluster: Utf8PathBuf,
        #[arg(long)]
        name: String,
    },
}

/// Fully resolved configuration, immutable for the life of the process.
#[derive(Debug, Clone)]
pub struct Config {
    pub storage_url: String,
    pub database_url: Option<String>,
    pub aws: AwsCredentials,
}

impl Config {
    /// Resolves configuration from CLI flags layered over environment
    /// variables layered over `crate::defaults`. Called exactly once, in
    /// `main`.
    pub fn resolve(cli: &Cli) -> Result<Self, LawError> {
        let storage_url = cli
            .storage
            .clone()
            .ok_or_else(|| LawError::ConfigMissing("--storage (or STORAGE_URL)".to_string()))?;

        let database_url = std::env::var("DATABASE_URL").ok();

        let aws = AwsCredentials {
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default(),
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
            security_token: std::env::var("AWS_SECURITY_TOKEN").ok(),
            region: std::env::var("AWS_REGION")
                .unwrap_or_else(|_| crate::defaults::DEFAULT_REGION.to_string()),
        };

        Ok(Config {
            storage_url,
            database_url,
            aws,
        })
    }
}
