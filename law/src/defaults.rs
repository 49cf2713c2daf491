//! Named constants for every value the core or the ambient stack needs a
//! default for. `Config::resolve` falls back to these only after CLI flags
//! and environment variables have both been checked.

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_RATE_LIMIT_INTERVAL_MS: u64 = 1000;
pub const MAX_PARTITION_SIZE: u64 = 1_610_612_736;
pub const MAX_PARTITION_MEMBERS: usize = 6_144;
pub const DEFAULT_LOG_LEVEL: &str = "info";
