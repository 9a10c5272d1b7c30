//! Command-line surface of the `ranger-operator` binary.
//!
//! ```rust
//! use clap::Parser;
//! use ranger_operator::cli::{Command, Opts};
//!
//! let opts = Opts::parse_from([
//!     "ranger-operator",
//!     "validate",
//!     "--config",
//!     "user-group-configuration.yaml",
//! ]);
//! assert!(matches!(opts.command, Command::Validate(_)));
//! ```
use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::{logging::LogFormat, retry::RetryPolicy, settings::RangerSettings};

#[derive(Debug, PartialEq, Eq, Parser)]
#[command(
    name = "ranger-operator",
    author,
    version,
    about = "Keeps the users, groups and memberships of Apache Ranger in line with a declared configuration"
)]
pub struct Opts {
    #[arg(long, env = "RANGER_OPERATOR_LOG_FORMAT", value_enum, default_value_t, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Validate a user-group configuration file without contacting Ranger.
    Validate(ValidateArguments),

    /// Handle one synchronization trigger against Ranger.
    Sync(SyncArguments),
}

#[derive(Debug, PartialEq, Eq, Args)]
pub struct ValidateArguments {
    /// The user-group configuration to validate.
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: PathBuf,

    /// Policy relations to check the scope keys against.
    #[arg(long, value_name = "FILE")]
    pub relations: Option<PathBuf>,
}

#[derive(Debug, PartialEq, Eq, Args)]
pub struct SyncArguments {
    /// The user-group configuration to synchronize.
    #[arg(long, short = 'c', value_name = "FILE", env = "USER_GROUP_CONFIGURATION_FILE")]
    pub config: PathBuf,

    /// Where the id mapping is persisted between runs. Created if missing.
    #[arg(long, value_name = "FILE", env)]
    pub state_file: PathBuf,

    /// Policy relations to propagate the configuration to. Updated in place.
    #[arg(long, value_name = "FILE", env)]
    pub relations_file: Option<PathBuf>,

    /// Whether this unit is the leader. Only the leader writes to Ranger.
    #[arg(long)]
    pub leader: bool,

    /// Whether the Ranger workload is up. Without it the trigger is deferred.
    #[arg(long)]
    pub workload_active: bool,

    // IMPORTANT: All (flattened) sub structs should be placed at the end to ensure the help
    // headings are correct.
    #[command(flatten)]
    pub retry: RetryOptions,

    #[command(flatten)]
    pub ranger: RangerSettings,
}

/// How persistently calls against Ranger are retried.
#[derive(Debug, PartialEq, Eq, Args)]
#[command(next_help_heading = "Retry Options")]
pub struct RetryOptions {
    /// Attempts per call, including the first one.
    #[arg(long, env, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..))]
    pub retry_max_attempts: u32,

    /// Seconds to wait after the first failed attempt.
    #[arg(long, env, default_value_t = 2)]
    pub retry_initial_delay_seconds: u64,

    /// Factor the wait grows by after every further failed attempt.
    #[arg(long, env, default_value_t = 2)]
    pub retry_backoff_factor: u32,
}

impl RetryOptions {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(self.retry_max_attempts)
            .with_initial_delay(Duration::from_secs(self.retry_initial_delay_seconds))
            .with_backoff_factor(self.retry_backoff_factor)
    }
}
