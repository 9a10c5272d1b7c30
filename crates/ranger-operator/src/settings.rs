//! Operator settings: how to reach Ranger and which function this deployment fulfils.
use std::{fmt::Display, sync::LazyLock};

use regex::Regex;
use snafu::{ResultExt, Snafu, ensure};
use url::Url;

use crate::constants::{ADMIN_USER, APP_NAME, DEFAULT_RANGER_URL};

/// Accepted range for the LDAP usersync interval, in milliseconds (one hour to one day).
pub const SYNC_INTERVAL_RANGE_MS: std::ops::RangeInclusive<u64> = 3_600_000..=86_400_000;

static LDAP_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ldaps?://.*:\d+$").expect("failed to compile LDAP URL regex")
});

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum Error {
    #[snafu(display("sync interval must be a number of milliseconds"))]
    ParseSyncInterval { source: std::num::ParseIntError },

    #[snafu(display(
        "sync interval {value}ms is out of range, must be between {min}ms and {max}ms",
        min = SYNC_INTERVAL_RANGE_MS.start(),
        max = SYNC_INTERVAL_RANGE_MS.end()
    ))]
    SyncIntervalOutOfRange { value: u64 },

    #[snafu(display("LDAP URL {value:?} is incorrectly formatted, expected ldap[s]://<host>:<port>"))]
    InvalidLdapUrl { value: String },
}

/// The function a deployment fulfils. Only `admin` deployments manage users and groups.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum CharmFunction {
    #[default]
    Admin,
    Usersync,
}

impl CharmFunction {
    pub fn manages_directory(self) -> bool {
        self == Self::Admin
    }
}

/// Settings shared by all commands that talk to Ranger.
#[derive(Clone, Debug, PartialEq, Eq, clap::Args)]
#[command(next_help_heading = "Ranger Options")]
pub struct RangerSettings {
    /// Base URL of the Ranger admin API.
    #[arg(long, env, default_value = DEFAULT_RANGER_URL)]
    pub ranger_url: Url,

    #[arg(long, env, default_value = ADMIN_USER)]
    pub ranger_admin_user: String,

    /// Password of the Ranger admin user.
    #[arg(long, env, hide_env_values = true)]
    pub ranger_admin_password: String,

    /// Hostname the policy manager is reachable at from outside. Anything other than the
    /// application name implies TLS.
    #[arg(long, env, default_value = APP_NAME)]
    pub external_hostname: String,

    #[arg(long, env, value_enum, default_value_t)]
    pub charm_function: CharmFunction,

    // The usersync settings belong to `usersync` deployments, which this operator skips. They are
    // only validated and logged at startup.
    //
    // The fully qualified `Option` keeps clap from treating these as optional arguments, so a
    // blank value reaches the parser and becomes `None`.
    /// Interval between LDAP usersync runs, in milliseconds.
    #[arg(long, env, default_value = "", hide_default_value = true, value_parser = parse_sync_interval)]
    pub sync_interval: std::option::Option<SyncInterval>,

    /// LDAP server to synchronize users from, e.g. `ldap://ldap.example.org:389`.
    #[arg(long, env, default_value = "", hide_default_value = true, value_parser = parse_ldap_url)]
    pub sync_ldap_url: std::option::Option<LdapUrl>,
}

/// A usersync interval within [`SYNC_INTERVAL_RANGE_MS`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncInterval(u64);

impl SyncInterval {
    pub fn new(millis: u64) -> Result<Self, Error> {
        ensure!(
            SYNC_INTERVAL_RANGE_MS.contains(&millis),
            SyncIntervalOutOfRangeSnafu { value: millis }
        );
        Ok(Self(millis))
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

/// An LDAP URL of the form `ldap[s]://<host>:<port>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LdapUrl(String);

impl LdapUrl {
    pub fn new(value: &str) -> Result<Self, Error> {
        ensure!(
            LDAP_URL_REGEX.is_match(value),
            InvalidLdapUrlSnafu { value }
        );
        Ok(Self(value.to_owned()))
    }
}

impl Display for LdapUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn parse_sync_interval(value: &str) -> Result<Option<SyncInterval>, Error> {
    non_blank(value)
        .map(|value| {
            let millis = value.parse().context(ParseSyncIntervalSnafu)?;
            SyncInterval::new(millis)
        })
        .transpose()
}

fn parse_ldap_url(value: &str) -> Result<Option<LdapUrl>, Error> {
    non_blank(value).map(LdapUrl::new).transpose()
}

fn non_blank(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|value| !value.is_empty())
}
