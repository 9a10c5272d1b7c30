//! The `user-group-configuration`: the desired Ranger directory state, per scope.
//!
//! The configuration is a YAML mapping from scope key (the service name of a consuming relation)
//! to the users, groups and memberships that scope needs:
//!
//! ```
//! use ranger_operator::config::UserGroupConfiguration;
//!
//! let config = UserGroupConfiguration::parse(
//!     "
//! trino-service:
//!   users:
//!     - name: user1
//!       firstname: One
//!       lastname: User
//!       email: user1@example.com
//!   groups:
//!     - name: commercial-systems
//!       description: commercial systems team
//!   memberships:
//!     - groupname: commercial-systems
//!       users: [user1]
//! ",
//! )
//! .unwrap();
//!
//! assert_eq!(config.scopes().count(), 1);
//! ```
//!
//! Everything is validated while parsing, so reconciliation never starts on a half-valid
//! configuration.
use std::collections::{BTreeSet, HashSet};

use indexmap::IndexMap;
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use snafu::{OptionExt, ResultExt, Snafu, ensure};

use crate::{constants::EXPECTED_KEYS, member::MemberKind};

mod desired;

pub use desired::*;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("the configuration file is improperly formatted, unable to parse"))]
    ParseYaml { source: serde_yaml::Error },

    #[snafu(display("the configuration file is improperly formatted, expected a mapping"))]
    NotAMapping,

    #[snafu(display("scope key {key} must be a string"))]
    NonStringScope { key: String },

    #[snafu(display(
        "user management configuration must be keyed by service name, found {key:?} at the top level"
    ))]
    MissingServiceKey { key: String },

    #[snafu(display("scope {scope:?} must be a mapping of users, groups and memberships"))]
    ScopeNotAMapping { scope: String },

    #[snafu(display("missing {expected_key:?} values for {scope:?} in the configuration file"))]
    MissingKey {
        scope: String,
        expected_key: &'static str,
    },

    #[snafu(display("invalid user-group records for {scope:?}"))]
    InvalidRecords {
        scope: String,
        source: serde_yaml::Error,
    },

    #[snafu(display("{kind} {name:?} is declared more than once for {scope:?}"))]
    DuplicateMember {
        scope: String,
        kind: MemberKind,
        name: String,
    },
}

/// A validated user-group configuration. Scopes keep the order they were declared in.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct UserGroupConfiguration(IndexMap<String, DesiredRecord>);

impl UserGroupConfiguration {
    /// Parses and validates the raw configuration text.
    ///
    /// Blank text is a valid, empty configuration.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        let value: Value = serde_yaml::from_str(raw).context(ParseYamlSnafu)?;
        let Value::Mapping(mapping) = value else {
            return NotAMappingSnafu.fail();
        };

        let mut scopes = IndexMap::with_capacity(mapping.len());
        for (key, value) in mapping {
            let scope = match key {
                Value::String(scope) => scope,
                other => {
                    return NonStringScopeSnafu {
                        key: format!("{other:?}"),
                    }
                    .fail();
                }
            };
            ensure!(
                !EXPECTED_KEYS.contains(&scope.as_str()),
                MissingServiceKeySnafu { key: scope }
            );

            let record = parse_record(&scope, value)?;
            scopes.insert(scope, record);
        }

        Ok(Self(scopes))
    }

    pub fn scopes(&self) -> impl Iterator<Item = (&str, &DesiredRecord)> {
        self.0.iter().map(|(scope, record)| (scope.as_str(), record))
    }

    pub fn get(&self, scope: &str) -> Option<&DesiredRecord> {
        self.0.get(scope)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The groups and memberships declared by any scope.
    pub fn declared_members(&self) -> DeclaredMembers {
        self.0.values().collect()
    }

    /// Returns the scopes which do not name any of the `related_services`.
    pub fn unrelated_scopes<'a>(&'a self, related_services: &BTreeSet<String>) -> Vec<&'a str> {
        self.0
            .keys()
            .filter(|scope| !related_services.contains(*scope))
            .map(String::as_str)
            .collect()
    }
}

fn parse_record(scope: &str, value: Value) -> Result<DesiredRecord> {
    let mapping: &Mapping = value
        .as_mapping()
        .context(ScopeNotAMappingSnafu { scope })?;

    for expected_key in EXPECTED_KEYS {
        ensure!(
            mapping.contains_key(expected_key),
            MissingKeySnafu {
                scope,
                expected_key
            }
        );
    }

    let record: DesiredRecord =
        serde_yaml::from_value(value).context(InvalidRecordsSnafu { scope })?;

    ensure_unique(
        scope,
        MemberKind::Group,
        record.groups.iter().map(|group| group.name.as_str()),
    )?;
    ensure_unique(
        scope,
        MemberKind::User,
        record.users.iter().map(|user| user.name.as_str()),
    )?;

    Ok(record)
}

fn ensure_unique<'a>(
    scope: &str,
    kind: MemberKind,
    names: impl IntoIterator<Item = &'a str>,
) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        ensure!(
            seen.insert(name),
            DuplicateMemberSnafu { scope, kind, name }
        );
    }
    Ok(())
}
