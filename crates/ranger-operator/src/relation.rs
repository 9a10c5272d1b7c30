//! `policy` relations: the consumers (e.g. Trino) whose Ranger services get user-group data.
//!
//! Each consumer advertises its Ranger `service_name`. Once a scope with that name has been
//! synchronized, its desired record is written to the relation for the consumer to read.
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::{
    config::DesiredRecord,
    constants::{
        APP_NAME, APPLICATION_PORT, POLICY_MANAGER_URL_RELATION_KEY, SERVICE_NAME_RELATION_KEY,
        USER_GROUP_CONFIGURATION_RELATION_KEY,
    },
};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to serialize the user-group configuration of {scope:?}"))]
    SerializeRecord {
        scope: String,
        source: serde_yaml::Error,
    },

    #[snafu(display("failed to read relations file {path:?}"))]
    ReadRelationsFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to parse relations file {path:?}"))]
    ParseRelationsFile {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[snafu(display("failed to serialize relations"))]
    SerializeRelations { source: serde_yaml::Error },

    #[snafu(display("failed to write relations file {path:?}"))]
    WriteRelationsFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// One established `policy` relation and the data this application shares on it.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRelation {
    pub id: u32,

    #[serde(default)]
    pub app_data: BTreeMap<String, String>,
}

impl PolicyRelation {
    pub fn service_name(&self) -> Option<&str> {
        self.app_data
            .get(SERVICE_NAME_RELATION_KEY)
            .map(String::as_str)
    }

    /// Overwrites the shared user-group configuration with `desired`.
    pub fn publish_user_group_configuration(
        &mut self,
        scope: &str,
        desired: &DesiredRecord,
    ) -> Result<()> {
        let yaml = serde_yaml::to_string(desired).context(SerializeRecordSnafu { scope })?;
        self.app_data
            .insert(USER_GROUP_CONFIGURATION_RELATION_KEY.to_owned(), yaml);
        Ok(())
    }

    pub fn publish_policy_manager_url(&mut self, external_hostname: &str) {
        self.app_data.insert(
            POLICY_MANAGER_URL_RELATION_KEY.to_owned(),
            policy_manager_url(external_hostname),
        );
    }
}

/// The URL consumers reach the policy manager at. TLS is terminated in front of every hostname
/// except the in-cluster application name.
pub fn policy_manager_url(external_hostname: &str) -> String {
    let protocol = if external_hostname == APP_NAME {
        "http"
    } else {
        "https"
    };
    format!("{protocol}://{external_hostname}:{APPLICATION_PORT}")
}

/// Writes `desired` to every relation advertising `scope` as its service name.
///
/// Returns how many relations were updated.
pub fn propagate(
    relations: &mut [PolicyRelation],
    scope: &str,
    desired: &DesiredRecord,
) -> Result<usize> {
    let mut updated = 0;
    for relation in relations
        .iter_mut()
        .filter(|relation| relation.service_name() == Some(scope))
    {
        relation.publish_user_group_configuration(scope, desired)?;
        tracing::info!(relation_id = relation.id, scope, "published user-group configuration");
        updated += 1;
    }
    Ok(updated)
}

/// The service names advertised on `relations`.
pub fn related_services(relations: &[PolicyRelation]) -> BTreeSet<String> {
    relations
        .iter()
        .filter_map(PolicyRelation::service_name)
        .map(str::to_owned)
        .collect()
}

pub fn read_relations_file(path: &Path) -> Result<Vec<PolicyRelation>> {
    let contents = fs::read_to_string(path).context(ReadRelationsFileSnafu { path })?;
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_yaml::from_str(&contents).context(ParseRelationsFileSnafu { path })
}

pub fn write_relations_file(path: &Path, relations: &[PolicyRelation]) -> Result<()> {
    let contents = serde_yaml::to_string(relations).context(SerializeRelationsSnafu)?;
    fs::write(path, contents).context(WriteRelationsFileSnafu { path })
}
