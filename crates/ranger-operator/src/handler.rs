//! Handling of a single trigger (configuration change, relation change or periodic check).
//!
//! Gates come first: nothing happens before the workload is up, and only the leader of an
//! `admin` deployment writes to Ranger. The configuration is then validated as a whole before
//! any scope is synchronized.
use std::fmt::{Display, Formatter};

use snafu::{ResultExt, Snafu};
use tracing::instrument;

use crate::{
    client::DirectoryClient,
    config::UserGroupConfiguration,
    constants::POLICY_RELATION_NAME,
    id_mapping::{self, IdMapping},
    reconciler::{Reconciler, ReconcilerContext, SyncReport},
    relation::{self, PolicyRelation},
    settings::CharmFunction,
    state::StateStore,
};

const ACTIVE_MESSAGE: &str = "Status check: UP";

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to persist the id mapping"))]
    PersistIdMapping { source: id_mapping::Error },

    #[snafu(display("failed to propagate the user-group configuration of {scope:?}"))]
    Propagate {
        scope: String,
        source: relation::Error,
    },
}

/// The status a unit reports to its operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnitStatus {
    Active(String),
    Blocked(String),
    Waiting(String),
}

impl Display for UnitStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active(message) => write!(f, "active: {message}"),
            Self::Blocked(message) => write!(f, "blocked: {message}"),
            Self::Waiting(message) => write!(f, "waiting: {message}"),
        }
    }
}

/// What the environment looked like when the trigger fired.
#[derive(Clone, Debug)]
pub struct Trigger<'a> {
    pub is_leader: bool,
    pub workload_active: bool,

    /// The raw `user-group-configuration` text.
    pub configuration: &'a str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum SkipReason {
    #[strum(to_string = "this unit is not the leader")]
    NotLeader,

    #[strum(to_string = "usersync deployments do not manage users and groups")]
    Usersync,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeferReason {
    WorkloadNotActive,

    /// Retries ran out for these scopes. Other scopes were synchronized.
    ScopesFailed {
        scopes: Vec<String>,
        report: SyncReport,
    },
}

/// How a trigger ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Synchronized(SyncReport),
    Skipped(SkipReason),

    /// The trigger has to be delivered again later.
    Deferred(DeferReason),

    /// The configuration is invalid. Nothing was sent to Ranger.
    Blocked(String),
}

impl Outcome {
    /// The status to report, [`None`] leaves the current one in place.
    pub fn status(&self) -> Option<UnitStatus> {
        match self {
            Self::Synchronized(_) => Some(UnitStatus::Active(ACTIVE_MESSAGE.to_owned())),
            Self::Skipped(_) | Self::Deferred(DeferReason::WorkloadNotActive) => None,
            Self::Deferred(DeferReason::ScopesFailed { scopes, .. }) => Some(UnitStatus::Waiting(
                format!("waiting to synchronize {}", scopes.join(", ")),
            )),
            Self::Blocked(message) => Some(UnitStatus::Blocked(message.clone())),
        }
    }
}

/// Runs the user-group synchronization for a trigger.
pub struct UserGroupSync<C> {
    reconciler: Reconciler<C>,
    charm_function: CharmFunction,
    external_hostname: String,
}

impl<C: DirectoryClient> UserGroupSync<C> {
    pub fn new(
        reconciler: Reconciler<C>,
        charm_function: CharmFunction,
        external_hostname: impl Into<String>,
    ) -> Self {
        Self {
            reconciler,
            charm_function,
            external_hostname: external_hostname.into(),
        }
    }

    pub fn reconciler(&self) -> &Reconciler<C> {
        &self.reconciler
    }

    /// Handles `trigger`, reading and persisting the id mapping through `state` and sharing
    /// data on the `policy` `relations`.
    #[instrument(skip_all, fields(leader = trigger.is_leader))]
    pub async fn handle(
        &self,
        trigger: &Trigger<'_>,
        state: &mut impl StateStore,
        relations: &mut [PolicyRelation],
    ) -> Result<Outcome> {
        tracing::info!("* running user-group synchronization");
        let outcome = self.run(trigger, state, relations).await;
        tracing::info!(?outcome, "* completed user-group synchronization");
        outcome
    }

    async fn run(
        &self,
        trigger: &Trigger<'_>,
        state: &mut impl StateStore,
        relations: &mut [PolicyRelation],
    ) -> Result<Outcome> {
        if !trigger.workload_active {
            tracing::debug!("status not active, deferring");
            return Ok(Outcome::Deferred(DeferReason::WorkloadNotActive));
        }
        if !trigger.is_leader {
            return Ok(Outcome::Skipped(SkipReason::NotLeader));
        }
        if !self.charm_function.manages_directory() {
            return Ok(Outcome::Skipped(SkipReason::Usersync));
        }

        let configuration = match UserGroupConfiguration::parse(trigger.configuration) {
            Ok(configuration) => configuration,
            Err(error) => {
                tracing::error!(
                    error = &error as &dyn std::error::Error,
                    "invalid user-group configuration"
                );
                return Ok(Outcome::Blocked(
                    snafu::Report::from_error(error).to_string(),
                ));
            }
        };

        for relation in relations.iter_mut() {
            relation.publish_policy_manager_url(&self.external_hostname);
        }
        let related = relation::related_services(relations);
        for scope in configuration.unrelated_scopes(&related) {
            tracing::warn!(
                scope,
                relation = POLICY_RELATION_NAME,
                "scope does not match a related service"
            );
        }

        let mut id_mapping = IdMapping::load(&*state).unwrap_or_else(|error| {
            tracing::warn!(
                error = &error as &dyn std::error::Error,
                "discarding unreadable id mapping"
            );
            IdMapping::default()
        });

        let declared = configuration.declared_members();
        let mut report = SyncReport::default();
        let mut failed = Vec::new();
        for (scope, desired) in configuration.scopes() {
            let mut ctx = ReconcilerContext {
                scope_key: scope,
                id_mapping: &mut id_mapping,
                declared: &declared,
            };
            match self.reconciler.synchronize(&mut ctx, desired).await {
                Ok(scope_report) => {
                    report += scope_report;
                    relation::propagate(relations, scope, desired)
                        .context(PropagateSnafu { scope })?;
                }
                Err(error) => {
                    tracing::warn!(
                        scope,
                        error = &error as &dyn std::error::Error,
                        "failed to synchronize scope, deferring"
                    );
                    failed.push(scope.to_owned());
                }
            }
        }

        id_mapping.store(state).context(PersistIdMappingSnafu)?;

        Ok(if failed.is_empty() {
            Outcome::Synchronized(report)
        } else {
            Outcome::Deferred(DeferReason::ScopesFailed {
                scopes: failed,
                report,
            })
        })
    }
}
