//! Brings the Ranger directory in line with the desired state of a scope.
//!
//! A pass handles the [kinds](MemberKind::SYNC_ORDER) one after another. For every kind the
//! existing members are fetched, diffed against the desired ones, and the difference is applied
//! through the [`DirectoryClient`]. Every call goes through the [`RetryPolicy`]. Once a call has
//! used up its attempts the pass aborts before touching later kinds. Whatever was applied up to
//! that point stays applied; the next pass picks up from there.
use std::{
    collections::{BTreeMap, BTreeSet},
    ops::AddAssign,
};

use snafu::{ResultExt, Snafu};
use tracing::instrument;

use crate::{
    client::{CreateOutcome, DeleteOutcome, DirectoryClient, MemberPayload},
    config::{DeclaredMembers, DesiredMember, DesiredRecord, MembershipSpec},
    id_mapping::IdMapping,
    member::{MemberKey, MemberKind},
    retry::{RetryPolicy, ServiceError},
};

mod diff;

type Result<T, E = Error> = std::result::Result<T, E>;

/// Every variant means the pass should be deferred and retried later.
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to fetch existing {kind}s"))]
    FetchExisting {
        kind: MemberKind,
        source: ServiceError,
    },

    #[snafu(display("failed to create {kind} {key}"))]
    CreateMember {
        kind: MemberKind,
        key: MemberKey,
        source: ServiceError,
    },

    #[snafu(display("failed to delete {kind} {key}"))]
    DeleteMember {
        kind: MemberKind,
        key: MemberKey,
        source: ServiceError,
    },
}

/// The state a single pass works on.
#[derive(Debug)]
pub struct ReconcilerContext<'a> {
    /// Only used to tell passes apart in logs.
    pub scope_key: &'a str,
    pub id_mapping: &'a mut IdMapping,

    /// Members declared by any scope. These are never deleted, even if this scope does not
    /// declare them.
    pub declared: &'a DeclaredMembers,
}

/// Counts of what a pass did.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SyncReport {
    pub created: usize,
    pub deleted: usize,

    /// Creates and deletes Ranger refused.
    pub rejected: usize,

    /// Membership users which could not be resolved to a user id.
    pub unresolved: usize,
}

impl SyncReport {
    /// Returns `true` if the pass did not change anything in Ranger.
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.deleted == 0
    }
}

impl AddAssign for SyncReport {
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.deleted += other.deleted;
        self.rejected += other.rejected;
        self.unresolved += other.unresolved;
    }
}

pub struct Reconciler<C> {
    client: C,
    retry: RetryPolicy,
}

impl<C: DirectoryClient> Reconciler<C> {
    pub fn new(client: C, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Runs one pass over all kinds for the scope in `ctx`.
    #[instrument(skip_all, fields(scope = ctx.scope_key))]
    pub async fn synchronize(
        &self,
        ctx: &mut ReconcilerContext<'_>,
        desired: &DesiredRecord,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        for kind in MemberKind::SYNC_ORDER {
            let members: Vec<DesiredMember> = match kind {
                MemberKind::Group => desired
                    .groups
                    .iter()
                    .cloned()
                    .map(DesiredMember::Group)
                    .collect(),
                MemberKind::User => desired
                    .users
                    .iter()
                    .cloned()
                    .map(DesiredMember::User)
                    .collect(),
                // Relies on the user ids recorded while syncing users above.
                MemberKind::Membership => {
                    resolve_memberships(ctx.id_mapping, &desired.memberships, &mut report)
                }
            };

            self.sync(ctx, kind, members, &mut report).await?;
        }

        tracing::info!(
            created = report.created,
            deleted = report.deleted,
            rejected = report.rejected,
            unresolved = report.unresolved,
            "synchronized scope"
        );
        Ok(report)
    }

    async fn sync(
        &self,
        ctx: &mut ReconcilerContext<'_>,
        kind: MemberKind,
        desired: Vec<DesiredMember>,
        report: &mut SyncReport,
    ) -> Result<()> {
        let existing = self.existing_values(ctx.id_mapping, kind).await?;
        let kept = declared_keys(ctx.declared, ctx.id_mapping, kind);
        let plan = diff::plan(kind, desired, &existing, &kept);

        for member in &plan.create {
            self.create_member(ctx.id_mapping, member, report).await?;
        }
        for (key, id) in plan.delete {
            self.delete_member(ctx.id_mapping, kind, key, id, report)
                .await?;
        }

        Ok(())
    }

    /// Fetches the members of `kind` and replaces their ids in `id_mapping`.
    async fn existing_values(
        &self,
        id_mapping: &mut IdMapping,
        kind: MemberKind,
    ) -> Result<BTreeMap<MemberKey, i64>> {
        let records = self
            .retry
            .run(&format!("list {kind}s"), move || self.client.list(kind))
            .await
            .context(FetchExistingSnafu { kind })?;

        let existing: BTreeMap<_, _> = records
            .iter()
            .filter_map(|record| match record.key(kind) {
                Some(key) => Some((key, record.id)),
                None => {
                    tracing::debug!(%kind, id = record.id, "ignoring record without user id");
                    None
                }
            })
            .collect();

        id_mapping.replace(kind, existing.iter().map(|(key, id)| (key, *id)));
        Ok(existing)
    }

    async fn create_member(
        &self,
        id_mapping: &mut IdMapping,
        member: &DesiredMember,
        report: &mut SyncReport,
    ) -> Result<()> {
        let kind = member.kind();
        let key = member.key();
        let payload = &MemberPayload::from(member);

        let outcome = self
            .retry
            .run(&format!("create {kind} {key}"), move || {
                self.client.create(payload)
            })
            .await
            .context(CreateMemberSnafu {
                kind,
                key: key.clone(),
            })?;

        match outcome {
            CreateOutcome::Created(created) => {
                tracing::info!(%kind, %key, id = created.id, "created member");
                id_mapping.record(kind, &key, created.id);
                report.created += 1;
            }
            CreateOutcome::Rejected { status } => {
                tracing::info!(%kind, %key, status, "ranger rejected member creation");
                report.rejected += 1;
            }
        }
        Ok(())
    }

    async fn delete_member(
        &self,
        id_mapping: &mut IdMapping,
        kind: MemberKind,
        key: MemberKey,
        id: i64,
        report: &mut SyncReport,
    ) -> Result<()> {
        let outcome = self
            .retry
            .run(&format!("delete {kind} {key}"), move || {
                self.client.delete(kind, id)
            })
            .await
            .context(DeleteMemberSnafu {
                kind,
                key: key.clone(),
            })?;

        match outcome {
            DeleteOutcome::Deleted => {
                tracing::info!(%kind, %key, id, "deleted member");
                id_mapping.forget(kind, &key);
                report.deleted += 1;
            }
            DeleteOutcome::Rejected { status } => {
                tracing::info!(%kind, %key, id, status, "ranger rejected member deletion");
                report.rejected += 1;
            }
        }
        Ok(())
    }
}

/// The keys of `kind` declared by any scope, as far as they can be resolved.
fn declared_keys(
    declared: &DeclaredMembers,
    id_mapping: &IdMapping,
    kind: MemberKind,
) -> BTreeSet<MemberKey> {
    match kind {
        MemberKind::Group => declared.groups().map(MemberKey::name).collect(),
        MemberKind::User => BTreeSet::new(),
        MemberKind::Membership => declared
            .memberships()
            .filter_map(|(group, user)| {
                id_mapping
                    .user_id(user)
                    .map(|user_id| MemberKey::membership(group, user_id))
            })
            .collect(),
    }
}

/// Turns the declared memberships into `(group, user id)` members.
///
/// Users without a known id are skipped; they either failed to be created or were refused by
/// Ranger, and the next pass will try again.
fn resolve_memberships(
    id_mapping: &IdMapping,
    memberships: &[MembershipSpec],
    report: &mut SyncReport,
) -> Vec<DesiredMember> {
    let mut resolved = Vec::new();
    for membership in memberships {
        for user in &membership.users {
            match id_mapping.user_id(user) {
                Some(user_id) => resolved.push(DesiredMember::Membership {
                    group: membership.groupname.clone(),
                    user_id,
                }),
                None => {
                    tracing::warn!(
                        group = %membership.groupname,
                        %user,
                        "unable to resolve membership user, skipping"
                    );
                    report.unresolved += 1;
                }
            }
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use indoc::indoc;
    use tokio::time::{Duration, Instant};

    use super::*;
    use crate::client::fake::{Call, FakeDirectory, Operation};

    const SCOPE: &str = "trino-service";

    fn desired(yaml: &str) -> DesiredRecord {
        serde_yaml::from_str(yaml).expect("test record must deserialize")
    }

    /// finance, alice and alice in finance.
    fn finance() -> DesiredRecord {
        desired(indoc! {"
            groups:
              - name: finance
                description: finance team
            users:
              - name: alice
                firstname: Alice
                lastname: Liddell
                email: alice@example.com
            memberships:
              - groupname: finance
                users: [alice]
        "})
    }

    fn reconciler() -> Reconciler<FakeDirectory> {
        Reconciler::new(FakeDirectory::default(), RetryPolicy::default())
    }

    async fn synchronize(
        reconciler: &Reconciler<FakeDirectory>,
        id_mapping: &mut IdMapping,
        desired: &DesiredRecord,
    ) -> Result<SyncReport> {
        let declared = DeclaredMembers::default();
        let mut ctx = ReconcilerContext {
            scope_key: SCOPE,
            id_mapping,
            declared: &declared,
        };
        reconciler.synchronize(&mut ctx, desired).await
    }

    fn names(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| (*name).to_owned()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn creates_everything_then_is_idempotent() {
        let reconciler = reconciler();
        let directory = reconciler.client();
        let mut id_mapping = IdMapping::default();

        let report = synchronize(&reconciler, &mut id_mapping, &finance())
            .await
            .expect("first pass must succeed");

        let alice = directory
            .id_of(MemberKind::User, "alice")
            .expect("alice must have been created");
        assert_eq!(
            directory.mutations().into_iter().collect::<BTreeSet<_>>(),
            BTreeSet::from([
                Call::Create {
                    kind: MemberKind::Group,
                    name: "finance".to_owned(),
                    user_id: None,
                },
                Call::Create {
                    kind: MemberKind::User,
                    name: "alice".to_owned(),
                    user_id: None,
                },
                Call::Create {
                    kind: MemberKind::Membership,
                    name: "finance".to_owned(),
                    user_id: Some(alice),
                },
            ])
        );
        assert_eq!(report.created, 3);

        directory.clear_calls();
        let report = synchronize(&reconciler, &mut id_mapping, &finance())
            .await
            .expect("second pass must succeed");

        assert!(directory.mutations().is_empty());
        assert!(report.is_noop());
    }

    #[tokio::test(start_paused = true)]
    async fn kinds_are_synchronized_in_order() {
        let reconciler = reconciler();
        let mut id_mapping = IdMapping::default();

        synchronize(&reconciler, &mut id_mapping, &finance())
            .await
            .expect("pass must succeed");

        let lists: Vec<_> = reconciler
            .client()
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::List(kind) => Some(kind),
                _ => None,
            })
            .collect();
        assert_eq!(lists, MemberKind::SYNC_ORDER);
    }

    #[tokio::test(start_paused = true)]
    async fn id_mapping_covers_every_desired_member() {
        let reconciler = reconciler();
        let directory = reconciler.client();
        let mut id_mapping = IdMapping::default();
        id_mapping.record(MemberKind::Group, &MemberKey::name("stale"), 99);

        synchronize(&reconciler, &mut id_mapping, &finance())
            .await
            .expect("pass must succeed");

        let alice = directory.id_of(MemberKind::User, "alice");
        assert_eq!(id_mapping.user_id("alice"), alice);
        assert_eq!(
            id_mapping.get(MemberKind::Group, &MemberKey::name("finance")),
            directory.id_of(MemberKind::Group, "finance")
        );
        assert!(
            id_mapping
                .get(
                    MemberKind::Membership,
                    &MemberKey::membership("finance", alice.expect("alice exists"))
                )
                .is_some()
        );
        assert_eq!(
            id_mapping.get(MemberKind::Group, &MemberKey::name("stale")),
            None
        );
    }

    #[tokio::test(start_paused = true)]
    async fn deletes_surplus_membership_but_keeps_group_and_user() {
        let reconciler = reconciler();
        let directory = reconciler.client();
        directory.seed(MemberKind::Group, "finance");
        let alice = directory.seed(MemberKind::User, "alice");
        let membership = directory.seed_membership("finance", alice);

        let mut without_memberships = finance();
        without_memberships.memberships.clear();

        synchronize(&reconciler, &mut IdMapping::default(), &without_memberships)
            .await
            .expect("pass must succeed");

        assert_eq!(
            directory.mutations(),
            vec![Call::Delete {
                kind: MemberKind::Membership,
                id: membership,
            }]
        );
        assert_eq!(directory.names(MemberKind::Group), names(&["finance"]));
        assert_eq!(directory.names(MemberKind::User), names(&["alice"]));
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_members_declared_by_other_scopes() {
        let reconciler = reconciler();
        let directory = reconciler.client();
        directory.seed(MemberKind::Group, "sales");
        directory.seed(MemberKind::Group, "legacy");
        let bob = directory.seed(MemberKind::User, "bob");
        directory.seed_membership("sales", bob);
        let legacy = directory.seed_membership("legacy", bob);

        let sales = desired(indoc! {"
            groups:
              - name: sales
                description: sales team
            users: []
            memberships:
              - groupname: sales
                users: [bob]
        "});
        let declared: DeclaredMembers = [&finance(), &sales].into_iter().collect();
        let mut id_mapping = IdMapping::default();
        let mut ctx = ReconcilerContext {
            scope_key: SCOPE,
            id_mapping: &mut id_mapping,
            declared: &declared,
        };
        reconciler
            .synchronize(&mut ctx, &finance())
            .await
            .expect("pass must succeed");

        assert_eq!(
            directory.names(MemberKind::Group),
            names(&["finance", "sales"])
        );
        assert!(
            directory
                .memberships()
                .contains(&("sales".to_owned(), bob))
        );
        assert!(directory.mutations().contains(&Call::Delete {
            kind: MemberKind::Membership,
            id: legacy,
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn converges_from_a_drifted_directory() {
        let reconciler = reconciler();
        let directory = reconciler.client();
        directory.seed(MemberKind::Group, "public");
        directory.seed(MemberKind::Group, "legacy");
        let carol = directory.seed(MemberKind::User, "carol");
        directory.seed_membership("legacy", carol);
        directory.seed_membership("public", carol);

        let report = synchronize(&reconciler, &mut IdMapping::default(), &finance())
            .await
            .expect("pass must succeed");

        let alice = directory
            .id_of(MemberKind::User, "alice")
            .expect("alice must have been created");
        assert_eq!(
            directory.names(MemberKind::Group),
            names(&["finance", "public"])
        );
        assert_eq!(directory.names(MemberKind::User), names(&["alice", "carol"]));
        assert_eq!(
            directory.memberships(),
            BTreeSet::from([
                ("finance".to_owned(), alice),
                ("public".to_owned(), carol),
            ])
        );
        assert_eq!(report.created, 3);
        assert_eq!(report.deleted, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_desired_state_keeps_system_groups_and_users() {
        let reconciler = reconciler();
        let directory = reconciler.client();
        directory.seed(MemberKind::Group, "public");
        let legacy = directory.seed(MemberKind::Group, "legacy");
        let bob = directory.seed(MemberKind::User, "bob");
        directory.seed_membership("public", bob);

        let report = synchronize(
            &reconciler,
            &mut IdMapping::default(),
            &DesiredRecord::default(),
        )
        .await
        .expect("pass must succeed");

        assert_eq!(
            directory.mutations(),
            vec![Call::Delete {
                kind: MemberKind::Group,
                id: legacy,
            }]
        );
        assert_eq!(report.deleted, 1);
        assert_eq!(directory.names(MemberKind::User), names(&["bob"]));
        assert_eq!(
            directory.memberships(),
            BTreeSet::from([("public".to_owned(), bob)])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unresolved_membership_user_is_skipped() {
        let reconciler = reconciler();
        let directory = reconciler.client();
        directory.reject(MemberKind::User, "alice");

        let report = synchronize(&reconciler, &mut IdMapping::default(), &finance())
            .await
            .expect("a refused user must not fail the pass");

        assert_eq!(report.rejected, 1);
        assert_eq!(report.unresolved, 1);
        assert!(directory.memberships().is_empty());
        assert_eq!(directory.names(MemberKind::Group), names(&["finance"]));
    }

    #[tokio::test(start_paused = true)]
    async fn membership_of_an_undeclared_existing_user_resolves() {
        let reconciler = reconciler();
        let directory = reconciler.client();
        let bob = directory.seed(MemberKind::User, "bob");

        let mut record = finance();
        record.memberships[0].users.push("bob".to_owned());

        synchronize(&reconciler, &mut IdMapping::default(), &record)
            .await
            .expect("pass must succeed");

        assert!(
            directory
                .memberships()
                .contains(&("finance".to_owned(), bob))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let reconciler = reconciler();
        let directory = reconciler.client();
        directory.fail(Operation::List(MemberKind::User), 2);
        let started = Instant::now();

        synchronize(&reconciler, &mut IdMapping::default(), &finance())
            .await
            .expect("third attempt must succeed");

        assert_eq!(started.elapsed(), Duration::from_secs(6));
        assert_eq!(directory.names(MemberKind::User), names(&["alice"]));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_abort_before_later_kinds() {
        let reconciler = reconciler();
        let directory = reconciler.client();
        directory.fail(Operation::List(MemberKind::Group), 3);

        let error = synchronize(&reconciler, &mut IdMapping::default(), &finance())
            .await
            .expect_err("listing groups never succeeds");

        assert!(matches!(
            error,
            Error::FetchExisting {
                kind: MemberKind::Group,
                ..
            }
        ));
        assert_eq!(directory.calls(), vec![Call::List(MemberKind::Group); 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_create_keeps_earlier_changes() {
        let reconciler = reconciler();
        let directory = reconciler.client();
        directory.fail(Operation::Create(MemberKind::User), 3);
        let mut id_mapping = IdMapping::default();

        let error = synchronize(&reconciler, &mut id_mapping, &finance())
            .await
            .expect_err("creating alice never succeeds");

        assert!(matches!(
            error,
            Error::CreateMember {
                kind: MemberKind::User,
                ..
            }
        ));
        assert_eq!(directory.names(MemberKind::Group), names(&["finance"]));
        assert!(
            id_mapping
                .get(MemberKind::Group, &MemberKey::name("finance"))
                .is_some()
        );
        assert!(
            !directory
                .calls()
                .contains(&Call::List(MemberKind::Membership))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_delete_is_counted_not_raised() {
        let reconciler = reconciler();
        let mut id_mapping = IdMapping::default();
        id_mapping.record(MemberKind::Group, &MemberKey::name("ghost"), 404);
        let mut report = SyncReport::default();

        reconciler
            .delete_member(
                &mut id_mapping,
                MemberKind::Group,
                MemberKey::name("ghost"),
                404,
                &mut report,
            )
            .await
            .expect("a refused delete is not an error");

        assert_eq!(report.rejected, 1);
        assert_eq!(report.deleted, 0);
        assert_eq!(
            id_mapping.get(MemberKind::Group, &MemberKey::name("ghost")),
            Some(404)
        );
    }
}
