use std::collections::{BTreeMap, BTreeSet};

use crate::{
    config::DesiredMember,
    member::{MemberKey, MemberKind},
};

/// What has to happen to one kind to match the desired state.
#[derive(Debug, Default, PartialEq, Eq)]
pub(super) struct Plan {
    pub create: Vec<DesiredMember>,

    /// Surplus members with the remote id they were fetched with.
    pub delete: Vec<(MemberKey, i64)>,
}

/// Diffs the `desired` members of `kind` against the `existing` keys and their remote ids.
///
/// Desired members which already exist are left alone, duplicates are created once. Surplus
/// members are only deleted if the kind allows it, they don't touch a system group and they are
/// not in `kept`.
pub(super) fn plan(
    kind: MemberKind,
    desired: Vec<DesiredMember>,
    existing: &BTreeMap<MemberKey, i64>,
    kept: &BTreeSet<MemberKey>,
) -> Plan {
    let mut wanted = BTreeSet::new();
    let mut create = Vec::new();
    for member in desired {
        let key = member.key();
        if !existing.contains_key(&key) && !wanted.contains(&key) {
            create.push(member);
        }
        wanted.insert(key);
    }

    if !kind.is_deletable() {
        return Plan {
            create,
            delete: Vec::new(),
        };
    }

    let delete = existing
        .iter()
        .filter(|(key, _)| !wanted.contains(*key))
        .filter(|(key, _)| {
            let declared = kept.contains(*key);
            if declared {
                tracing::debug!(%kind, %key, "keeping member declared by another scope");
            }
            !declared
        })
        .filter(|(key, _)| {
            let protected = key.is_protected(kind);
            if protected {
                tracing::debug!(%kind, %key, "skipping protected system group");
            }
            !protected
        })
        .map(|(key, id)| (key.clone(), *id))
        .collect();

    Plan { create, delete }
}
