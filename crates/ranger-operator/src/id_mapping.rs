//! Cache of the remote ids Ranger assigned to directory members.
//!
//! The mapping is owned by the reconciler and is the only state it persists. Its maintenance is
//! overwrite-then-patch:
//!
//! 1. Every fetch of a kind [replaces](IdMapping::replace) that kind's ids with what Ranger just
//!    returned. Entries from earlier passes are discarded.
//! 2. Every successful create [records](IdMapping::record) the new id right away, every successful
//!    delete [forgets](IdMapping::forget) it.
//!
//! Step 2 is what later kinds of the same pass rely on: memberships resolve user names through
//! the user ids recorded while creating users.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::{
    constants::ID_MAPPING_STATE_KEY,
    member::{MemberKey, MemberKind},
    state::StateStore,
};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to deserialize the persisted id mapping"))]
    DeserializeIdMapping { source: serde_yaml::Error },

    #[snafu(display("failed to serialize the id mapping"))]
    SerializeIdMapping { source: serde_yaml::Error },
}

/// `kind -> stringified member key -> remote id`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct IdMapping(BTreeMap<MemberKind, BTreeMap<String, i64>>);

impl IdMapping {
    /// Reads the mapping from `store`. A store without a mapping yields an empty one.
    pub fn load(store: &impl StateStore) -> Result<Self> {
        match store.get(ID_MAPPING_STATE_KEY) {
            Some(blob) => serde_yaml::from_str(blob).context(DeserializeIdMappingSnafu),
            None => Ok(Self::default()),
        }
    }

    pub fn store(&self, store: &mut impl StateStore) -> Result<()> {
        let blob = serde_yaml::to_string(self).context(SerializeIdMappingSnafu)?;
        store.set(ID_MAPPING_STATE_KEY, blob);
        Ok(())
    }

    /// Overwrites all ids of `kind`.
    pub fn replace<'a>(
        &mut self,
        kind: MemberKind,
        ids: impl IntoIterator<Item = (&'a MemberKey, i64)>,
    ) {
        let ids = ids
            .into_iter()
            .map(|(key, id)| (key.to_string(), id))
            .collect();
        self.0.insert(kind, ids);
    }

    pub fn record(&mut self, kind: MemberKind, key: &MemberKey, id: i64) {
        self.0.entry(kind).or_default().insert(key.to_string(), id);
    }

    pub fn forget(&mut self, kind: MemberKind, key: &MemberKey) {
        if let Some(ids) = self.0.get_mut(&kind) {
            ids.remove(&key.to_string());
        }
    }

    pub fn get(&self, kind: MemberKind, key: &MemberKey) -> Option<i64> {
        self.0.get(&kind)?.get(&key.to_string()).copied()
    }

    /// The remote id of the user called `name`.
    pub fn user_id(&self, name: &str) -> Option<i64> {
        self.0.get(&MemberKind::User)?.get(name).copied()
    }

    /// Number of ids known for `kind`.
    pub fn len(&self, kind: MemberKind) -> usize {
        self.0.get(&kind).map_or(0, BTreeMap::len)
    }
}
