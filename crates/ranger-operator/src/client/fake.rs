//! An in-memory [`DirectoryClient`] recording every call, with injectable failures.
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Mutex,
};

use async_trait::async_trait;

use crate::{
    client::{CreateOutcome, DeleteOutcome, DirectoryClient, MemberPayload, TransportError},
    member::{ExistingMember, MemberKind},
};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) enum Operation {
    List(MemberKind),
    Create(MemberKind),
    Delete(MemberKind),
}

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub(crate) enum Call {
    List(MemberKind),
    Create {
        kind: MemberKind,
        name: String,
        user_id: Option<i64>,
    },
    Delete {
        kind: MemberKind,
        id: i64,
    },
}

#[derive(Default)]
struct Directory {
    next_id: i64,
    members: BTreeMap<MemberKind, Vec<ExistingMember>>,
    calls: Vec<Call>,
    failures: HashMap<Operation, u32>,
    rejected: BTreeSet<(MemberKind, String)>,
}

impl Directory {
    fn insert(&mut self, kind: MemberKind, name: &str, user_id: Option<i64>) -> ExistingMember {
        self.next_id += 1;
        let member = ExistingMember {
            id: self.next_id,
            name: name.to_owned(),
            user_id,
        };
        self.members.entry(kind).or_default().push(member.clone());
        member
    }

    fn fail(&mut self, operation: Operation) -> Result<(), TransportError> {
        match self.failures.get_mut(&operation) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(TransportError::UnexpectedStatus {
                    url: format!("fake://ranger/{operation:?}"),
                    status: 503,
                })
            }
            _ => Ok(()),
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeDirectory {
    inner: Mutex<Directory>,
}

impl FakeDirectory {
    fn directory(&self) -> std::sync::MutexGuard<'_, Directory> {
        self.inner.lock().expect("fake directory lock poisoned")
    }

    /// Adds a group or user, returning its id.
    pub fn seed(&self, kind: MemberKind, name: &str) -> i64 {
        self.directory().insert(kind, name, None).id
    }

    pub fn seed_membership(&self, group: &str, user_id: i64) -> i64 {
        self.directory()
            .insert(MemberKind::Membership, group, Some(user_id))
            .id
    }

    /// Makes the next `times` calls of `operation` fail with a transport error.
    pub fn fail(&self, operation: Operation, times: u32) {
        self.directory().failures.insert(operation, times);
    }

    /// Makes every create of `name` answer with `409 Conflict`.
    pub fn reject(&self, kind: MemberKind, name: &str) {
        self.directory().rejected.insert((kind, name.to_owned()));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.directory().calls.clone()
    }

    /// All create and delete calls, in order.
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, Call::List(_)))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.directory().calls.clear();
    }

    pub fn names(&self, kind: MemberKind) -> BTreeSet<String> {
        self.directory()
            .members
            .get(&kind)
            .into_iter()
            .flatten()
            .map(|member| member.name.clone())
            .collect()
    }

    pub fn memberships(&self) -> BTreeSet<(String, i64)> {
        self.directory()
            .members
            .get(&MemberKind::Membership)
            .into_iter()
            .flatten()
            .filter_map(|member| Some((member.name.clone(), member.user_id?)))
            .collect()
    }

    pub fn id_of(&self, kind: MemberKind, name: &str) -> Option<i64> {
        self.directory()
            .members
            .get(&kind)?
            .iter()
            .find(|member| member.name == name)
            .map(|member| member.id)
    }
}

#[async_trait]
impl DirectoryClient for FakeDirectory {
    async fn list(&self, kind: MemberKind) -> Result<Vec<ExistingMember>, TransportError> {
        let mut directory = self.directory();
        directory.calls.push(Call::List(kind));
        directory.fail(Operation::List(kind))?;

        Ok(directory.members.get(&kind).cloned().unwrap_or_default())
    }

    async fn create(&self, payload: &MemberPayload) -> Result<CreateOutcome, TransportError> {
        let kind = payload.kind();
        let user_id = match payload {
            MemberPayload::Membership(membership) => Some(membership.user_id),
            _ => None,
        };

        let mut directory = self.directory();
        directory.calls.push(Call::Create {
            kind,
            name: payload.name().to_owned(),
            user_id,
        });
        directory.fail(Operation::Create(kind))?;

        if directory
            .rejected
            .contains(&(kind, payload.name().to_owned()))
        {
            return Ok(CreateOutcome::Rejected { status: 409 });
        }

        Ok(CreateOutcome::Created(directory.insert(
            kind,
            payload.name(),
            user_id,
        )))
    }

    async fn delete(&self, kind: MemberKind, id: i64) -> Result<DeleteOutcome, TransportError> {
        let mut directory = self.directory();
        directory.calls.push(Call::Delete { kind, id });
        directory.fail(Operation::Delete(kind))?;

        let members = directory.members.entry(kind).or_default();
        let before = members.len();
        members.retain(|member| member.id != id);

        Ok(if members.len() < before {
            DeleteOutcome::Deleted
        } else {
            DeleteOutcome::Rejected { status: 404 }
        })
    }
}
