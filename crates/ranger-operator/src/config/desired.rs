use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::member::{MemberKey, MemberKind};

/// The desired directory state of a single scope.
///
/// All three collections are required, unknown fields are rejected.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DesiredRecord {
    pub users: Vec<UserSpec>,
    pub groups: Vec<GroupSpec>,
    pub memberships: Vec<MembershipSpec>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GroupSpec {
    pub name: String,
    pub description: String,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UserSpec {
    pub name: String,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
}

/// Declares that all `users` (by name) belong to the group `groupname`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MembershipSpec {
    pub groupname: String,
    pub users: Vec<String>,
}

/// A single desired member, ready to be created.
///
/// Memberships only become a [`DesiredMember`] once their user name has been resolved to a
/// remote user id.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DesiredMember {
    Group(GroupSpec),
    User(UserSpec),
    Membership { group: String, user_id: i64 },
}

impl DesiredMember {
    pub const fn kind(&self) -> MemberKind {
        match self {
            Self::Group(_) => MemberKind::Group,
            Self::User(_) => MemberKind::User,
            Self::Membership { .. } => MemberKind::Membership,
        }
    }

    pub fn key(&self) -> MemberKey {
        match self {
            Self::Group(GroupSpec { name, .. }) | Self::User(UserSpec { name, .. }) => {
                MemberKey::name(name)
            }
            Self::Membership { group, user_id } => MemberKey::membership(group, *user_id),
        }
    }
}

/// Groups and memberships declared across all scopes of a configuration.
///
/// Every scope converges the same Ranger directory, so a member declared by one scope must not
/// be removed while synchronizing another. Memberships are kept by group and user name, as user
/// ids are only known once users have been fetched.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeclaredMembers {
    groups: BTreeSet<String>,
    memberships: BTreeSet<(String, String)>,
}

impl DeclaredMembers {
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(String::as_str)
    }

    /// `(group, user name)` pairs.
    pub fn memberships(&self) -> impl Iterator<Item = (&str, &str)> {
        self.memberships
            .iter()
            .map(|(group, user)| (group.as_str(), user.as_str()))
    }
}

impl<'a> Extend<&'a DesiredRecord> for DeclaredMembers {
    fn extend<T: IntoIterator<Item = &'a DesiredRecord>>(&mut self, records: T) {
        for record in records {
            self.groups
                .extend(record.groups.iter().map(|group| group.name.clone()));
            self.memberships
                .extend(record.memberships.iter().flat_map(|membership| {
                    membership
                        .users
                        .iter()
                        .map(|user| (membership.groupname.clone(), user.clone()))
                }));
        }
    }
}

impl<'a> FromIterator<&'a DesiredRecord> for DeclaredMembers {
    fn from_iter<T: IntoIterator<Item = &'a DesiredRecord>>(records: T) -> Self {
        let mut declared = Self::default();
        declared.extend(records);
        declared
    }
}
