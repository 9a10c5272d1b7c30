//! The three kinds of directory members Ranger knows about and how they are identified.
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use strum::Display as StrumDisplay;

use crate::constants::SYSTEM_GROUPS;

/// A kind of Ranger directory member. Determines the API endpoint, the payload shape and which
/// deletion rules apply.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, StrumDisplay,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MemberKind {
    Group,
    User,
    Membership,
}

impl MemberKind {
    /// The order kinds are synchronized in. Memberships reference both groups and users, so they
    /// come last.
    pub const SYNC_ORDER: [Self; 3] = [Self::Group, Self::User, Self::Membership];

    /// Path segment below `/service/xusers/`.
    pub const fn endpoint(self) -> &'static str {
        match self {
            Self::Group => "groups",
            Self::User => "users",
            Self::Membership => "groupusers",
        }
    }

    /// Name of the array holding the members in a list response.
    pub const fn list_key(self) -> &'static str {
        match self {
            Self::Group => "vXGroups",
            Self::User => "vXUsers",
            Self::Membership => "vXGroupUsers",
        }
    }

    /// Users are only ever added. Removing one could break references held by other kinds, so it
    /// has to be done by hand.
    pub const fn is_deletable(self) -> bool {
        !matches!(self, Self::User)
    }
}

/// The identity of a member within its kind.
///
/// Groups and users are identified by name. A membership is identified structurally by the
/// group-user pair; its remote id is only needed to delete it.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum MemberKey {
    Name(String),
    Membership { group: String, user_id: i64 },
}

impl MemberKey {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    pub fn membership(group: impl Into<String>, user_id: i64) -> Self {
        Self::Membership {
            group: group.into(),
            user_id,
        }
    }

    /// The group this key belongs to, if any. For [`MemberKey::Name`] this is the name itself,
    /// which is only meaningful for groups.
    pub fn group_name(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Membership { group, .. } => group,
        }
    }

    /// Returns `true` if removing the member identified by this key would touch a
    /// [system group](SYSTEM_GROUPS).
    pub fn is_protected(&self, kind: MemberKind) -> bool {
        match kind {
            MemberKind::Group | MemberKind::Membership => {
                SYSTEM_GROUPS.contains(&self.group_name())
            }
            MemberKind::User => false,
        }
    }
}

/// Stringified form used as the key in the [`IdMapping`](crate::id_mapping::IdMapping).
///
/// Memberships render as `group:user_id`.
impl Display for MemberKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Membership { group, user_id } => write!(f, "{group}:{user_id}"),
        }
    }
}

/// A member as returned by the Ranger API.
///
/// `user_id` is only present on memberships, where `name` is the group name.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingMember {
    pub id: i64,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

impl ExistingMember {
    /// Derives the identity of this member when interpreted as `kind`.
    ///
    /// Returns [`None`] for a membership record lacking a user id.
    pub fn key(&self, kind: MemberKind) -> Option<MemberKey> {
        match kind {
            MemberKind::Group | MemberKind::User => Some(MemberKey::name(&self.name)),
            MemberKind::Membership => self
                .user_id
                .map(|user_id| MemberKey::membership(&self.name, user_id)),
        }
    }
}
