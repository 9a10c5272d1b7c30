use std::fmt::{Debug, Formatter};

use serde::Serialize;

use crate::{
    config::{DesiredMember, GroupSpec, UserSpec},
    constants::USER_PASSWORD_LENGTH,
    member::MemberKind,
    utils::password::generate_password,
};

const USER_ROLE: &str = "ROLE_USER";

/// The body of a create request, shaped the way the Ranger `xusers` API expects it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MemberPayload {
    Group(GroupPayload),
    User(UserPayload),
    Membership(MembershipPayload),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GroupPayload {
    pub name: String,
    pub description: String,
}

/// New users are internal Ranger users with the plain user role and a random password.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    pub name: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub email_address: String,
    pub status: u8,
    pub user_source: u8,
    pub user_role_list: Vec<String>,
    pub is_visible: u8,
}

impl Debug for UserPayload {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserPayload")
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email_address", &self.email_address)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipPayload {
    /// The group name.
    pub name: String,
    pub user_id: i64,
}

impl MemberPayload {
    pub fn group(spec: &GroupSpec) -> Self {
        Self::Group(GroupPayload {
            name: spec.name.clone(),
            description: spec.description.clone(),
        })
    }

    pub fn user(spec: &UserSpec, password: String) -> Self {
        Self::User(UserPayload {
            name: spec.name.clone(),
            password,
            first_name: spec.firstname.clone(),
            last_name: spec.lastname.clone(),
            email_address: spec.email.clone(),
            status: 1,
            user_source: 1,
            user_role_list: vec![USER_ROLE.to_owned()],
            is_visible: 1,
        })
    }

    pub fn membership(group: &str, user_id: i64) -> Self {
        Self::Membership(MembershipPayload {
            name: group.to_owned(),
            user_id,
        })
    }

    pub const fn kind(&self) -> MemberKind {
        match self {
            Self::Group(_) => MemberKind::Group,
            Self::User(_) => MemberKind::User,
            Self::Membership(_) => MemberKind::Membership,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Group(GroupPayload { name, .. })
            | Self::User(UserPayload { name, .. })
            | Self::Membership(MembershipPayload { name, .. }) => name,
        }
    }
}

/// Users get a freshly generated password every time their payload is built.
impl From<&DesiredMember> for MemberPayload {
    fn from(member: &DesiredMember) -> Self {
        match member {
            DesiredMember::Group(spec) => Self::group(spec),
            DesiredMember::User(spec) => Self::user(spec, generate_password(USER_PASSWORD_LENGTH)),
            DesiredMember::Membership { group, user_id } => Self::membership(group, *user_id),
        }
    }
}
