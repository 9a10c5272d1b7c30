//! Access to the Ranger `xusers` directory API.
//!
//! The [`DirectoryClient`] trait is the seam the reconciler works against. [`RangerClient`] is
//! the HTTP implementation used in production.
use async_trait::async_trait;
use snafu::Snafu;

use crate::member::{ExistingMember, MemberKind};

mod http;
mod payload;

#[cfg(test)]
pub(crate) mod fake;

pub use http::*;
pub use payload::*;

/// A failure to talk to Ranger at all. These are retried.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TransportError {
    #[snafu(display("failed to send request to {url}"))]
    SendRequest { url: String, source: reqwest::Error },

    #[snafu(display("failed to read response body from {url}"))]
    ReadResponse { url: String, source: reqwest::Error },

    #[snafu(display("failed to decode response from {url}"))]
    DecodeResponse {
        url: String,
        source: serde_json::Error,
    },

    #[snafu(display("{url} responded with unexpected status {status}"))]
    UnexpectedStatus { url: String, status: u16 },
}

/// Result of a create call which reached Ranger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The member was created, carrying the record Ranger returned.
    Created(ExistingMember),

    /// Ranger refused the member, e.g. because it conflicts with an existing one.
    Rejected { status: u16 },
}

/// Result of a delete call which reached Ranger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Rejected { status: u16 },
}

/// List, create and delete directory members of each [`MemberKind`].
///
/// Implementations return [`TransportError`] only if Ranger could not be reached or its answer
/// could not be understood. A refusal by Ranger is a regular outcome.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    async fn list(&self, kind: MemberKind) -> Result<Vec<ExistingMember>, TransportError>;

    async fn create(&self, payload: &MemberPayload) -> Result<CreateOutcome, TransportError>;

    async fn delete(&self, kind: MemberKind, id: i64) -> Result<DeleteOutcome, TransportError>;
}
