//! Operator logic for an Apache Ranger deployment.
//!
//! The heart of this crate is the user/group [`reconciler`]: given the desired directory state
//! declared in the `user-group-configuration` ([`config`]), it brings the users, groups and
//! memberships known to Ranger into agreement with it, one scope (consuming service) at a time.
//!
//! ## Pieces
//!
//! - [`client`] talks to the Ranger `xusers` REST API behind the [`client::DirectoryClient`] trait.
//! - [`retry`] wraps every API call in a bounded exponential backoff.
//! - [`id_mapping`] caches remote ids across passes, persisted through a [`state::StateStore`].
//! - [`relation`] pushes the desired state of a scope to the matching policy relations.
//! - [`handler`] ties it together for a single configuration or relation trigger.

pub mod cli;
pub mod client;
pub mod config;
pub mod constants;
pub mod handler;
pub mod id_mapping;
pub mod logging;
pub mod member;
pub mod reconciler;
pub mod relation;
pub mod retry;
pub mod settings;
pub mod state;
pub mod utils;
