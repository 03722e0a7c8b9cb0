//! Username and identity claims.
//!
//! Accounts, pending identities and holds share one handle namespace. Every
//! write path goes through [`claim`] or the exact-assignment path in [`holds`],
//! which check all three collections inside the caller's transaction.

pub mod claim;
pub mod cleanup;
pub mod holds;
pub mod normalize;
pub mod pending;
pub mod provider;
mod service;

pub use cleanup::{CleanupJob, CronRegistration};
pub use pending::{AutoclaimFailure, AutoclaimOutcome, FinalizeIdentity, StagePendingIdentity};
pub use provider::{HttpIdentityProvider, IdentityProvider, ProviderUser, SessionOnlyProvider};
pub use service::IdentityService;
