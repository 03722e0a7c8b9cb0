//! # Nameward
//!
//! A username and identity claim service, usable both as a standalone binary
//! and as a library.
//!
//! Handles are unique case-insensitively across accounts, staged pending
//! identities and the holds left behind by renames.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! nameward = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use nameward::config::IdentityConfig;
//! use nameward::identity::{IdentityService, SessionOnlyProvider};
//! use nameward::server::{AppState, create_router};
//! use nameward::store::SqliteStore;
//!
//! let store = SqliteStore::new(&PathBuf::from("./data/nameward.db")).unwrap();
//! store.initialize().unwrap();
//!
//! let identity = Arc::new(IdentityService::new(
//!     Arc::new(store),
//!     Arc::new(SessionOnlyProvider),
//!     IdentityConfig::default(),
//! ));
//! let router = create_router(Arc::new(AppState::new(identity, PathBuf::from("./data"))));
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `nameward` binary. Disable with `default-features = false`.

pub mod auth;
pub mod config;
pub mod error;
pub mod identity;
pub mod scheduler;
pub mod server;
pub mod store;
pub mod types;
