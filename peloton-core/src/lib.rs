//! Peloton Core - Core library for Peloton project and templating automation
//!
//! This crate holds everything that does not talk to GitHub: configuration,
//! the item model, reconciliation planning between search results and the
//! project board, and template change detection.

pub mod config;
pub mod error;
pub mod fields;
pub mod git;
pub mod item;
pub mod reconcile;
pub mod search;
pub mod secrets;
pub mod templating;

pub use config::Config;
pub use error::{Error, Result};
pub use fields::{FieldKind, FieldUpdate, FieldValue, ProjectField, UpdateContext};
pub use git::GitRepo;
pub use item::{Activity, Actor, ItemKind, Membership, ProjectItem, Roster, TrackedItem};
pub use reconcile::{SyncMode, SyncPlan};
pub use secrets::Secrets;
