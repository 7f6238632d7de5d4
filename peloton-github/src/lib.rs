//! Peloton GitHub - GitHub integration for Peloton tooling
//!
//! This crate talks to GitHub: the GraphQL API for the Projects v2 board
//! sync, and the REST API for template update issues and PR comments.

mod client;
mod error;
pub mod graphql;
pub mod mutations;
pub mod notify;
pub mod queries;
pub mod review;
pub mod sync;

pub use client::{parse_github_url, GitHubClient, IssueTracker};
pub use error::{Error, Result};
pub use graphql::{GraphQLClient, GraphQLTransport, HttpTransport};
pub use mutations::{Mutation, MutationRunner};
pub use notify::{notify_template_updates, NotifyReport};
pub use review::{flag_templated_files, FlagOutcome};
pub use sync::{PassReport, ProjectSync};
