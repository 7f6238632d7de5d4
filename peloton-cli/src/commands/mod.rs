//! CLI command implementations

pub mod project;
pub mod sync;
pub mod templates;

pub use project::ProjectArgs;
pub use sync::SyncArgs;
pub use templates::TemplatesArgs;

use std::sync::Arc;

use peloton_core::{Config, Secrets};
use peloton_github::{GraphQLClient, HttpTransport};

/// Resolve the GitHub token: flag, then environment, then secrets file
pub fn github_token(bearer_token: Option<&str>) -> anyhow::Result<String> {
    if let Some(token) = bearer_token.filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }

    let secrets = Secrets::load()?;
    secrets.resolve_token(None).ok_or_else(|| {
        anyhow::anyhow!(
            "GitHub token not found. Pass --bearer-token, set GH_TOKEN or GITHUB_TOKEN, \
             or add token to ~/.config/peloton/secrets.toml"
        )
    })
}

/// GraphQL client for the configured endpoint
pub fn graphql_client(config: &Config, bearer_token: Option<&str>) -> anyhow::Result<GraphQLClient> {
    let token = github_token(bearer_token)?;
    let transport = HttpTransport::new(config.github.graphql_url.clone(), token);
    Ok(GraphQLClient::new(
        Arc::new(transport),
        config.sync.query_page_size,
    ))
}
