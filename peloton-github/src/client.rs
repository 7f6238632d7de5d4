//! GitHub REST client using octocrab

use async_trait::async_trait;
use octocrab::Octocrab;
use tracing::{debug, info};

use crate::{Error, Result};

/// REST operations needed by template notifications and PR flagging
///
/// Repositories are named without their owner; the owner is fixed per
/// implementation.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Titles of open issues (pull requests excluded)
    async fn open_issue_titles(&self, repo: &str) -> Result<Vec<String>>;

    /// Names of every label defined in the repository
    async fn label_names(&self, repo: &str) -> Result<Vec<String>>;

    /// Create an issue, returning its number
    async fn create_issue(&self, repo: &str, title: &str, body: &str, labels: &[String])
        -> Result<u64>;

    /// Paths of the files a pull request touches
    async fn pull_request_files(&self, repo: &str, number: u64) -> Result<Vec<String>>;

    /// Bodies of the conversation comments on an issue or pull request
    async fn comment_bodies(&self, repo: &str, number: u64) -> Result<Vec<String>>;

    async fn create_comment(&self, repo: &str, number: u64, body: &str) -> Result<()>;
}

/// GitHub API client for one organisation's repositories
pub struct GitHubClient {
    client: Octocrab,
    owner: String,
}

impl GitHubClient {
    /// Create a client for repositories owned by `owner`
    pub fn new(owner: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let owner = owner.into();

        let client = Octocrab::builder()
            .personal_token(token.into())
            .build()
            .map_err(|e| Error::Auth(format!("Failed to create GitHub client: {}", e)))?;

        info!(owner = %owner, "Created GitHub client");

        Ok(Self { client, owner })
    }

    /// Get the repository owner
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

fn api_error(repo: &str, e: octocrab::Error) -> Error {
    match e {
        octocrab::Error::GitHub { source, .. } if source.message.contains("Not Found") => {
            Error::Other(format!("Repository {} not found or not accessible", repo))
        }
        octocrab::Error::GitHub { source, .. } if source.message.contains("Bad credentials") => {
            Error::Auth("Invalid GitHub token".to_string())
        }
        other => Error::Api(other),
    }
}

#[async_trait]
impl IssueTracker for GitHubClient {
    async fn open_issue_titles(&self, repo: &str) -> Result<Vec<String>> {
        debug!(repo, "Listing open issues");

        let page = self
            .client
            .issues(&self.owner, repo)
            .list()
            .state(octocrab::params::State::Open)
            .per_page(100)
            .send()
            .await
            .map_err(|e| api_error(repo, e))?;
        let issues = self
            .client
            .all_pages(page)
            .await
            .map_err(|e| api_error(repo, e))?;

        Ok(issues
            .into_iter()
            .filter(|i| i.pull_request.is_none())
            .map(|i| i.title)
            .collect())
    }

    async fn label_names(&self, repo: &str) -> Result<Vec<String>> {
        debug!(repo, "Listing labels");

        let page = self
            .client
            .issues(&self.owner, repo)
            .list_labels_for_repo()
            .per_page(100)
            .send()
            .await
            .map_err(|e| api_error(repo, e))?;
        let labels = self
            .client
            .all_pages(page)
            .await
            .map_err(|e| api_error(repo, e))?;

        Ok(labels.into_iter().map(|l| l.name).collect())
    }

    async fn create_issue(
        &self,
        repo: &str,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<u64> {
        debug!(repo, title, "Creating issue");

        let issue = self
            .client
            .issues(&self.owner, repo)
            .create(title)
            .body(body)
            .labels(labels.to_vec())
            .send()
            .await
            .map_err(|e| api_error(repo, e))?;

        Ok(issue.number)
    }

    async fn pull_request_files(&self, repo: &str, number: u64) -> Result<Vec<String>> {
        debug!(repo, number, "Listing pull request files");

        let page = self
            .client
            .pulls(&self.owner, repo)
            .list_files(number)
            .await
            .map_err(|e| api_error(repo, e))?;
        let files = self
            .client
            .all_pages(page)
            .await
            .map_err(|e| api_error(repo, e))?;

        Ok(files.into_iter().map(|f| f.filename).collect())
    }

    async fn comment_bodies(&self, repo: &str, number: u64) -> Result<Vec<String>> {
        debug!(repo, number, "Listing comments");

        let page = self
            .client
            .issues(&self.owner, repo)
            .list_comments(number)
            .per_page(100)
            .send()
            .await
            .map_err(|e| api_error(repo, e))?;
        let comments = self
            .client
            .all_pages(page)
            .await
            .map_err(|e| api_error(repo, e))?;

        Ok(comments.into_iter().filter_map(|c| c.body).collect())
    }

    async fn create_comment(&self, repo: &str, number: u64, body: &str) -> Result<()> {
        debug!(repo, number, "Creating comment");

        self.client
            .issues(&self.owner, repo)
            .create_comment(number, body)
            .await
            .map_err(|e| api_error(repo, e))?;

        Ok(())
    }
}

/// Parse a repository reference into owner and repo
///
/// Supports formats:
/// - owner/repo
/// - https://github.com/owner/repo
/// - git@github.com:owner/repo.git
pub fn parse_github_url(url: &str) -> Result<(String, String)> {
    if !url.contains(':') && !url.contains('/') {
        return Err(Error::Parse(format!(
            "Invalid repository format: {}. Expected owner/repo",
            url
        )));
    }

    if !url.contains("://") && !url.contains('@') {
        let parts: Vec<&str> = url.split('/').collect();
        if parts.len() == 2 && parts.iter().all(|p| !p.is_empty()) {
            return Ok((
                parts[0].to_string(),
                parts[1].trim_end_matches(".git").to_string(),
            ));
        }
        return Err(Error::Parse(format!(
            "Invalid repository format: {}. Expected owner/repo",
            url
        )));
    }

    if url.starts_with("https://") || url.starts_with("http://") {
        let url = url::Url::parse(url).map_err(|e| Error::Parse(e.to_string()))?;
        let path = url.path().trim_start_matches('/').trim_end_matches(".git");
        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() >= 2 {
            return Ok((parts[0].to_string(), parts[1].to_string()));
        }
        return Err(Error::Parse(format!("Invalid GitHub URL path: {}", path)));
    }

    if url.starts_with("git@") {
        if let Some(path) = url.split(':').nth(1) {
            let path = path.trim_end_matches(".git");
            let parts: Vec<&str> = path.split('/').collect();
            if parts.len() >= 2 {
                return Ok((parts[0].to_string(), parts[1].to_string()));
            }
        }
        return Err(Error::Parse(format!("Invalid SSH URL: {}", url)));
    }

    Err(Error::Parse(format!("Unrecognized URL format: {}", url)))
}
