//! Flagging pull requests that edit templated files

use std::path::{Path, PathBuf};

use peloton_core::config::TemplatingConfig;
use peloton_core::templating::{templated_files_comment, TemplateMap, TEMPLATED_FILES_MARKER};
use tracing::{debug, info};

use crate::client::IssueTracker;
use crate::Result;

/// What flagging a pull request did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagOutcome {
    /// The PR touches no templated files
    NothingTemplated,
    /// A flagging comment is already on the PR
    AlreadyFlagged,
    /// A comment was posted naming these files
    Commented(Vec<PathBuf>),
}

/// Comment on a pull request that modifies files generated from templates
///
/// The comment carries a marker so that the PR is only flagged once.
pub async fn flag_templated_files(
    tracker: &dyn IssueTracker,
    config: &TemplatingConfig,
    map: &TemplateMap,
    repo: &str,
    pr: u64,
) -> Result<FlagOutcome> {
    let changed = tracker.pull_request_files(repo, pr).await?;

    let touched: Vec<(PathBuf, &Path)> = map
        .files_in_repo(repo)
        .into_iter()
        .filter(|(_, path_in_repo)| changed.iter().any(|c| Path::new(c) == *path_in_repo))
        .map(|(template, path_in_repo)| (config.templates_dir.join(template), path_in_repo))
        .collect();

    if touched.is_empty() {
        debug!(repo, pr, "No templated files touched");
        return Ok(FlagOutcome::NothingTemplated);
    }

    let comments = tracker.comment_bodies(repo, pr).await?;
    if comments.iter().any(|c| c.contains(TEMPLATED_FILES_MARKER)) {
        info!(repo, pr, "Pull request already flagged");
        return Ok(FlagOutcome::AlreadyFlagged);
    }

    let files: Vec<(&Path, &Path)> = touched
        .iter()
        .map(|(template, path_in_repo)| (template.as_path(), *path_in_repo))
        .collect();
    let body = templated_files_comment(config, &files)?;
    tracker.create_comment(repo, pr, &body).await?;

    info!(repo, pr, count = files.len(), "Flagged templated files");
    Ok(FlagOutcome::Commented(
        touched.iter().map(|(_, p)| p.to_path_buf()).collect(),
    ))
}
