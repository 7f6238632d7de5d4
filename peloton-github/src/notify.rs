//! Raising issues in repositories whose templates have changed

use std::collections::HashMap;

use peloton_core::config::TemplatingConfig;
use peloton_core::templating::{update_issue_body, update_issue_title, ChangedTemplate};
use tracing::{info, warn};

use crate::client::IssueTracker;
use crate::Result;

/// Outcome of notifying templatee repositories
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotifyReport {
    /// (repo, issue number) of every issue created
    pub created: Vec<(String, u64)>,
    /// (repo, title) of issues already open
    pub skipped: Vec<(String, String)>,
    /// (repo, title) of issues a dry run would have created
    pub planned: Vec<(String, String)>,
    /// Failures; one failing repository does not stop the rest
    pub errors: Vec<String>,
}

/// Per-repository state, fetched once per run
struct RepoState {
    open_titles: Vec<String>,
    labels: Vec<String>,
}

/// Raise an issue in every repository adopting a changed template
///
/// An issue is skipped when an open issue with the same title already
/// exists. The configured labels are applied only when the repository
/// defines all of them.
pub async fn notify_template_updates(
    tracker: &dyn IssueTracker,
    config: &TemplatingConfig,
    changed: &[ChangedTemplate],
    dry_run: bool,
) -> Result<NotifyReport> {
    let mut report = NotifyReport::default();
    let mut repos: HashMap<String, RepoState> = HashMap::new();

    for template in changed {
        let title = update_issue_title(&template.template);

        for target in &template.targets {
            let repo = target.repo.as_str();

            if !repos.contains_key(repo) {
                match repo_state(tracker, repo, config).await {
                    Ok(state) => {
                        repos.insert(repo.to_string(), state);
                    }
                    Err(e) => {
                        warn!(repo, error = %e, "Failed to read repository");
                        report.errors.push(format!("{}: {}", repo, e));
                        continue;
                    }
                }
            }
            let Some(state) = repos.get_mut(repo) else {
                continue;
            };

            if state.open_titles.contains(&title) {
                info!(repo, title = %title, "Issue already open, skipping");
                report.skipped.push((repo.to_string(), title.clone()));
                continue;
            }

            if dry_run {
                info!(repo, title = %title, "[DRY RUN] Would create issue");
                state.open_titles.push(title.clone());
                report.planned.push((repo.to_string(), title.clone()));
                continue;
            }

            let body = update_issue_body(config, &template.source_path, target, &template.diff)?;
            match tracker
                .create_issue(repo, &title, &body, &state.labels)
                .await
            {
                Ok(number) => {
                    info!(repo, number, title = %title, "Created issue");
                    state.open_titles.push(title.clone());
                    report.created.push((repo.to_string(), number));
                }
                Err(e) => {
                    warn!(repo, title = %title, error = %e, "Failed to create issue");
                    report
                        .errors
                        .push(format!("Failed to create '{}' in {}: {}", title, repo, e));
                }
            }
        }
    }

    Ok(report)
}

async fn repo_state(
    tracker: &dyn IssueTracker,
    repo: &str,
    config: &TemplatingConfig,
) -> Result<RepoState> {
    let open_titles = tracker.open_issue_titles(repo).await?;

    let labels = if config.labels.is_empty() {
        Vec::new()
    } else {
        let existing = tracker.label_names(repo).await?;
        let missing: Vec<&str> = config
            .labels
            .iter()
            .filter(|l| !existing.contains(l))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            config.labels.clone()
        } else {
            warn!(repo, missing = %missing.join(", "), "Labels not defined, creating issues unlabelled");
            Vec::new()
        }
    };

    Ok(RepoState {
        open_titles,
        labels,
    })
}
