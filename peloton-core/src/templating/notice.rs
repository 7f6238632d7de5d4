//! Issue and comment text for template notifications

use std::path::Path;

use url::Url;

use crate::config::TemplatingConfig;
use crate::templating::TargetRepo;
use crate::{Error, Result};

/// Marks comments posted on PRs that touch templated files
pub const TEMPLATED_FILES_MARKER: &str = "<!-- peloton:templated-files -->";

const GITHUB_WEB: &str = "https://github.com/";

/// Render a relative path with forward slashes
fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Web URL of a file on the configured branch
pub fn blob_url(config: &TemplatingConfig, repo: &str, path: &Path) -> Result<Url> {
    let mut url = Url::parse(GITHUB_WEB).map_err(|e| Error::Other(e.to_string()))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| Error::Other(format!("{} cannot be a base URL", GITHUB_WEB)))?;
        segments
            .pop_if_empty()
            .extend([config.org.as_str(), repo, "blob", config.branch.as_str()]);
        for component in path.components() {
            segments.push(&component.as_os_str().to_string_lossy());
        }
    }
    Ok(url)
}

fn markdown_link(config: &TemplatingConfig, repo: &str, path: &Path) -> Result<String> {
    Ok(format!(
        "[`{}`]({})",
        slash_path(path),
        blob_url(config, repo, path)?
    ))
}

/// Title of the issue raised when a template changes
///
/// The title is also the key used to avoid raising the same issue twice.
pub fn update_issue_title(template: &Path) -> String {
    let name = template
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| slash_path(template));
    format!("The Template for `{}` has been updated", name)
}

/// Body of the issue raised in one templatee repository
///
/// `template` is relative to the root of the template source repository.
pub fn update_issue_body(
    config: &TemplatingConfig,
    template: &Path,
    target: &TargetRepo,
    diff: &str,
) -> Result<String> {
    let file_link = markdown_link(config, &target.repo, &target.path_in_repo)?;
    let template_link = markdown_link(config, &config.source_repo, template)?;

    Ok(format!(
        "The template for {file_link} has been updated.\n\n\
         Consider adopting these changes into the repo; \
         the changes can be found below.\n\n\
         The template file can be found in the **{source}** repo: {template_link}\n\n\
         The diff between the specified file is as follows:\n\n\
         ```diff\n{diff}\n```",
        source = config.source_repo,
    ))
}

/// Comment for a PR that modifies templated files
///
/// `files` holds (template relative to the source repo root, path in repo).
pub fn templated_files_comment(config: &TemplatingConfig, files: &[(&Path, &Path)]) -> Result<String> {
    let mut body = String::new();
    body.push_str(TEMPLATED_FILES_MARKER);
    body.push('\n');
    body.push_str("This PR modifies files that are generated from shared templates:\n\n");

    for (template, path_in_repo) in files {
        body.push_str(&format!(
            "- `{}` (template: {})\n",
            slash_path(path_in_repo),
            markdown_link(config, &config.source_repo, template)?
        ));
    }

    body.push_str(&format!(
        "\nIf the change is useful beyond this repo, consider proposing it to \
         the template in the **{}** repo as well.\n",
        config.source_repo
    ));

    Ok(body)
}
