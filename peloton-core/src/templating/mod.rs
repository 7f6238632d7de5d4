//! Cross-repository file templating
//!
//! Canonical templates live in one repository; other repositories adopt
//! copies of them. When a template changes, each adopting repository is told
//! about it through an issue.

mod map;
mod notice;

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::git::GitRepo;
use crate::Result;

pub use map::{CheckReport, TargetRepo, TemplateMap, MAP_FILE_NAME};
pub use notice::{
    blob_url, templated_files_comment, update_issue_body, update_issue_title,
    TEMPLATED_FILES_MARKER,
};

/// A template changed by the last commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedTemplate {
    /// Path relative to the templates directory (the map key)
    pub template: PathBuf,
    /// Path relative to the repository root
    pub source_path: PathBuf,
    /// Unified diff of the change
    pub diff: String,
    pub targets: Vec<TargetRepo>,
}

/// Templates touched by the last commit, with their diffs
///
/// `templates_dir` is relative to the repository root. Changed files in the
/// templates directory that the map does not know about are skipped.
pub fn changed_templates(
    git: &GitRepo,
    templates_dir: &Path,
    map: &TemplateMap,
) -> Result<Vec<ChangedTemplate>> {
    let mut changed = Vec::new();

    for file in git.changed_files()? {
        let Ok(template) = file.strip_prefix(templates_dir) else {
            continue;
        };

        let Some(targets) = map.targets(template) else {
            debug!(file = %file.display(), "Changed file is not a configured template");
            continue;
        };

        changed.push(ChangedTemplate {
            template: template.to_path_buf(),
            diff: git.file_diff(&file)?,
            source_path: file.clone(),
            targets: targets.to_vec(),
        });
    }

    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::commit_file;
    use git2::Repository;

    #[test]
    fn test_changed_templates_from_last_commit() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        commit_file(
            &repo,
            "templates/_templating_config.json",
            r#"{"a.txt": {"iris": "docs/a.txt"}, "b.txt": {"tephi": "b.txt"}}"#,
        );
        commit_file(&repo, "templates/a.txt", "first\n");
        commit_file(&repo, "templates/b.txt", "b\n");
        commit_file(&repo, "templates/a.txt", "second\n");

        let git = GitRepo::open(dir.path()).unwrap();
        let map = TemplateMap::load(&git.root().join("templates")).unwrap();
        let changed = changed_templates(&git, Path::new("templates"), &map).unwrap();

        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].template, PathBuf::from("a.txt"));
        assert_eq!(changed[0].source_path, PathBuf::from("templates/a.txt"));
        assert_eq!(changed[0].targets[0].repo, "iris");
        assert!(changed[0].diff.contains("-first"));
        assert!(changed[0].diff.contains("+second"));
    }

    #[test]
    fn test_unmapped_and_outside_files_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        commit_file(&repo, "templates/_templating_config.json", "{}");
        commit_file(&repo, "templates/_templating_config.json", r#"{"x.txt": {}}"#);

        let git = GitRepo::open(dir.path()).unwrap();
        let map = TemplateMap::read(&git.root().join("templates")).unwrap();
        assert!(changed_templates(&git, Path::new("templates"), &map)
            .unwrap()
            .is_empty());
    }
}
