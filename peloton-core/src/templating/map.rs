//! The template-to-repository map in `_templating_config.json`
//!
//! ```json
//! {
//!   "benchmarks/asv_delegated.py": {
//!     "iris": "benchmarks/asv_delegated.py",
//!     "iris-grib": "benchmarks/asv_delegated.py"
//!   }
//! }
//! ```
//!
//! Keys are template paths relative to the templates directory; each maps a
//! repository name (within the templating org) to the templated file's path
//! in that repository.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::{Error, Result};

/// File name of the map, inside the templates directory
pub const MAP_FILE_NAME: &str = "_templating_config.json";

/// A repository that carries a copy of a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetRepo {
    pub repo: String,
    pub path_in_repo: PathBuf,
}

/// Templates and the repositories that adopt them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateMap {
    templates: BTreeMap<PathBuf, Vec<TargetRepo>>,
}

/// Disagreements between the map and the templates directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// Configured templates with no file in the templates directory
    pub missing_templates: Vec<PathBuf>,
    /// Template files that no repository is configured to adopt
    pub unconfigured_files: Vec<PathBuf>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.missing_templates.is_empty() && self.unconfigured_files.is_empty()
    }
}

impl TemplateMap {
    /// Parse the map without touching the filesystem
    pub fn parse(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, BTreeMap<String, String>> = serde_json::from_str(json)?;

        let templates = raw
            .into_iter()
            .map(|(template, repos)| {
                let targets = repos
                    .into_iter()
                    .map(|(repo, path)| TargetRepo {
                        repo,
                        path_in_repo: PathBuf::from(path),
                    })
                    .collect();
                (PathBuf::from(template), targets)
            })
            .collect();

        Ok(Self { templates })
    }

    /// Read the map from a templates directory without validating it
    pub fn read(templates_dir: &Path) -> Result<Self> {
        let path = templates_dir.join(MAP_FILE_NAME);
        let json = std::fs::read_to_string(&path).map_err(|e| {
            Error::Templating(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&json)
    }

    /// Read the map and require every configured template to exist
    pub fn load(templates_dir: &Path) -> Result<Self> {
        let map = Self::read(templates_dir)?;

        for template in map.templates.keys() {
            if !templates_dir.join(template).is_file() {
                return Err(Error::Templating(format!(
                    "Configured template {} does not exist in {}",
                    template.display(),
                    templates_dir.display()
                )));
            }
        }

        debug!(templates = map.templates.len(), "Loaded templating map");
        Ok(map)
    }

    /// Repositories adopting a template (path relative to the templates dir)
    pub fn targets(&self, template: &Path) -> Option<&[TargetRepo]> {
        self.templates.get(template).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Templated files of one repository, as (template, path in repo)
    pub fn files_in_repo(&self, repo: &str) -> Vec<(&Path, &Path)> {
        self.templates
            .iter()
            .flat_map(|(template, targets)| {
                targets
                    .iter()
                    .filter(move |t| t.repo == repo)
                    .map(move |t| (template.as_path(), t.path_in_repo.as_path()))
            })
            .collect()
    }

    /// Compare the map with the files actually in the templates directory
    ///
    /// Files and directories starting with `_` are tooling, not templates.
    /// Dotfiles are templates like any other; only `.git` is skipped.
    pub fn check(&self, templates_dir: &Path) -> Result<CheckReport> {
        let mut on_disk = BTreeSet::new();
        collect_template_files(templates_dir, Path::new(""), &mut on_disk)?;

        let configured: BTreeSet<&PathBuf> = self.templates.keys().collect();

        Ok(CheckReport {
            missing_templates: configured
                .iter()
                .filter(|t| !on_disk.contains(**t))
                .map(|t| (*t).clone())
                .collect(),
            unconfigured_files: on_disk
                .iter()
                .filter(|f| !configured.contains(f))
                .cloned()
                .collect(),
        })
    }
}

fn collect_template_files(root: &Path, rel: &Path, found: &mut BTreeSet<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(root.join(rel))? {
        let entry = entry?;
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if name_str.starts_with('_') || name_str == ".git" {
            continue;
        }

        let rel_path = rel.join(&name);
        if entry.file_type()?.is_dir() {
            collect_template_files(root, &rel_path, found)?;
        } else {
            found.insert(rel_path);
        }
    }
    Ok(())
}
