//! Configuration management for Peloton tooling
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (PELOTON_*)
//! 3. Config file (~/.config/peloton/config.toml)
//! 4. Default values
//!
//! The defaults describe the SciTools Peloton board, so an empty config file
//! is a working config.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::item::Column;
use crate::{Error, Result};

/// GitHub endpoint settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// GraphQL endpoint
    pub graphql_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            graphql_url: "https://api.github.com/graphql".to_string(),
        }
    }
}

/// One project field that is populated from a tracked item column
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FieldMapping {
    /// Node ID of the project field
    pub field: String,
    /// Item attribute written into the field
    pub column: Column,
}

impl FieldMapping {
    fn new(field: &str, column: Column) -> Self {
        Self {
            field: field.to_string(),
            column,
        }
    }
}

/// Names of the project fields read back from existing board items
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ItemFieldNames {
    pub linked_id: String,
    pub date_updated: String,
    pub final_comment_time: String,
    pub num_comments: String,
}

impl Default for ItemFieldNames {
    fn default() -> Self {
        Self {
            linked_id: "_linked_id".to_string(),
            date_updated: "Date Updated".to_string(),
            final_comment_time: "Final Comment Time".to_string(),
            num_comments: "Num Comments".to_string(),
        }
    }
}

/// The GitHub Projects-v2 board being populated
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Node ID of the project
    pub id: String,

    /// Text field holding the node ID of the issue/PR/discussion an item
    /// stands for. Shared by linked items and drafts.
    pub link_field: String,

    /// Date field cleared whenever an item gets new comments, so that it is
    /// revisited at the next meeting
    pub next_peloton_date_field: String,

    /// Fields populated on every update
    pub field_map: Vec<FieldMapping>,

    /// Field names used when reading the board
    pub item_field_names: ItemFieldNames,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            id: "PVT_kwDOABU7f84ALhAI".to_string(),
            link_field: "PVTF_lADOABU7f84ALhAIzgPKqWg".to_string(),
            next_peloton_date_field: "PVTF_lADOABU7f84ALhAIzgP3vFs".to_string(),
            field_map: vec![
                FieldMapping::new("PVTF_lADOABU7f84ALhAIzgHV-jI", Column::CreatedAt),
                FieldMapping::new("PVTF_lADOABU7f84ALhAIzgHV_kc", Column::FinalCommentLogin),
                FieldMapping::new("PVTF_lADOABU7f84ALhAIzgHV_lI", Column::FinalCommentTime),
                FieldMapping::new("PVTF_lADOABU7f84ALhAIzgLbMPM", Column::TotalComments),
                FieldMapping::new("PVTF_lADOABU7f84ALhAIzgLbMRM", Column::UpdatedAt),
                FieldMapping::new("PVTF_lADOABU7f84ALhAIzgLbMTQ", Column::ClosedAt),
                FieldMapping::new("PVTF_lADOABU7f84ALhAIzgLbMn8", Column::AuthorLogin),
                FieldMapping::new("PVTF_lADOABU7f84ALhAIzgLbM0k", Column::Votes),
                FieldMapping::new("PVTSSF_lADOABU7f84ALhAIzgLbNmc", Column::AuthorMembership),
                FieldMapping::new("PVTSSF_lADOABU7f84ALhAIzgLbNsM", Column::CommenterMembership),
                FieldMapping::new("PVTSSF_lADOABU7f84ALhAIzgLlAMk", Column::DiscussionWanted),
            ],
            item_field_names: ItemFieldNames::default(),
        }
    }
}

/// What to search for
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchConfig {
    /// GitHub search qualifiers; `-` negates the qualifier that follows it
    pub conditions: String,

    /// Closed items stay on the board for this many days
    pub closed_window_days: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            conditions: "org:SciTools org:SciTools-incubator org:SciTools-classroom \
                         -repo:SciTools/cartopy \
                         repo:bjlittle/geovista repo:pp-mo/ncdata repo:pp-mo/ugrid-checks"
                .to_string(),
            closed_window_days: 28,
        }
    }
}

/// Who counts as Peloton, and who counts as a bot
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TeamConfig {
    /// Organization owning the team
    pub org: String,
    /// Team slug
    pub slug: String,
    /// Logins treated as members without being in the GitHub team
    pub extra_logins: Vec<String>,
    /// Logins always treated as bots, whatever GitHub reports
    pub bot_overrides: Vec<String>,
}

impl Default for TeamConfig {
    fn default() -> Self {
        Self {
            org: "SciTools".to_string(),
            slug: "Peloton".to_string(),
            extra_logins: vec!["rcomer".to_string()],
            bot_overrides: vec!["CLAassistant".to_string(), "codecov-commenter".to_string()],
        }
    }
}

/// Pacing of queries, mutations and the update loop
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Page size for paginated queries (GitHub maximum is 100)
    pub query_page_size: u32,

    /// Operations per mutation document
    pub mutation_page_size: usize,

    /// Attempts per mutation document before giving up
    pub retry_attempts: u32,

    /// Wait between failed attempts
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,

    /// Wait between mutation documents
    #[serde(with = "humantime_serde")]
    pub mutation_pause: Duration,

    /// Wait between incremental update loops
    #[serde(with = "humantime_serde")]
    pub loop_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            query_page_size: 100,
            mutation_page_size: 20,
            retry_attempts: 5,
            retry_delay: Duration::from_secs(5),
            mutation_pause: Duration::from_secs(5),
            loop_interval: Duration::from_secs(60),
        }
    }
}

/// Option IDs of the board's single-select fields
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SelectionIds {
    pub author_peloton: String,
    pub author_external: String,
    pub author_bot: String,
    pub commenter_peloton: String,
    pub commenter_external: String,
    pub commenter_bot: String,
    pub discussion_wanted: String,
}

impl Default for SelectionIds {
    fn default() -> Self {
        Self {
            author_peloton: "389ebec0".to_string(),
            author_external: "d961b9b7".to_string(),
            author_bot: "8fbf3584".to_string(),
            commenter_peloton: "98462be7".to_string(),
            commenter_external: "235b3d90".to_string(),
            commenter_bot: "54adc7eb".to_string(),
            discussion_wanted: "e17f4b18".to_string(),
        }
    }
}

/// Cross-repository file templating
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TemplatingConfig {
    /// Organization owning both the template source and the templatee repos
    pub org: String,
    /// Repository holding the canonical templates
    pub source_repo: String,
    /// Branch used when linking to files
    pub branch: String,
    /// Labels applied to notification issues when the target repo has them all
    pub labels: Vec<String>,
    /// Templates directory, relative to the source repository root
    pub templates_dir: PathBuf,
}

impl Default for TemplatingConfig {
    fn default() -> Self {
        Self {
            org: "SciTools".to_string(),
            source_repo: ".github".to_string(),
            branch: "main".to_string(),
            labels: vec!["Bot".to_string(), "Type: Infrastructure".to_string()],
            templates_dir: PathBuf::from("templates"),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub github: GitHubConfig,
    pub project: ProjectConfig,
    pub search: SearchConfig,
    pub team: TeamConfig,
    pub sync: SyncConfig,
    pub selections: SelectionIds,
    pub templating: TemplatingConfig,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/peloton/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("peloton").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - PELOTON_PROJECT_ID: Project node ID
    /// - PELOTON_SEARCH_CONDITIONS: Search qualifiers
    /// - PELOTON_GRAPHQL_URL: GraphQL endpoint
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(id) = std::env::var("PELOTON_PROJECT_ID") {
            self.project.id = id;
        }

        if let Ok(conditions) = std::env::var("PELOTON_SEARCH_CONDITIONS") {
            self.search.conditions = conditions;
        }

        if let Ok(url) = std::env::var("PELOTON_GRAPHQL_URL") {
            self.github.graphql_url = url;
        }

        self
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(
        mut self,
        project_id: Option<String>,
        templates_dir: Option<PathBuf>,
    ) -> Self {
        if let Some(id) = project_id {
            self.project.id = id;
        }

        if let Some(dir) = templates_dir {
            self.templating.templates_dir = dir;
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(
        config_path: Option<&Path>,
        project_id: Option<String>,
        templates_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let base = match config_path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load()?,
        };
        Ok(base
            .with_env_overrides()
            .with_cli_overrides(project_id, templates_dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.project.id, "PVT_kwDOABU7f84ALhAI");
        assert_eq!(config.project.field_map.len(), 11);
        assert_eq!(config.sync.mutation_page_size, 20);
        assert_eq!(config.sync.loop_interval, Duration::from_secs(60));
        assert_eq!(config.team.extra_logins, vec!["rcomer".to_string()]);
    }

    #[test]
    fn test_cli_overrides() {
        let config = Config::default()
            .with_cli_overrides(Some("PVT_other".to_string()), Some(PathBuf::from("tpl")));

        assert_eq!(config.project.id, "PVT_other");
        assert_eq!(config.templating.templates_dir, PathBuf::from("tpl"));
    }

    #[test]
    fn test_partial_toml() {
        let toml = r#"
[sync]
loop_interval = "2m"
retry_attempts = 3

[team]
slug = "reviewers"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.sync.loop_interval, Duration::from_secs(120));
        assert_eq!(config.sync.retry_attempts, 3);
        // Untouched values keep their defaults
        assert_eq!(config.sync.mutation_page_size, 20);
        assert_eq!(config.team.slug, "reviewers");
        assert_eq!(config.team.org, "SciTools");
    }

    #[test]
    fn test_field_map_toml() {
        let toml = r#"
[project]
id = "PVT_x"
field_map = [
    { field = "F1", column = "created_at" },
    { field = "F2", column = "discussion_wanted" },
]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.project.field_map.len(), 2);
        let discussion = &config.project.field_map[1];
        assert_eq!(discussion.column, Column::DiscussionWanted);
        assert_eq!(discussion.field, "F2");
        assert!(config.project.field_map.iter().all(|m| m.column != Column::Votes));
        assert_eq!(config.project.link_field, "PVTF_lADOABU7f84ALhAIzgPKqWg");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[search]\nclosed_window_days = 7\n").unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.search.closed_window_days, 7);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sync\n").unwrap();

        let err = Config::load_from_file(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
