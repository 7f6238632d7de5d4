//! Template commands - notify templatee repos and police their PRs

use std::path::PathBuf;

use clap::{Args, Subcommand};
use peloton_core::templating::{changed_templates, TemplateMap};
use peloton_core::{Config, GitRepo};
use peloton_github::{
    flag_templated_files, notify_template_updates, parse_github_url, FlagOutcome, GitHubClient,
};

use super::github_token;

/// Cross-repository template management
#[derive(Args, Debug)]
pub struct TemplatesArgs {
    /// Checkout of the repository holding the templates
    #[arg(long, default_value = ".", global = true)]
    pub repo_root: PathBuf,

    #[command(subcommand)]
    pub command: TemplatesCommand,
}

#[derive(Subcommand, Debug)]
pub enum TemplatesCommand {
    /// Raise issues in repositories whose templates changed in the last commit
    NotifyUpdates {
        /// Show the issues that would be created without creating them
        #[arg(long)]
        dry_run: bool,
    },

    /// Check the template map against the templates directory
    Check,

    /// Comment on a pull request that modifies templated files
    FlagPr {
        /// Repository of the pull request (repo, owner/repo or URL)
        #[arg(long)]
        repo: String,

        /// Pull request number
        #[arg(long)]
        pr: u64,
    },
}

impl TemplatesArgs {
    /// Execute the templates command
    pub async fn execute(&self, config: &Config, bearer_token: Option<&str>) -> anyhow::Result<()> {
        let templates_dir = self.repo_root.join(&config.templating.templates_dir);

        match &self.command {
            TemplatesCommand::NotifyUpdates { dry_run } => {
                if !GitRepo::is_git_repo(&self.repo_root) {
                    anyhow::bail!("{} is not a git repository", self.repo_root.display());
                }
                let git = GitRepo::open(&self.repo_root)?;
                let map = TemplateMap::load(&git.root().join(&config.templating.templates_dir))?;
                let changed = changed_templates(&git, &config.templating.templates_dir, &map)?;

                if changed.is_empty() {
                    println!("No templates changed in the last commit.");
                    return Ok(());
                }

                let client =
                    GitHubClient::new(config.templating.org.clone(), github_token(bearer_token)?)?;
                let report = notify_template_updates(&client, &config.templating, &changed, *dry_run)
                    .await?;

                for (repo, number) in &report.created {
                    println!("Created {}/{}#{}", client.owner(), repo, number);
                }
                for (repo, title) in &report.skipped {
                    println!("Skipped {} (already open: {})", repo, title);
                }
                for (repo, title) in &report.planned {
                    println!("[Dry run] Would create in {}: {}", repo, title);
                }
                if !report.errors.is_empty() {
                    for error in &report.errors {
                        eprintln!("Error: {}", error);
                    }
                    anyhow::bail!("{} notification(s) failed", report.errors.len());
                }
            }
            TemplatesCommand::Check => {
                let map = TemplateMap::read(&templates_dir)?;
                let report = map.check(&templates_dir)?;

                println!("{} configured template(s)", map.len());
                for missing in &report.missing_templates {
                    println!("  missing: {}", missing.display());
                }
                for file in &report.unconfigured_files {
                    println!("  not configured: {}", file.display());
                }
                if !report.is_clean() {
                    anyhow::bail!("Template map does not match {}", templates_dir.display());
                }
                println!("Template map is consistent.");
            }
            TemplatesCommand::FlagPr { repo, pr } => {
                let (owner, name) = if repo.contains('/') || repo.contains(':') {
                    parse_github_url(repo)?
                } else {
                    (config.templating.org.clone(), repo.clone())
                };

                let map = TemplateMap::read(&templates_dir)?;
                let client = GitHubClient::new(owner, github_token(bearer_token)?)?;
                match flag_templated_files(&client, &config.templating, &map, &name, *pr).await? {
                    FlagOutcome::NothingTemplated => {
                        println!("{}#{} touches no templated files.", name, pr)
                    }
                    FlagOutcome::AlreadyFlagged => println!("{}#{} is already flagged.", name, pr),
                    FlagOutcome::Commented(files) => {
                        println!("Flagged {}#{}:", name, pr);
                        for file in files {
                            println!("  {}", file.display());
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
