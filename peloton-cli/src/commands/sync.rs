//! Sync command - Bring the Peloton project board up to date

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use peloton_core::Config;
use peloton_github::ProjectSync;

use super::graphql_client;

/// Arguments for the sync command
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Minutes to keep looping incremental updates after the full refresh.
    /// Intended for live updating during meetings.
    #[arg(long, visible_alias = "update_loop_minutes", default_value = "0")]
    pub update_loop_minutes: u64,

    /// File receiving the full debug log of this run (truncated at start)
    #[arg(long, default_value = "latest_peloton_update.log")]
    pub log_file: PathBuf,

    /// Do not write a log file
    #[arg(long, conflicts_with = "log_file")]
    pub no_log_file: bool,
}

impl SyncArgs {
    /// Log file to set up before running, if any
    pub fn log_file(&self) -> Option<&PathBuf> {
        (!self.no_log_file).then_some(&self.log_file)
    }

    /// Execute the sync command
    pub async fn execute(&self, config: &Config, bearer_token: Option<&str>) -> anyhow::Result<()> {
        let client = graphql_client(config, bearer_token)?;
        let sync = ProjectSync::new(client, config.clone());

        tracing::info!(
            project = %config.project.id,
            loop_minutes = self.update_loop_minutes,
            "Starting project sync"
        );

        let reports = sync
            .run(Duration::from_secs(self.update_loop_minutes * 60))
            .await?;

        println!("Peloton Project Sync");
        println!("====================");
        println!();
        for (ix, report) in reports.iter().enumerate() {
            println!(
                "Pass {} ({:?}): {} tracked, {} removed, {} cleared, {} issues added, \
                 {} discussions added, {} updated",
                ix + 1,
                report.mode,
                report.tracked,
                report.removed,
                report.cleared,
                report.added_issues,
                report.added_drafts,
                report.updated,
            );
        }

        Ok(())
    }
}
