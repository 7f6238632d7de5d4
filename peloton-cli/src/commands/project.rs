//! Project inspection commands

use clap::{Args, Subcommand};
use peloton_core::Config;
use peloton_github::queries::{project_fields, team_logins};

use super::graphql_client;

/// Inspect the Peloton project board
#[derive(Args, Debug)]
pub struct ProjectArgs {
    #[command(subcommand)]
    pub command: ProjectCommand,
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// List the board's fields with their IDs, types and options
    Fields,

    /// List the logins counted as Peloton team members
    Team,
}

impl ProjectArgs {
    /// Execute the project command
    pub async fn execute(&self, config: &Config, bearer_token: Option<&str>) -> anyhow::Result<()> {
        let client = graphql_client(config, bearer_token)?;

        match &self.command {
            ProjectCommand::Fields => {
                let fields = project_fields(&client, &config.project.id).await?;

                println!("Fields of {}", config.project.id);
                println!();
                for field in &fields {
                    println!("  {}  {:?}  {}", field.id, field.kind, field.name);
                    for option in &field.options {
                        println!("      {}  {}", option.id, option.name);
                    }
                }
            }
            ProjectCommand::Team => {
                let logins = team_logins(&client, &config.team).await?;

                println!("Peloton team ({}/{})", config.team.org, config.team.slug);
                println!();
                for login in &logins {
                    println!("  {}", login);
                }
            }
        }

        Ok(())
    }
}
