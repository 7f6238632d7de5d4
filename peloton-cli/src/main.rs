//! Peloton CLI - Command line interface for Peloton tooling
//!
//! Keeps the SciTools Peloton project board in step with GitHub, and keeps
//! repositories that adopt shared templates informed of template changes.

mod commands;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use peloton_core::{Config, Secrets};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{ProjectArgs, SyncArgs, TemplatesArgs};

/// Peloton: project board and template automation for SciTools
#[derive(Parser, Debug)]
#[command(name = "peloton")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Print debug information, including every GraphQL document
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file (default: ~/.config/peloton/config.toml)
    #[arg(long, global = true, env = "PELOTON_CONFIG")]
    config: Option<PathBuf>,

    /// GitHub token (overrides GH_TOKEN, GITHUB_TOKEN and the secrets file)
    #[arg(long, visible_alias = "bearer_token", global = true)]
    bearer_token: Option<String>,

    /// Project node ID (overrides config and env)
    #[arg(long, global = true)]
    project_id: Option<String>,

    /// Templates directory, relative to the templates repository root
    #[arg(long, global = true)]
    templates_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Refresh the project board, then optionally keep it live
    Sync(SyncArgs),

    /// Inspect the project board
    Project(ProjectArgs),

    /// Manage cross-repository templates
    #[command(visible_alias = "t")]
    Templates(TemplatesArgs),

    /// Show current configuration
    Config {
        /// Write a secrets file template to the default location
        #[arg(long)]
        init_secrets: bool,
    },
}

/// Console logging at INFO (DEBUG with `--verbose`), `RUST_LOG` taking
/// precedence; an optional file receives everything at DEBUG.
fn init_tracing(verbose: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let console_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let file_layer = match log_file {
        Some(path) => {
            let file = File::create(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(console_filter))
        .with(file_layer)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_file = match &cli.command {
        Some(Commands::Sync(args)) => args.log_file(),
        _ => None,
    };
    init_tracing(cli.verbose, log_file.map(PathBuf::as_path))?;

    if cli.verbose {
        tracing::info!("Verbose mode enabled");
    }

    let config = Config::load_with_overrides(
        cli.config.as_deref(),
        cli.project_id.clone(),
        cli.templates_dir.clone(),
    )?;

    if cli.verbose {
        tracing::info!(
            project = %config.project.id,
            graphql_url = %config.github.graphql_url,
            "Configuration loaded"
        );
    }

    let token = cli.bearer_token.as_deref();

    match &cli.command {
        Some(Commands::Version) => {
            println!("peloton {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Sync(args)) => {
            args.execute(&config, token).await?;
        }
        Some(Commands::Project(args)) => {
            args.execute(&config, token).await?;
        }
        Some(Commands::Templates(args)) => {
            args.execute(&config, token).await?;
        }
        Some(Commands::Config { init_secrets }) => {
            if *init_secrets {
                let path = Secrets::create_template()?;
                println!("Created secrets template at {}", path.display());
                println!("Add your GitHub token, then keep the file private (chmod 600).");
                return Ok(());
            }

            println!("Peloton Configuration");
            println!("=====================");
            println!();
            println!("GitHub:");
            println!("  graphql_url: {}", config.github.graphql_url);
            println!();
            println!("Project:");
            println!("  id: {}", config.project.id);
            println!("  link_field: {}", config.project.link_field);
            println!("  next_peloton_date_field: {}", config.project.next_peloton_date_field);
            println!("  mapped fields: {}", config.project.field_map.len());
            println!();
            println!("Search:");
            println!("  conditions: {}", config.search.conditions);
            println!("  closed_window_days: {}", config.search.closed_window_days);
            println!();
            println!("Team:");
            println!("  {}/{}", config.team.org, config.team.slug);
            println!("  extra_logins: {}", config.team.extra_logins.join(", "));
            println!("  bot_overrides: {}", config.team.bot_overrides.join(", "));
            println!();
            println!("Sync:");
            println!("  loop_interval: {:?}", config.sync.loop_interval);
            println!("  mutation_page_size: {}", config.sync.mutation_page_size);
            println!();
            println!("Templating:");
            println!("  source: {}/{}@{}", config.templating.org, config.templating.source_repo, config.templating.branch);
            println!("  templates_dir: {}", config.templating.templates_dir.display());
            println!("  labels: {}", config.templating.labels.join(", "));
            println!();
            if let Some(path) = cli.config.clone().or_else(Config::default_config_path) {
                println!("Config file: {}", path.display());
                if path.exists() {
                    println!("  (exists)");
                } else {
                    println!("  (not found - using defaults)");
                }
            }
            if let Some(path) = Secrets::default_secrets_path() {
                println!("Secrets file: {}", path.display());
                if path.exists() {
                    println!("  (exists)");
                } else {
                    println!("  (not found - run `peloton config --init-secrets`)");
                }
            }
        }
        None => {
            println!("Peloton - project board and template automation");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(())
}
