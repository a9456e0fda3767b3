//! vsc-sync - synchronise account page changes onto storage
//!
//! Run periodically (cron or a systemd timer). Each run provisions the
//! accounts and projects changed since the previous run; `--nagios` reports
//! the outcome of the last run to monitoring.

use clap::Parser;
use std::path::PathBuf;

use vsc_core::EntityKind;
use vsc_sync::config::{ConfigError, SyncConfig, DEFAULT_CONFIG_PATH};
use vsc_sync::error::CliResult;
use vsc_sync::{logging, run};

/// Synchronise VSC accounts and projects onto storage
#[derive(Parser)]
#[command(name = "vsc-sync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "VSC_SYNC_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Synchronise accounts
    #[arg(long, visible_alias = "users")]
    user: bool,

    /// Synchronise projects
    #[arg(long, visible_alias = "vo")]
    projects: bool,

    /// Log what would change without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Report the last run's health in Nagios format and exit
    #[arg(long, conflicts_with_all = ["user", "projects", "dry_run"])]
    nagios: bool,

    /// Log at debug level
    #[arg(short, long)]
    debug: bool,
}

impl Cli {
    fn kinds(&self, config: &SyncConfig) -> CliResult<Vec<EntityKind>> {
        let mut kinds = Vec::new();
        if self.user {
            kinds.push(EntityKind::User);
        }
        if self.projects {
            kinds.push(EntityKind::Project);
        }
        if kinds.is_empty() {
            kinds = config.configured_kinds();
        }
        if kinds.is_empty() {
            return Err(ConfigError::Invalid {
                field: "users/projects".to_string(),
                message: "nothing to synchronise".to_string(),
            }
            .into());
        }
        Ok(kinds)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match execute(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}

async fn execute(cli: Cli) -> CliResult<i32> {
    let config = SyncConfig::load(&cli.config)?;
    logging::init_logging(&config.logging, cli.debug.then_some("debug"))?;

    if cli.nagios {
        let report = run::nagios(&config).await?;
        println!("{}", report.nagios_line(run::NAGIOS_HEADER));
        return Ok(run::exit_code(&report, true));
    }

    let kinds = cli.kinds(&config)?;
    let report = run::synchronise(&config, &kinds, cli.dry_run).await;
    Ok(run::exit_code(&report, false))
}
