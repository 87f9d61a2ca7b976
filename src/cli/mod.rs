pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "scenehub")]
#[command(about = "SceneHub operator CLI - migrations, plan catalog and licenses")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Database schema management")]
    Db {
        #[command(subcommand)]
        cmd: commands::db::DbCommands,
    },

    #[command(about = "Plan catalog management")]
    Plans {
        #[command(subcommand)]
        cmd: commands::plans::PlanCommands,
    },

    #[command(about = "Organization licensing")]
    Org {
        #[command(subcommand)]
        cmd: commands::org::OrgCommands,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);
    let config = crate::config::config();

    match cli.command {
        Commands::Db { cmd } => commands::db::handle(cmd, config, output_format).await,
        Commands::Plans { cmd } => commands::plans::handle(cmd, config, output_format).await,
        Commands::Org { cmd } => commands::org::handle(cmd, config, output_format).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_license_change() {
        let cli = Cli::try_parse_from([
            "scenehub", "--json", "org", "license", "5f0c6a8e-9a53-4c7c-a1a4-2b9f3d7d2a10", "team",
        ])
        .unwrap();
        assert!(matches!(OutputFormat::from_cli(&cli), OutputFormat::Json));
        assert!(matches!(cli.command, Commands::Org { .. }));
    }
}
