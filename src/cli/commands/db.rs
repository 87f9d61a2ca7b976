use clap::Subcommand;

use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::config::AppConfig;
use crate::database::{DatabaseManager, Store};

#[derive(Subcommand)]
pub enum DbCommands {
    #[command(about = "Apply pending migrations")]
    Migrate,

    #[command(about = "Check that the database answers")]
    Ping,
}

pub async fn handle(cmd: DbCommands, config: &AppConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        DbCommands::Migrate => {
            let pool = DatabaseManager::connect(config).await?;
            DatabaseManager::migrate(&pool).await?;
            output_success(&output_format, "Migrations applied", None)
        }
        DbCommands::Ping => {
            let store = open_postgres(config).await?;
            store.ping().await?;
            output_success(&output_format, "Database is reachable", None)
        }
    }
}
