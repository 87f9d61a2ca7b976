use clap::{Subcommand, ValueEnum};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::config::AppConfig;
use crate::database::Store;
use crate::types::SubscriptionStatus;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusArg {
    None,
    Trialing,
    Active,
    PastDue,
    Canceled,
}

impl From<StatusArg> for SubscriptionStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::None => SubscriptionStatus::None,
            StatusArg::Trialing => SubscriptionStatus::Trialing,
            StatusArg::Active => SubscriptionStatus::Active,
            StatusArg::PastDue => SubscriptionStatus::PastDue,
            StatusArg::Canceled => SubscriptionStatus::Canceled,
        }
    }
}

#[derive(Subcommand)]
pub enum OrgCommands {
    #[command(about = "Move an organization to another plan")]
    License {
        #[arg(help = "Organization ID")]
        organization: Uuid,

        #[arg(help = "Plan code, e.g. free, pro, team")]
        plan: String,

        #[arg(long, value_enum, default_value = "active", help = "Subscription status")]
        status: StatusArg,
    },

    #[command(about = "Show an organization")]
    Show {
        #[arg(help = "Organization ID")]
        organization: Uuid,
    },
}

pub async fn handle(cmd: OrgCommands, config: &AppConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    let store = open_postgres(config).await?;

    match cmd {
        OrgCommands::License {
            organization,
            plan,
            status,
        } => {
            if store.find_plan(&plan).await?.is_none() {
                anyhow::bail!("Unknown plan '{}'", plan);
            }
            let updated = store.update_license(organization, &plan, status.into()).await?;
            info!("License of {} set to {} from the CLI", updated.id, updated.plan_code);

            output_success(
                &output_format,
                &format!("{} is now on plan {}", updated.slug, updated.plan_code),
                Some(json!(updated)),
            )
        }
        OrgCommands::Show { organization } => {
            let found = store
                .find_organization(organization)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Organization {} not found", organization))?;

            match output_format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&found)?),
                OutputFormat::Text => {
                    println!("Name:   {}", found.name);
                    println!("Slug:   {}", found.slug);
                    println!("Plan:   {}", found.plan_code);
                    println!("Status: {:?}", found.subscription_status);
                    println!("Personal: {}", found.is_personal);
                }
            }
            Ok(())
        }
    }
}
