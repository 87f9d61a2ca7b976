use anyhow::Context;
use clap::Subcommand;
use serde_json::json;
use std::path::PathBuf;

use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::config::AppConfig;
use crate::database::models::Plan;
use crate::database::Store;

#[derive(Subcommand)]
pub enum PlanCommands {
    #[command(about = "List the plan catalog")]
    List,

    #[command(about = "Insert or update plans from a YAML file (built-in catalog when omitted)")]
    Seed {
        #[arg(long, help = "YAML file holding a list of plans")]
        file: Option<PathBuf>,
    },
}

/// Reads a YAML list of plans; absent limits are unlimited
pub fn load_plan_file(path: &PathBuf) -> anyhow::Result<Vec<Plan>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan file {}", path.display()))?;
    let plans: Vec<Plan> = serde_yaml::from_str(&raw)
        .with_context(|| format!("Invalid plan file {}", path.display()))?;

    if let Some(plan) = plans.iter().find(|p| p.code.trim().is_empty()) {
        anyhow::bail!("Plan '{}' has an empty code", plan.name);
    }
    Ok(plans)
}

pub async fn handle(cmd: PlanCommands, config: &AppConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    let store = open_postgres(config).await?;

    match cmd {
        PlanCommands::List => {
            let plans = store.list_plans().await?;
            if plans.is_empty() {
                return output_empty_collection(&output_format, "plans", "No plans seeded");
            }

            match output_format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&json!({ "plans": plans }))?);
                }
                OutputFormat::Text => {
                    println!(
                        "{:<12} {:<14} {:>10} {:>10} {:>12} {:>8}",
                        "CODE", "NAME", "PROJECTS", "SEATS", "INTEGRATIONS", "$/MONTH"
                    );
                    println!("{}", "-".repeat(72));

                    for plan in &plans {
                        println!(
                            "{:<12} {:<14} {:>10} {:>10} {:>12} {:>8.2}",
                            plan.code,
                            plan.name,
                            format_limit(plan.included_projects),
                            format_limit(plan.included_seats),
                            format_limit(plan.included_integrations),
                            plan.monthly_price_cents as f64 / 100.0
                        );
                    }
                }
            }
            Ok(())
        }
        PlanCommands::Seed { file } => {
            let plans = match &file {
                Some(path) => load_plan_file(path)?,
                None => Plan::default_catalog(),
            };

            for plan in &plans {
                store.upsert_plan(plan).await?;
            }

            let codes: Vec<&str> = plans.iter().map(|p| p.code.as_str()).collect();
            output_success(
                &output_format,
                &format!("Seeded {} plans: {}", plans.len(), codes.join(", ")),
                Some(json!({ "plans": codes })),
            )
        }
    }
}
