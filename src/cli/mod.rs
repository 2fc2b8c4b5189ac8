//! Operator command line.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;

use bedwatch_application::shutdown;
use bedwatch_domain::{AlertFilter, BedwatchConfig};
use bedwatch_ports::TelemetryStore;

use crate::bootstrap::{App, CONFIG_ENV, load_config};
use crate::seed::{SeedPlan, seed_department};

#[derive(Parser, Debug)]
#[command(name = "bedwatch")]
#[command(about = "Bed-occupancy forecasting pipeline", long_about = None)]
pub struct Cli {
    /// Config file (YAML)
    #[arg(long, global = true, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the pipeline once for a department
    RunOnce {
        #[arg(short, long)]
        department: String,
    },
    /// Evaluate every matured forecast
    Evaluate,
    /// Write synthetic hourly telemetry
    Seed {
        #[arg(short, long)]
        department: String,
        /// Display name when the department is created
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value_t = 200)]
        beds: u32,
        #[arg(long, default_value_t = 7)]
        days: u32,
        /// RNG seed for reproducible data
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Acknowledge an alert
    Ack { alert_id: String },
    /// List alerts, newest first
    Alerts {
        #[arg(short, long)]
        department: Option<String>,
        /// Only unacknowledged alerts
        #[arg(long)]
        open: bool,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Print the activity log, newest first
    Log {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    execute(cli.command, config).await
}

pub async fn execute(command: Command, config: BedwatchConfig) -> Result<()> {
    let (_trigger, signal) = shutdown::channel();
    let app = App::build(config, signal).await?;

    match command {
        Command::RunOnce { department } => {
            let report = app.orchestrator.trigger(&department).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Evaluate => {
            let report = app.orchestrator.evaluate_matured(Utc::now()).await?;
            println!(
                "evaluated={} pending={} failed={}",
                report.evaluated, report.pending, report.failed
            );
        }
        Command::Seed {
            department,
            name,
            beds,
            days,
            seed,
        } => {
            let plan = SeedPlan {
                name: name.unwrap_or_else(|| department.clone()),
                department_id: department,
                total_beds: beds,
                days,
            };
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let count = seed_department(app.store.as_ref(), &plan, &mut rng).await?;
            println!("seeded {count} samples for {}", plan.department_id);
        }
        Command::Ack { alert_id } => {
            app.store
                .acknowledge_alert(&alert_id)
                .await
                .with_context(|| format!("failed to acknowledge {alert_id}"))?;
            println!("acknowledged {alert_id}");
        }
        Command::Alerts {
            department,
            open,
            limit,
        } => {
            let alerts = app
                .store
                .list_alerts(AlertFilter {
                    department_id: department,
                    unacknowledged_only: open,
                    limit: Some(limit),
                })
                .await?;
            for alert in alerts {
                println!(
                    "{}  {}  {:<8}  {}  {}{}",
                    alert.created_at.format("%Y-%m-%d %H:%M"),
                    alert.id,
                    alert.severity,
                    alert.department_id,
                    alert.message,
                    if alert.acknowledged { "  [ack]" } else { "" }
                );
            }
        }
        Command::Log { limit } => {
            for entry in app.store.recent_log_entries(limit).await? {
                println!(
                    "{}  {:<13}  {:<20}  {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.agent,
                    entry.action,
                    serde_json::Value::Object(entry.metadata)
                );
            }
        }
    }
    Ok(())
}
