use anyhow::Context;
use tracing::{info, warn};

use bedwatch::{App, load_config};
use bedwatch_application::{Scheduler, shutdown};
use bedwatch_ports::TelemetryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    bedwatch::init_tracing();

    let config = load_config(None)?;
    let (trigger, signal) = shutdown::channel();
    let app = App::build(config, signal.clone()).await?;
    info!(
        store = app.store.name(),
        departments = app.config.departments.len(),
        interval_secs = app.config.schedule.interval_secs,
        "bedwatch service starting"
    );

    let scheduler = Scheduler::new(app.orchestrator.clone(), app.config.schedule.clone(), signal);
    let scheduler = tokio::spawn(scheduler.run());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("Shutdown requested");
    trigger.trigger();

    if let Err(err) = scheduler.await {
        warn!(error = %err, "Scheduler task ended abnormally");
    }
    for (department, state) in app.orchestrator.tracker().snapshot() {
        info!(
            department = %department,
            runs = state.total_runs,
            failures = state.total_failures,
            "Final run state"
        );
    }
    Ok(())
}
