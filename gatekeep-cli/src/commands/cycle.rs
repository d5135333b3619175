//! Cycle command - run exactly one review cycle

use clap::Args;
use gatekeep_core::Config;
use tokio_util::sync::CancellationToken;

use super::build_scheduler;

/// Run a single review cycle and report what it did
#[derive(Args, Debug)]
pub struct CycleArgs {
    /// Print the cycle report as JSON
    #[arg(long)]
    pub json: bool,

    /// Also run the agent retrospective afterwards
    #[arg(long)]
    pub retrospective: bool,
}

impl CycleArgs {
    /// Execute the cycle command
    pub async fn execute(&self, verbose: bool, config: &Config) -> anyhow::Result<()> {
        let mut scheduler = build_scheduler(config).await?;
        scheduler.prepare().await?;

        let report = scheduler.run_cycle(&CancellationToken::new()).await?;
        if self.retrospective {
            scheduler.run_retrospectives().await;
        }

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        if report.processed.is_empty() {
            println!("Nothing to review.");
            return Ok(());
        }

        println!(
            "Cycle {}: {} item(s) in {} ms",
            report.cycle,
            report.processed.len(),
            report.duration_ms
        );
        println!();
        for outcome in &report.processed {
            let short: String = outcome.commit_id.chars().take(7).collect();
            match outcome.error {
                Some(ref error) => println!("  {:<8} {} ({})", short, outcome.status, error),
                None => println!("  {:<8} {}", short, outcome.status),
            }
        }

        if verbose {
            println!();
            println!("{}", serde_json::to_string_pretty(scheduler.metrics())?);
        }

        Ok(())
    }
}
