//! Retrospective command - quality summary of one agent

use chrono::Utc;
use clap::Args;
use gatekeep_core::{Config, RetrospectiveReport};

use super::open_queue;

/// Quality retrospective of an agent over recent reviews
#[derive(Args, Debug)]
pub struct RetrospectiveArgs {
    /// Agent to report on
    pub agent: String,

    /// Look-back window in days
    #[arg(short, long, default_value = "7")]
    pub days: u32,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

impl RetrospectiveArgs {
    /// Execute the retrospective command
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let queue = open_queue(config).await?;
        let since = Utc::now() - chrono::Duration::days(i64::from(self.days));
        let reviews = queue.reviewed_by_author_since(&self.agent, since).await?;

        let Some(report) = RetrospectiveReport::from_reviews(&self.agent, self.days, &reviews)
        else {
            println!("No reviews of {} in the last {} days.", self.agent, self.days);
            return Ok(());
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        println!("Retrospective: {} (last {} days)", report.agent, report.period_days);
        println!();
        println!("  Reviews:      {}", report.reviews_count);
        println!("  Avg score:    {:.1}", report.avg_score);
        println!("  Approved:     {:.1}%", report.approved_pct);
        println!("  Duplicates:   {}", report.duplication_issues);
        println!("  Trend:        {}", report.trend);
        if report.is_below(config.scheduler.approval_rate_floor) {
            println!(
                "  Below the {:.0}% approval floor",
                config.scheduler.approval_rate_floor
            );
        }
        println!();
        for recommendation in &report.recommendations {
            println!("  - {}", recommendation);
        }

        Ok(())
    }
}
