//! Per-agent quality retrospective over recent queue history

use serde::{Deserialize, Serialize};

use gatekeep_db::QueueItem;

use crate::review::{decision::DEFAULT_SCORE, Verdict};

/// Fewer reviews than this in the period reads as an improving trend
const STABLE_TREND_REVIEWS: usize = 5;

/// Quality summary of one agent over a period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrospectiveReport {
    pub agent: String,
    pub period_days: u32,
    pub reviews_count: usize,
    pub avg_score: f64,
    /// Share of reviews that ended in an approve decision, in percent
    pub approved_pct: f64,
    pub duplication_issues: usize,
    pub trend: String,
    pub recommendations: Vec<String>,
}

impl RetrospectiveReport {
    /// Summarize the reviewed items of one agent; `None` when there are none
    pub fn from_reviews(agent: &str, period_days: u32, reviews: &[QueueItem]) -> Option<Self> {
        if reviews.is_empty() {
            return None;
        }

        let count = reviews.len() as f64;
        let avg_score = reviews
            .iter()
            .map(|item| f64::from(item.score().unwrap_or(DEFAULT_SCORE)))
            .sum::<f64>()
            / count;
        let approvals = reviews
            .iter()
            .filter(|item| item.decision() == Some(Verdict::Approve.as_str()))
            .count();
        let approved_pct = approvals as f64 / count * 100.0;
        let duplication_issues = reviews.iter().filter(|item| item.was_duplicate()).count();

        let mut recommendations = Vec::with_capacity(2);
        if approved_pct > 70.0 {
            recommendations.push(format!(
                "Agent reached {:.0}% approvals, keep it up",
                approved_pct
            ));
        } else {
            recommendations.push("Agent needs to improve quality".to_string());
        }
        if duplication_issues > 2 {
            recommendations.push("Reduce duplicate commits".to_string());
        } else {
            recommendations.push("Good duplication control".to_string());
        }

        Some(Self {
            agent: agent.to_string(),
            period_days,
            reviews_count: reviews.len(),
            avg_score,
            approved_pct,
            duplication_issues,
            trend: if reviews.len() < STABLE_TREND_REVIEWS {
                "improving".to_string()
            } else {
                "stable".to_string()
            },
            recommendations,
        })
    }

    pub fn is_below(&self, approval_floor: f64) -> bool {
        self.approved_pct < approval_floor
    }
}
