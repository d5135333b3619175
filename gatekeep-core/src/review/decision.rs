//! Review decisions and advisor reply parsing
//!
//! Advisor replies are free-form text that is expected to carry a JSON
//! object. [`parse_reply`] validates that object against the decision
//! schema and, when it does not fit, derives a decision from keywords in
//! the raw text instead. Callers always get a decision back.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Score used when the advisor does not provide one
pub const DEFAULT_SCORE: u8 = 50;

/// Characters of the raw reply kept as the summary of a fallback decision
const FALLBACK_SUMMARY_CHARS: usize = 200;

/// The verdict of a review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approve,
    Reject,
    RequestChanges,
    NeedsRetest,
}

impl Verdict {
    pub const ALL: [Verdict; 4] = [
        Verdict::Approve,
        Verdict::Reject,
        Verdict::RequestChanges,
        Verdict::NeedsRetest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Approve => "approve",
            Verdict::Reject => "reject",
            Verdict::RequestChanges => "request_changes",
            Verdict::NeedsRetest => "needs_retest",
        }
    }

    /// Look up a verdict by its exact wire name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.as_str() == name)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a decision came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOrigin {
    /// A schema-valid advisor reply
    #[default]
    Advisor,
    /// Keyword scan over an unusable or missing reply
    KeywordFallback,
    /// Short-circuited by the duplicate check
    DuplicateDetection,
}

/// A coaching note for the agent that authored the change
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingFeedback {
    pub agent: String,
    pub issue: String,
    pub training: String,
}

/// The structured outcome of one review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewDecision {
    pub decision: Verdict,
    pub score: u8,
    pub summary: String,
    #[serde(default)]
    pub findings: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_feedback: Option<TrainingFeedback>,
    #[serde(default)]
    pub tests_required: Vec<String>,
    /// Set only on duplicate rejections
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplication_score: Option<f64>,
    #[serde(default)]
    pub origin: DecisionOrigin,
    /// Why the advisor reply was not used as-is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

impl ReviewDecision {
    /// A bare decision with no findings
    pub fn new(decision: Verdict, score: u8, summary: impl Into<String>) -> Self {
        Self {
            decision,
            score: score.min(100),
            summary: summary.into(),
            findings: Vec::new(),
            risks: Vec::new(),
            recommendations: Vec::new(),
            training_feedback: None,
            tests_required: Vec::new(),
            duplication_score: None,
            origin: DecisionOrigin::Advisor,
            fallback_reason: None,
        }
    }

    /// Rejection for a change already seen in the review history
    pub fn duplicate(window: usize) -> Self {
        let mut decision = Self::new(Verdict::Reject, 0, "Duplicate code detected");
        decision.findings.push(format!(
            "Diff fingerprint matches one of the last {} reviewed changes",
            window
        ));
        decision
            .recommendations
            .push("Do not resubmit a change that has already been reviewed".to_string());
        decision.duplication_score = Some(1.0);
        decision.origin = DecisionOrigin::DuplicateDetection;
        decision
    }

    /// Decision derived by keyword scan of the raw advisor text
    ///
    /// Keywords are checked in order approve, reject, request, retest; the
    /// first one present wins. No keyword means `request_changes`.
    pub fn from_keywords(raw: &str, reason: impl Into<String>) -> Self {
        const KEYWORDS: [(&str, Verdict); 4] = [
            ("approve", Verdict::Approve),
            ("reject", Verdict::Reject),
            ("request", Verdict::RequestChanges),
            ("retest", Verdict::NeedsRetest),
        ];

        let lowered = raw.to_lowercase();
        let verdict = KEYWORDS
            .iter()
            .find(|(keyword, _)| lowered.contains(keyword))
            .map(|(_, verdict)| *verdict)
            .unwrap_or(Verdict::RequestChanges);

        let mut decision = Self::new(
            verdict,
            DEFAULT_SCORE,
            raw.chars().take(FALLBACK_SUMMARY_CHARS).collect::<String>(),
        );
        decision.origin = DecisionOrigin::KeywordFallback;
        decision.fallback_reason = Some(reason.into());
        decision
    }

    pub fn is_duplicate(&self) -> bool {
        self.duplication_score.is_some()
    }

    /// Serialized form stored as the queue item's review result
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({
                "decision": self.decision,
                "score": self.score,
                "summary": self.summary,
                "serialization_error": e.to_string(),
            })
        })
    }
}

/// Result of parsing one advisor reply
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedReply {
    /// The reply carried a schema-valid decision
    Valid(ReviewDecision),
    /// The reply was unusable; the decision comes from a keyword scan
    Fallback {
        decision: ReviewDecision,
        reason: String,
    },
}

impl ParsedReply {
    pub fn into_decision(self) -> ReviewDecision {
        match self {
            ParsedReply::Valid(decision) | ParsedReply::Fallback { decision, .. } => decision,
        }
    }
}

/// Parse an advisor reply into a decision, never failing
pub fn parse_reply(raw: &str) -> ParsedReply {
    match validate(raw) {
        Ok(decision) => ParsedReply::Valid(decision),
        Err(reason) => ParsedReply::Fallback {
            decision: ReviewDecision::from_keywords(raw, reason.clone()),
            reason,
        },
    }
}

/// Strict schema check of the JSON object embedded in `raw`
fn validate(raw: &str) -> std::result::Result<ReviewDecision, String> {
    let json = extract_object(raw).ok_or_else(|| "reply contains no JSON object".to_string())?;
    let value: Value =
        serde_json::from_str(json).map_err(|e| format!("reply is not valid JSON: {}", e))?;
    let object = value
        .as_object()
        .ok_or_else(|| "reply JSON is not an object".to_string())?;

    let decision = match object.get("decision") {
        Some(Value::String(name)) => Verdict::from_name(name.trim())
            .ok_or_else(|| format!("unknown decision '{}'", name))?,
        Some(_) => return Err("'decision' is not a string".to_string()),
        None => return Err("missing 'decision'".to_string()),
    };

    let score = match object.get("score") {
        None | Some(Value::Null) => DEFAULT_SCORE,
        Some(Value::Number(n)) => {
            let score = n
                .as_f64()
                .ok_or_else(|| "'score' is not a finite number".to_string())?;
            if !(0.0..=100.0).contains(&score) {
                return Err(format!("'score' {} is outside 0-100", score));
            }
            score.round() as u8
        }
        Some(_) => return Err("'score' is not a number".to_string()),
    };

    let summary = object
        .get("summary")
        .or_else(|| object.get("Summary"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut parsed = ReviewDecision::new(decision, score, summary);
    parsed.findings = string_list(object.get("findings"), "findings")?;
    parsed.risks = string_list(object.get("risks"), "risks")?;
    parsed.recommendations = string_list(object.get("recommendations"), "recommendations")?;
    parsed.tests_required = string_list(object.get("tests_required"), "tests_required")?;
    parsed.training_feedback = match object.get("training_feedback") {
        None | Some(Value::Null) => None,
        Some(value @ Value::Object(_)) => {
            let feedback: TrainingFeedback = serde_json::from_value(value.clone())
                .map_err(|e| format!("invalid 'training_feedback': {}", e))?;
            (!feedback.issue.is_empty() || !feedback.training.is_empty()).then_some(feedback)
        }
        Some(_) => return Err("'training_feedback' is not an object".to_string()),
    };

    Ok(parsed)
}

fn string_list(value: Option<&Value>, field: &str) -> std::result::Result<Vec<String>, String> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect()),
        Some(_) => Err(format!("'{}' is not a list", field)),
    }
}

/// Slice from the first `{` to the last `}`
fn extract_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}
