//! Review policy: decisions, duplicate detection and the policy engine

pub mod analysis;
pub mod decision;
pub mod fingerprint;
pub mod policy;

pub use analysis::{AnalysisReport, Analyzer, DocsCheck, HeuristicAnalyzer, TestValidation};
pub use decision::{
    parse_reply, DecisionOrigin, ParsedReply, ReviewDecision, TrainingFeedback, Verdict,
};
pub use fingerprint::{fingerprint, FingerprintHistory};
pub use policy::{EngineStatus, ReviewPolicyEngine};
