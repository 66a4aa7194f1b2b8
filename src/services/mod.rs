//! Domain services composed by the scoring worker.

pub mod access_token_service;
pub mod dedup;
pub mod job_discovery;
pub mod retry_policy;
pub mod score_aggregator;
pub mod task_router;

pub use access_token_service::AccessTokenService;
pub use job_discovery::JobDiscovery;
pub use retry_policy::RetryPolicy;
pub use score_aggregator::{AttemptScoring, FamilyError, FamilyScores, ScoreAggregator};
pub use task_router::{route, FamilyPlan, Invocation, RoutedAttempt, SkippedFamily};
