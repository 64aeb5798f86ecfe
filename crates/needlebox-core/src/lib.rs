//! needlebox core: multi-turn episodes over a sandboxed executor.
//!
//! A [`PolicyAdapter`] emits snippets against a held-out [`Context`]; the
//! orchestrator runs each one in the sandbox, records the turn, and stops
//! when the policy answers or a limit is hit. The outcome is scored against
//! ground truth with step and token penalties.
//!
//! ```no_run
//! # use needlebox_core::{run_episode, DirectPatternPolicy, EpisodeConfig};
//! # #[tokio::main]
//! # async fn main() -> needlebox_core::Result<()> {
//! let policy = DirectPatternPolicy::from_question("What is the value of KEY?")?;
//! let (outcome, reward) =
//!     run_episode("... KEY=42 ...", &policy, "42", &EpisodeConfig::default()).await?;
//! assert_eq!(outcome.answer(), Some("42"));
//! assert_eq!(reward.correctness, 1.0);
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod outcome;
pub mod policy;
pub mod replay;
pub mod reward;
pub mod telemetry;
pub mod transcript;

pub use batch::{run_batch, BatchConfig, BatchReport, BatchSummary, BatchTask, EpisodeRecord};
pub use config::EpisodeConfig;
pub use error::{NeedleboxError, PolicyError, Result};
pub use orchestrator::{run_episode, run_episode_with_cancel, CancelHandle};
pub use outcome::{EpisodeOutcome, FinalAnswer, TerminationReason};
pub use policy::{parse_decision, Decision, DirectPatternPolicy, PolicyAdapter, ScriptedPolicy};
pub use replay::{replay_outcome, replay_transcript, ReplaySummary};
pub use reward::{score, AnswerMatch, RewardRecord, RewardWeights};
pub use telemetry::init_tracing;
pub use transcript::{Context, Transcript, Turn};

pub use needlebox_sandbox::{Action, ActionKind, ExecutionResult, ExecutionStatus};
