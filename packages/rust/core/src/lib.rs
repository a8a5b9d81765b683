//! Lead qualification pipeline.
//!
//! Ties together ingestion, enrichment, the staged LLM evaluations and
//! persistence into one task graph per lead, run across a batch by the
//! [`Orchestrator`].

pub mod context;
pub mod cost;
pub mod enrich;
pub mod executor;
pub mod graph;
pub mod ingest;
pub mod orchestrator;
pub mod retry;
pub mod stages;

pub use context::{PipelineContext, RunOptions};
pub use cost::{CostSummary, CostTracker, Pricing, UsageLog, UsageRecord};
pub use enrich::{Enrichment, EnrichmentCollector, ProviderSlot};
pub use graph::{NodeId, TaskGraph};
pub use ingest::{IngestReport, SkippedRow, read_leads};
pub use orchestrator::{
    BatchReport, LeadOutcome, LeadReport, NodeStatus, Orchestrator, ProgressReporter,
    SilentProgress,
};
pub use stages::{LeadRunner, StageOutput, StageResult, draft_identity};
