//! Task node implementations for one lead.
//!
//! Every persisted stage follows the same status discipline:
//!
//! - stored status `Completed` and no force: return the stored result, write nothing
//! - otherwise write `In Progress`, compute, then write the stage's fields
//!   together with `Completed` or `Needs Review`
//! - a hard failure (persistence, unknown offer) reverts the status to
//!   `Not Started` on a best-effort basis and fails the node
//!
//! Only `StoreOrFind` and campaign drafts create records; everything else
//! updates the record found by `StoreOrFind`.

mod campaign;
mod evaluate;
mod offer;
mod persist;
pub mod replies;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use leadqual_scoring::{EvaluationResult, ScoringConfig};
use leadqual_shared::coerce::round1;
use leadqual_shared::{
    EnrichedProfile, EvaluationStatus, Lead, LeadQualError, ProviderError, Result, Stage,
};
use leadqual_storage::{FieldMap, FieldValue, RecordRef, Table, leads, stage_fields};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::PipelineContext;
use crate::cost::CostTracker;
use crate::enrich::Enrichment;
use crate::executor::NodeRunner;
use crate::graph::{Inputs, NodeId, NodeOutput};

pub use campaign::{CampaignSummary, EmailSummary, draft_identity};
pub use offer::{OfferMatch, OfferRecommendation};
pub use persist::PersistSummary;
use replies::{Narrative, PainPointReport, Reply, parse_reply};

// ---------------------------------------------------------------------------
// Stage outputs
// ---------------------------------------------------------------------------

/// What a stage produced, in the shape stored in its analysis field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageResult {
    Evaluation {
        result: EvaluationResult,
        #[serde(default)]
        narrative: Option<Narrative>,
    },
    PainPoints {
        result: EvaluationResult,
        #[serde(default)]
        report: Option<PainPointReport>,
    },
    Offer(OfferRecommendation),
    Campaign(CampaignSummary),
    /// Stored analysis could not be read back.
    Unavailable,
}

impl StageResult {
    /// The category result for scoring stages.
    pub fn evaluation(&self) -> Option<&EvaluationResult> {
        match self {
            Self::Evaluation { result, .. } | Self::PainPoints { result, .. } => Some(result),
            _ => None,
        }
    }

    /// Value for the stage's score field.
    fn score(&self) -> Option<f64> {
        match self {
            Self::Evaluation { result, .. } | Self::PainPoints { result, .. } => Some(result.total),
            Self::Offer(rec) => rec.best.as_ref().map(|m| m.fit_score),
            Self::Campaign(_) | Self::Unavailable => None,
        }
    }
}

/// Analysis field payload: the result plus the formula version that produced it.
#[derive(Debug, Serialize, Deserialize)]
struct StoredAnalysis {
    formula_version: u32,
    result: StageResult,
}

/// Output of a persisted stage node.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput {
    pub stage: Stage,
    pub status: EvaluationStatus,
    /// `false` when the stored result was reused without recomputing.
    pub ran: bool,
    pub result: StageResult,
    pub provider_errors: Vec<ProviderError>,
    /// Why the stage ended in `Needs Review`, if it did.
    pub review_reason: Option<String>,
}

impl StageOutput {
    pub fn evaluation(&self) -> Option<&EvaluationResult> {
        self.result.evaluation()
    }

    pub fn pain_report(&self) -> Option<&PainPointReport> {
        match &self.result {
            StageResult::PainPoints { report, .. } => report.as_ref(),
            _ => None,
        }
    }

    pub fn offer(&self) -> Option<&OfferRecommendation> {
        match &self.result {
            StageResult::Offer(rec) => Some(rec),
            _ => None,
        }
    }

    /// Rebuild a completed stage's output from the stored record.
    fn from_record(stage: Stage, record: &RecordRef, scoring: &ScoringConfig) -> Self {
        let fields = stage_fields(stage);
        let stored = record
            .get(fields.analysis)
            .and_then(FieldValue::as_json)
            .and_then(|v| serde_json::from_value::<StoredAnalysis>(v.clone()).ok())
            .map(|a| a.result);

        let result = match (stored, stage.category()) {
            (Some(result), _) => result,
            (None, Some(category)) => {
                // Score field only: keep the category's contribution to the lead score.
                let total = fields.score.and_then(|f| record.number(f)).unwrap_or(0.0);
                StageResult::Evaluation {
                    result: EvaluationResult {
                        total,
                        weighted_total: round1(total * scoring.category_weight(category) / 100.0),
                        breakdown: Default::default(),
                    },
                    narrative: None,
                }
            }
            (None, None) => StageResult::Unavailable,
        };

        Self {
            stage,
            status: EvaluationStatus::Completed,
            ran: false,
            result,
            provider_errors: Vec::new(),
            review_reason: None,
        }
    }
}

/// Result of a stage computation before it is written.
struct Computed {
    status: EvaluationStatus,
    result: StageResult,
    /// Fields beyond status, score and analysis.
    extra: FieldMap,
    provider_errors: Vec<ProviderError>,
    review_reason: Option<String>,
}

impl Computed {
    fn completed(result: StageResult) -> Self {
        Self {
            status: EvaluationStatus::Completed,
            result,
            extra: FieldMap::new(),
            provider_errors: Vec::new(),
            review_reason: None,
        }
    }

    fn needs_review(result: StageResult, failure: LlmFailure) -> Self {
        let mut computed = Self::completed(result);
        computed.flag(failure);
        computed
    }

    /// Downgrade to `Needs Review`, remembering why.
    fn flag(&mut self, failure: LlmFailure) {
        self.status = EvaluationStatus::NeedsReview;
        match failure {
            LlmFailure::Provider(e) => {
                self.review_reason.get_or_insert_with(|| e.to_string());
                self.provider_errors.push(e);
            }
            LlmFailure::Invalid(reason) => {
                self.review_reason.get_or_insert(reason);
            }
        }
    }
}

/// Why a model call produced nothing usable.
#[derive(Debug, Clone)]
enum LlmFailure {
    Provider(ProviderError),
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Runs the nodes of one lead's graph.
pub struct LeadRunner {
    ctx: Arc<PipelineContext>,
    lead: Arc<Lead>,
    cost: Arc<CostTracker>,
}

impl LeadRunner {
    pub fn new(ctx: Arc<PipelineContext>, lead: Arc<Lead>, cost: Arc<CostTracker>) -> Self {
        Self { ctx, lead, cost }
    }

    fn identity(&self) -> &str {
        self.lead.identity.as_str()
    }

    // --- Store access -----------------------------------------------------

    /// Find a record by identity or create it, serialised per identity.
    /// A lost create race (`IdentityConflict`) falls back to re-reading.
    async fn find_or_create(&self, table: Table, identity: &str, fields: FieldMap) -> Result<(RecordRef, bool)> {
        let store = &self.ctx.store;
        let retry = &self.ctx.retry;
        let _guard = self.ctx.locks.lock(&format!("{table}/{identity}")).await;

        if let Some(found) = retry
            .run("find", || store.find_by_identity(table, identity))
            .await?
        {
            return Ok((found, false));
        }

        match retry
            .run("create", || store.create(table, identity, fields.clone()))
            .await
        {
            Ok(created) => Ok((created, true)),
            Err(LeadQualError::IdentityConflict { .. }) => {
                warn!(%table, identity, "identity conflict on create; re-reading existing record");
                retry
                    .run("find", || store.find_by_identity(table, identity))
                    .await?
                    .map(|found| (found, false))
                    .ok_or_else(|| {
                        LeadQualError::Persistence(format!(
                            "{table} record for {identity} conflicted on create but cannot be found"
                        ))
                    })
            }
            Err(e) => Err(e),
        }
    }

    async fn find(&self, table: Table, identity: &str) -> Result<Option<RecordRef>> {
        let store = &self.ctx.store;
        self.ctx
            .retry
            .run("find", || store.find_by_identity(table, identity))
            .await
    }

    async fn remove(&self, table: Table, record: &RecordRef) -> Result<()> {
        let store = &self.ctx.store;
        self.ctx
            .retry
            .run("delete", || store.delete(table, record))
            .await
    }

    async fn write(&self, table: Table, record: &RecordRef, fields: FieldMap) -> Result<RecordRef> {
        let store = &self.ctx.store;
        self.ctx
            .retry
            .run("update", || store.update(table, record, fields.clone()))
            .await
    }

    // --- Nodes ------------------------------------------------------------

    async fn store_or_find(&self) -> Result<RecordRef> {
        let lead = &self.lead;
        let mut fields = FieldMap::new();
        let mut put = |name: &str, value: String| {
            fields.insert(name.to_string(), FieldValue::Text(value));
        };
        put(leads::IDENTITY, self.identity().to_string());
        put(leads::LEAD_ID, lead.identity.lead_id());
        put(leads::EMAIL, lead.email.clone());
        put(leads::NAME, lead.full_name());
        put(leads::COMPANY, lead.company.clone());
        put(leads::TITLE, lead.title.clone());
        put(leads::INDUSTRY, lead.industry.clone());
        put(leads::LINKEDIN_URL, lead.linkedin_url.clone());
        put(leads::WEBSITE, lead.website.clone());
        for stage in Stage::ALL {
            put(stage_fields(stage).status, EvaluationStatus::NotStarted.to_string());
        }

        let (record, created) = self.find_or_create(Table::Leads, self.identity(), fields).await?;
        if created {
            info!(identity = self.identity(), id = %record.id, "created lead record");
        } else {
            debug!(identity = self.identity(), id = %record.id, "found existing lead record");
        }
        Ok(record)
    }

    async fn enrich(&self, inputs: &Inputs) -> Result<Enrichment> {
        let record = inputs.record()?;
        let all_done = Stage::ALL
            .iter()
            .all(|&stage| stored_status(record, stage) == EvaluationStatus::Completed);
        if all_done && !self.ctx.options.force {
            debug!(identity = self.identity(), "all stages completed; skipping provider calls");
            return Ok(Enrichment {
                profile: persist::profile_from_record(&self.lead, record),
                errors: Vec::new(),
                fetched: false,
            });
        }
        Ok(self.ctx.enrichment.enrich(&self.lead, &self.cost).await)
    }

    /// Apply the status discipline around `compute`.
    async fn run_stage<F, Fut>(&self, stage: Stage, record: &RecordRef, compute: F) -> Result<StageOutput>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Computed>>,
    {
        let fields = stage_fields(stage);
        let status = stored_status(record, stage);
        if status == EvaluationStatus::Completed && !self.ctx.options.force {
            debug!(identity = self.identity(), %stage, "stage already completed; skipping");
            return Ok(StageOutput::from_record(stage, record, &self.ctx.scoring));
        }

        self.write(Table::Leads, record, status_field(stage, EvaluationStatus::InProgress))
            .await?;

        let computed = match compute().await {
            Ok(computed) => computed,
            Err(e) => {
                self.revert(stage, record).await;
                return Err(e);
            }
        };

        let mut out = computed.extra;
        out.extend(status_field(stage, computed.status));
        if let (Some(score_field), Some(score)) = (fields.score, computed.result.score()) {
            out.insert(score_field.to_string(), FieldValue::Number(score));
        }
        let analysis = StoredAnalysis {
            formula_version: leadqual_scoring::FORMULA_VERSION,
            result: computed.result,
        };
        let analysis_json = serde_json::to_value(&analysis)
            .map_err(|e| LeadQualError::validation(format!("cannot serialise {stage} analysis: {e}")))?;
        out.insert(fields.analysis.to_string(), FieldValue::Json(analysis_json));

        if let Err(e) = self.write(Table::Leads, record, out).await {
            self.revert(stage, record).await;
            return Err(e);
        }

        info!(
            identity = self.identity(),
            %stage,
            status = %computed.status,
            score = ?analysis.result.score(),
            "stage finished"
        );
        Ok(StageOutput {
            stage,
            status: computed.status,
            ran: true,
            result: analysis.result,
            provider_errors: computed.provider_errors,
            review_reason: computed.review_reason,
        })
    }

    async fn revert(&self, stage: Stage, record: &RecordRef) {
        if let Err(e) = self
            .write(Table::Leads, record, status_field(stage, EvaluationStatus::NotStarted))
            .await
        {
            warn!(identity = self.identity(), %stage, error = %e, "failed to reset stage status");
        }
    }

    /// Ask the model for a structured reply, recording usage under `stage`.
    async fn ask<T: Reply>(&self, stage: Stage, prompt: &str) -> std::result::Result<T, LlmFailure> {
        let mut completion = self
            .ctx
            .llm
            .complete(replies::SYSTEM, prompt)
            .await
            .map_err(LlmFailure::Provider)?;
        if completion.model.is_empty() {
            completion.model = self.ctx.llm.model_name().to_string();
        }
        self.cost.record(stage.as_str(), &completion);
        parse_reply::<T>(&completion.text).map_err(|e| {
            warn!(identity = self.identity(), %stage, error = %e, "model reply rejected");
            LlmFailure::Invalid(e.to_string())
        })
    }
}

#[async_trait]
impl NodeRunner for LeadRunner {
    async fn run(&self, node: NodeId, inputs: Inputs) -> Result<NodeOutput> {
        match node {
            NodeId::StoreOrFind => self.store_or_find().await.map(NodeOutput::Record),
            NodeId::Enrich => self
                .enrich(&inputs)
                .await
                .map(|e| NodeOutput::Enrichment(Arc::new(e))),
            NodeId::IndividualEval | NodeId::CompanyEval | NodeId::TechnicalEval => {
                let stage = node.stage().ok_or_else(|| LeadQualError::pipeline("not a stage"))?;
                self.evaluate(stage, &inputs).await.map(stage_output)
            }
            NodeId::PainPointAnalysis => self.pain_points(&inputs).await.map(stage_output),
            NodeId::OfferCreation => self.offer(&inputs).await.map(stage_output),
            NodeId::CampaignGeneration => self.campaign(&inputs).await.map(stage_output),
            NodeId::PersistResults => self.persist(&inputs).await.map(NodeOutput::Persisted),
        }
    }
}

fn stage_output(output: StageOutput) -> NodeOutput {
    NodeOutput::Stage(Arc::new(output))
}

/// The stage's stored status; anything unreadable counts as `Not Started`.
pub fn stored_status(record: &RecordRef, stage: Stage) -> EvaluationStatus {
    record
        .text(stage_fields(stage).status)
        .and_then(EvaluationStatus::parse)
        .unwrap_or_default()
}

fn status_field(stage: Stage, status: EvaluationStatus) -> FieldMap {
    FieldMap::from([(
        stage_fields(stage).status.to_string(),
        FieldValue::text(status.as_str()),
    )])
}

fn profile_of(inputs: &Inputs) -> Result<&EnrichedProfile> {
    Ok(&inputs.enrichment()?.profile)
}
