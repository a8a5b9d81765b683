//! Batch orchestration: one task graph per lead, leads in parallel.
//!
//! Leads run on a bounded worker pool. A lead's failure is recorded in its
//! [`LeadReport`] and never stops the rest of the batch.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use leadqual_scoring::LeadScore;
use leadqual_shared::{EvaluationStatus, Lead, PipelineConfig, ProviderError, Result, Stage};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Instrument, error, info, info_span, instrument, warn};

use crate::context::PipelineContext;
use crate::cost::{CostSummary, CostTracker, UsageLog, UsageRecord};
use crate::executor::{self, ExecutorOptions, NodeOutcome};
use crate::graph::{NodeId, NodeOutput, TaskGraph};
use crate::stages::LeadRunner;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Overall result of one lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadOutcome {
    Succeeded,
    NeedsReview,
    Failed,
}

/// Serializable node state for reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum NodeStatus {
    Succeeded,
    Failed { error: String },
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct LeadReport {
    pub identity: String,
    pub lead_id: String,
    pub name: String,
    pub company: String,
    pub outcome: LeadOutcome,
    pub nodes: BTreeMap<NodeId, NodeStatus>,
    /// Status of every stage that produced output in this run.
    pub stages: BTreeMap<Stage, EvaluationStatus>,
    /// Stages that recomputed in this run (the rest were already complete).
    pub stages_run: Vec<Stage>,
    pub provider_errors: Vec<ProviderError>,
    pub score: Option<LeadScore>,
    pub usage: Vec<UsageRecord>,
    pub elapsed: Duration,
}

impl LeadReport {
    /// First failure message, for one-line summaries.
    pub fn first_error(&self) -> Option<String> {
        self.nodes.iter().find_map(|(node, status)| match status {
            NodeStatus::Failed { error } => Some(format!("{node}: {error}")),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub leads: Vec<LeadReport>,
    pub succeeded: usize,
    pub needs_review: usize,
    pub failed: usize,
    pub cost: CostSummary,
    pub elapsed: Duration,
}

impl BatchReport {
    /// Every model call of the batch, for `--usage-log`.
    pub fn usage_log(&self) -> UsageLog {
        UsageLog {
            summary: self.cost.clone(),
            detailed_log: self
                .leads
                .iter()
                .flat_map(|lead| lead.usage.iter().cloned())
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting batch status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called as each lead finishes, in completion order.
    fn lead_finished(&self, report: &LeadReport, current: usize, total: usize);
    /// Called when the batch completes.
    fn done(&self, report: &BatchReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn lead_finished(&self, _report: &LeadReport, _current: usize, _total: usize) {}
    fn done(&self, _report: &BatchReport) {}
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs lead pipelines against a shared [`PipelineContext`].
pub struct Orchestrator {
    ctx: Arc<PipelineContext>,
    graph: Arc<TaskGraph>,
    workers: usize,
    executor: ExecutorOptions,
}

impl Orchestrator {
    pub fn new(ctx: PipelineContext, pipeline: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            ctx: Arc::new(ctx),
            graph: Arc::new(TaskGraph::lead_pipeline()?),
            workers: pipeline.workers.max(1),
            executor: ExecutorOptions {
                mode: pipeline.execution,
                timeout: Duration::from_secs(pipeline.lead_timeout_secs.max(1)),
            },
        })
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Run one lead's graph to completion.
    pub async fn run_lead(&self, lead: Lead) -> LeadReport {
        run_lead(
            Arc::clone(&self.ctx),
            Arc::clone(&self.graph),
            self.executor.clone(),
            lead,
        )
        .await
    }

    /// Run every lead, at most `workers` at a time.
    #[instrument(skip_all, fields(leads = leads.len(), workers = self.workers))]
    pub async fn run_batch(&self, leads: Vec<Lead>, progress: &dyn ProgressReporter) -> BatchReport {
        let start = Instant::now();
        let total = leads.len();
        info!(total, "starting batch");
        progress.phase("Qualifying leads");

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        for lead in leads {
            let permit_source = Arc::clone(&semaphore);
            let ctx = Arc::clone(&self.ctx);
            let graph = Arc::clone(&self.graph);
            let options = self.executor.clone();
            tasks.spawn(async move {
                let _permit = permit_source.acquire_owned().await;
                run_lead(ctx, graph, options, lead).await
            });
        }

        let batch_cost = CostTracker::new(self.ctx.pricing.clone());
        let mut reports = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            let report = match joined {
                Ok(report) => report,
                Err(e) => {
                    // A panic escaped the executor; nothing is known about the lead.
                    error!(error = %e, "lead task panicked");
                    continue;
                }
            };
            batch_cost.extend(report.usage.iter().cloned());
            progress.lead_finished(&report, reports.len() + 1, total);
            reports.push(report);
        }

        reports.sort_by(|a, b| a.identity.cmp(&b.identity));
        let count = |outcome| reports.iter().filter(|r| r.outcome == outcome).count();
        let batch = BatchReport {
            succeeded: count(LeadOutcome::Succeeded),
            needs_review: count(LeadOutcome::NeedsReview),
            failed: count(LeadOutcome::Failed) + total.saturating_sub(reports.len()),
            cost: batch_cost.summary(),
            elapsed: start.elapsed(),
            leads: reports,
        };

        info!(
            succeeded = batch.succeeded,
            needs_review = batch.needs_review,
            failed = batch.failed,
            cost = batch.cost.total_cost,
            elapsed_ms = batch.elapsed.as_millis() as u64,
            "batch complete"
        );
        progress.done(&batch);
        batch
    }
}

async fn run_lead(
    ctx: Arc<PipelineContext>,
    graph: Arc<TaskGraph>,
    options: ExecutorOptions,
    lead: Lead,
) -> LeadReport {
    let start = Instant::now();
    let span = info_span!("lead", identity = lead.identity.as_str());
    let cost = Arc::new(CostTracker::new(ctx.pricing.clone()));
    let lead = Arc::new(lead);
    let runner = Arc::new(LeadRunner::new(ctx, Arc::clone(&lead), Arc::clone(&cost)));

    let outcomes = executor::execute(&graph, runner, &options)
        .instrument(span.clone())
        .await;

    let report = build_report(&lead, outcomes, cost.records(), start.elapsed());
    span.in_scope(|| match report.outcome {
        LeadOutcome::Failed => warn!(
            error = report.first_error().as_deref().unwrap_or("skipped"),
            "lead failed"
        ),
        outcome => info!(?outcome, score = ?report.score.as_ref().map(|s| s.overall), "lead finished"),
    });
    report
}

fn build_report(
    lead: &Lead,
    outcomes: BTreeMap<NodeId, NodeOutcome>,
    usage: Vec<UsageRecord>,
    elapsed: Duration,
) -> LeadReport {
    let mut nodes = BTreeMap::new();
    let mut stages = BTreeMap::new();
    let mut stages_run = Vec::new();
    let mut provider_errors = Vec::new();
    let mut score = None;
    let mut any_failed = false;
    let mut any_review = false;

    for (node, outcome) in outcomes {
        let status = match outcome {
            NodeOutcome::Succeeded(output) => {
                match output {
                    NodeOutput::Enrichment(enrichment) => {
                        provider_errors.extend(enrichment.errors.iter().cloned());
                    }
                    NodeOutput::Stage(stage) => {
                        stages.insert(stage.stage, stage.status);
                        if stage.ran {
                            stages_run.push(stage.stage);
                        }
                        any_review |= stage.status == EvaluationStatus::NeedsReview;
                        provider_errors.extend(stage.provider_errors.iter().cloned());
                    }
                    NodeOutput::Persisted(summary) => score = summary.score,
                    NodeOutput::Record(_) => {}
                }
                NodeStatus::Succeeded
            }
            NodeOutcome::Failed(error) => {
                any_failed = true;
                NodeStatus::Failed { error }
            }
            NodeOutcome::Skipped(reason) => {
                any_failed = true;
                NodeStatus::Skipped {
                    reason: reason.to_string(),
                }
            }
        };
        nodes.insert(node, status);
    }

    let outcome = if any_failed {
        LeadOutcome::Failed
    } else if any_review {
        LeadOutcome::NeedsReview
    } else {
        LeadOutcome::Succeeded
    };

    LeadReport {
        identity: lead.identity.as_str().to_string(),
        lead_id: lead.identity.lead_id(),
        name: lead.full_name(),
        company: lead.company.clone(),
        outcome,
        nodes,
        stages,
        stages_run,
        provider_errors,
        score,
        usage,
        elapsed,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use leadqual_providers::{Completion, LanguageModel, ProviderResult, TokenUsage};
    use leadqual_scoring::ScoringConfig;
    use leadqual_shared::{AppConfig, OfferMode};
    use leadqual_storage::{
        FieldMap, FieldValue, LibsqlRecordStore, RecordRef, RecordStore, Table, stage_fields,
    };
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    use super::*;
    use crate::context::{IdentityLocks, RunOptions};
    use crate::cost::Pricing;
    use crate::enrich::tests::{FakeCompany, FakeProfile, FakeResearch, lead};
    use crate::enrich::{EnrichmentCollector, ProviderSlot};
    use crate::retry::RetryConfig;

    const NARRATIVE: &str =
        r#"{"summary": "Strong operator at a growing company", "strengths": ["budget"], "concerns": []}"#;
    const PAINS: &str = r#"{"pain_points": [{"description": "Invoices are keyed by hand",
        "category": "process", "impact": "high", "solution": "Automate intake"}],
        "summary": "Back office runs on spreadsheets"}"#;
    const FIT: &str = r#"{"fit_score": 72, "reasons": ["manual work"], "recommendations": ["pilot"]}"#;
    const EMAILS: &str = r#"{"emails": [
        {"subject": "Quick idea", "body": "Hi Ada", "wait_days": 0},
        {"subject": "Following up", "body": "Hi again", "wait_days": 3},
        {"subject": "Last note", "body": "Closing the loop", "wait_days": 7}]}"#;
    const SHORT_EMAILS: &str = r#"{"emails": [
        {"subject": "New angle", "body": "Hi Ada", "wait_days": 0},
        {"subject": "One more thought", "body": "Hi again", "wait_days": 4}]}"#;

    /// Answers each prompt kind with a canned reply. One evaluation stage can
    /// be made to answer with prose instead of JSON, and the campaign can be
    /// switched to a two-email sequence. Replies carry no model name.
    #[derive(Default)]
    struct ScriptedModel {
        malformed: Option<Stage>,
        short_campaign: AtomicBool,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn calls(&self, prefix: &str) -> usize {
            self.prompts
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.starts_with(prefix))
                .count()
        }

        fn total_calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, _system: &str, prompt: &str) -> ProviderResult<Completion> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let broken = self
                .malformed
                .is_some_and(|stage| prompt.starts_with(&format!("Explain the {stage} fit")));
            let text = if broken {
                "Sure! Here is my analysis of the lead: {"
            } else if prompt.starts_with("Explain the") {
                NARRATIVE
            } else if prompt.starts_with("Identify the operational pain points") {
                PAINS
            } else if prompt.starts_with("Rate how well this offer fits") {
                FIT
            } else if self.short_campaign.load(Ordering::SeqCst) {
                SHORT_EMAILS
            } else {
                EMAILS
            };
            Ok(Completion {
                text: text.to_string(),
                usage: TokenUsage {
                    prompt_tokens: 100,
                    completion_tokens: 50,
                },
                model: String::new(),
            })
        }

        fn model_name(&self) -> &str {
            "gpt-4o-mini"
        }
    }

    /// Counts creates and updates made through the pipeline.
    struct CountingStore {
        inner: LibsqlRecordStore,
        lead_creates: AtomicUsize,
        draft_creates: AtomicUsize,
        updates: AtomicUsize,
        deletes: AtomicUsize,
    }

    #[async_trait]
    impl RecordStore for CountingStore {
        async fn find_by_identity(&self, table: Table, identity: &str) -> Result<Option<RecordRef>> {
            self.inner.find_by_identity(table, identity).await
        }

        async fn create(&self, table: Table, identity: &str, fields: FieldMap) -> Result<RecordRef> {
            let created = self.inner.create(table, identity, fields).await?;
            match table {
                Table::Leads => self.lead_creates.fetch_add(1, Ordering::SeqCst),
                Table::CampaignDrafts => self.draft_creates.fetch_add(1, Ordering::SeqCst),
            };
            Ok(created)
        }

        async fn update(&self, table: Table, record: &RecordRef, fields: FieldMap) -> Result<RecordRef> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            self.inner.update(table, record, fields).await
        }

        async fn delete(&self, table: Table, record: &RecordRef) -> Result<()> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            self.inner.delete(table, record).await
        }
    }

    struct Harness {
        store: Arc<CountingStore>,
        llm: Arc<ScriptedModel>,
        path: PathBuf,
    }

    impl Harness {
        async fn new(llm: ScriptedModel) -> Self {
            let path = std::env::temp_dir().join(format!("lq_test_{}.db", Uuid::now_v7()));
            let inner = LibsqlRecordStore::open(&path).await.expect("open store");
            Self {
                store: Arc::new(CountingStore {
                    inner,
                    lead_creates: AtomicUsize::new(0),
                    draft_creates: AtomicUsize::new(0),
                    updates: AtomicUsize::new(0),
                    deletes: AtomicUsize::new(0),
                }),
                llm: Arc::new(llm),
                path,
            }
        }

        fn orchestrator(&self, options: RunOptions) -> Orchestrator {
            let config = AppConfig::default();
            let ctx = PipelineContext {
                store: self.store.clone(),
                llm: self.llm.clone(),
                enrichment: EnrichmentCollector::new(&config.enrichment)
                    .with_profile(ProviderSlot::Enabled(Arc::new(FakeProfile)))
                    .with_company(ProviderSlot::Enabled(Arc::new(FakeCompany)))
                    .with_research(ProviderSlot::Enabled(Arc::new(FakeResearch))),
                scoring: ScoringConfig::from_app_config(&config).expect("sample scoring"),
                offers: config.offers.clone(),
                options,
                retry: RetryConfig::default(),
                pricing: Pricing::new(config.pricing.clone()),
                locks: IdentityLocks::default(),
            };
            let pipeline = PipelineConfig {
                workers: 4,
                ..PipelineConfig::default()
            };
            Orchestrator::new(ctx, &pipeline).expect("orchestrator")
        }

        async fn record(&self, identity: &str) -> RecordRef {
            self.store
                .find_by_identity(Table::Leads, identity)
                .await
                .expect("find")
                .expect("lead record exists")
        }

        fn writes(&self) -> usize {
            self.store.lead_creates.load(Ordering::SeqCst)
                + self.store.draft_creates.load(Ordering::SeqCst)
                + self.store.updates.load(Ordering::SeqCst)
                + self.store.deletes.load(Ordering::SeqCst)
        }

        async fn draft(&self, identity: &str) -> Option<RecordRef> {
            self.store
                .find_by_identity(Table::CampaignDrafts, identity)
                .await
                .expect("find draft")
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    fn status(record: &RecordRef, stage: Stage) -> Option<&str> {
        record.text(stage_fields(stage).status)
    }

    fn ada() -> Lead {
        lead("ada@northwind.io", "linkedin.com/in/ada", "https://northwind.io")
    }

    #[tokio::test]
    async fn full_run_completes_every_stage() {
        let harness = Harness::new(ScriptedModel::default()).await;
        let report = harness
            .orchestrator(RunOptions::default())
            .run_lead(ada())
            .await;

        assert_eq!(report.outcome, LeadOutcome::Succeeded, "{:?}", report.first_error());
        assert_eq!(report.stages_run, Stage::ALL.to_vec());
        assert!(report.nodes.values().all(|s| *s == NodeStatus::Succeeded));

        let record = harness.record("email:ada@northwind.io").await;
        for stage in Stage::ALL {
            assert_eq!(status(&record, stage), Some(EvaluationStatus::Completed.as_str()), "{stage}");
        }
        let score = report.score.expect("lead score");
        assert_eq!(record.number(leadqual_storage::leads::LEAD_SCORE), Some(score.overall));
        assert_eq!(
            record.text(leadqual_storage::leads::BEST_OFFER_ID),
            Some("workflow-automation")
        );
        assert_eq!(harness.store.draft_creates.load(Ordering::SeqCst), 3);
        assert!(report.usage.iter().any(|u| u.stage == "enrich"));
        assert!(
            report
                .usage
                .iter()
                .filter(|u| u.stage != "enrich")
                .all(|u| u.model == "gpt-4o-mini")
        );
    }

    #[tokio::test]
    async fn shorter_regenerated_campaign_drops_trailing_drafts() {
        let harness = Harness::new(ScriptedModel::default()).await;
        let first = harness
            .orchestrator(RunOptions::default())
            .run_lead(ada())
            .await;
        assert_eq!(first.outcome, LeadOutcome::Succeeded);
        assert!(harness.draft("email:ada@northwind.io#3").await.is_some());

        harness.llm.short_campaign.store(true, Ordering::SeqCst);
        let second = harness
            .orchestrator(RunOptions {
                force: true,
                ..RunOptions::default()
            })
            .run_lead(ada())
            .await;

        assert_eq!(second.outcome, LeadOutcome::Succeeded, "{:?}", second.first_error());
        let kept = harness.draft("email:ada@northwind.io#2").await.expect("second draft");
        assert_eq!(
            kept.text(leadqual_storage::drafts::SUBJECT),
            Some("One more thought")
        );
        assert!(harness.draft("email:ada@northwind.io#3").await.is_none());
        assert_eq!(harness.store.deletes.load(Ordering::SeqCst), 1);
        assert_eq!(harness.store.draft_creates.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn rerun_of_a_completed_lead_writes_nothing() {
        let harness = Harness::new(ScriptedModel::default()).await;
        let orchestrator = harness.orchestrator(RunOptions::default());
        let first = orchestrator.run_lead(ada()).await;
        assert_eq!(first.outcome, LeadOutcome::Succeeded);

        let writes = harness.writes();
        let calls = harness.llm.total_calls();
        let second = orchestrator.run_lead(ada()).await;

        assert_eq!(second.outcome, LeadOutcome::Succeeded);
        assert!(second.stages_run.is_empty());
        assert_eq!(harness.writes(), writes);
        assert_eq!(harness.llm.total_calls(), calls);
        assert_eq!(
            second.score.map(|s| s.overall),
            first.score.map(|s| s.overall)
        );
    }

    #[tokio::test]
    async fn lead_without_linkedin_still_gets_company_evaluation() {
        let harness = Harness::new(ScriptedModel::default()).await;
        let report = harness
            .orchestrator(RunOptions::default())
            .run_lead(lead("grace@northwind.io", "", "https://northwind.io"))
            .await;

        assert!(
            report
                .provider_errors
                .iter()
                .any(|e| e.provider == "profile" && e.message.contains("no LinkedIn URL")),
            "{:?}",
            report.provider_errors
        );
        assert_eq!(report.stages[&Stage::Company], EvaluationStatus::Completed);
        let record = harness.record("email:grace@northwind.io").await;
        assert_eq!(status(&record, Stage::Company), Some(EvaluationStatus::Completed.as_str()));
    }

    #[tokio::test]
    async fn only_unfinished_stages_are_recomputed_per_lead() {
        let harness = Harness::new(ScriptedModel::default()).await;
        let company = stage_fields(Stage::Company);
        let score_field = company.score.expect("company score field");
        harness
            .store
            .inner
            .create(
                Table::Leads,
                "email:x@northwind.io",
                FieldMap::from([
                    (company.status.to_string(), FieldValue::text(EvaluationStatus::Completed.as_str())),
                    (score_field.to_string(), FieldValue::Number(88.0)),
                ]),
            )
            .await
            .expect("seed");

        let batch = harness
            .orchestrator(RunOptions::default())
            .run_batch(
                vec![
                    lead("x@northwind.io", "linkedin.com/in/x", "https://northwind.io"),
                    lead("y@northwind.io", "linkedin.com/in/y", "https://northwind.io"),
                ],
                &SilentProgress,
            )
            .await;

        assert_eq!(batch.failed, 0);
        assert_eq!(harness.llm.calls("Explain the company fit"), 1);
        assert_eq!(harness.llm.calls("Explain the individual fit"), 2);

        let x = harness.record("email:x@northwind.io").await;
        assert_eq!(x.number(score_field), Some(88.0));
        let y = harness.record("email:y@northwind.io").await;
        assert_eq!(status(&y, Stage::Company), Some(EvaluationStatus::Completed.as_str()));
    }

    #[tokio::test]
    async fn malformed_reply_flags_only_that_stage() {
        let harness = Harness::new(ScriptedModel {
            malformed: Some(Stage::Technical),
            ..ScriptedModel::default()
        })
        .await;
        let report = harness
            .orchestrator(RunOptions::default())
            .run_lead(ada())
            .await;

        assert_eq!(report.outcome, LeadOutcome::NeedsReview);
        let record = harness.record("email:ada@northwind.io").await;
        assert_eq!(
            status(&record, Stage::Technical),
            Some(EvaluationStatus::NeedsReview.as_str())
        );
        assert!(record.number(stage_fields(Stage::Technical).score.expect("field")).is_some());
        for stage in [Stage::Individual, Stage::Company, Stage::PainPoint, Stage::Offer] {
            assert_eq!(status(&record, stage), Some(EvaluationStatus::Completed.as_str()), "{stage}");
        }
    }

    #[tokio::test]
    async fn unknown_offer_fails_the_node_and_resets_its_status() {
        let harness = Harness::new(ScriptedModel::default()).await;
        let report = harness
            .orchestrator(RunOptions {
                mode: OfferMode::EvaluateSingle,
                offer_id: Some("no-such-offer".into()),
                force: false,
            })
            .run_lead(ada())
            .await;

        assert_eq!(report.outcome, LeadOutcome::Failed);
        assert!(matches!(
            &report.nodes[&NodeId::OfferCreation],
            NodeStatus::Failed { error } if error.contains("no-such-offer")
        ));
        assert!(matches!(
            report.nodes[&NodeId::CampaignGeneration],
            NodeStatus::Skipped { .. }
        ));
        assert!(matches!(report.nodes[&NodeId::PersistResults], NodeStatus::Skipped { .. }));

        let record = harness.record("email:ada@northwind.io").await;
        assert_eq!(status(&record, Stage::Offer), Some(EvaluationStatus::NotStarted.as_str()));
        assert_eq!(status(&record, Stage::Company), Some(EvaluationStatus::Completed.as_str()));
    }

    #[tokio::test]
    async fn duplicate_leads_in_one_batch_share_a_record() {
        let harness = Harness::new(ScriptedModel::default()).await;
        let batch = harness
            .orchestrator(RunOptions::default())
            .run_batch(vec![ada(), ada(), ada()], &SilentProgress)
            .await;

        assert_eq!(batch.leads.len(), 3);
        assert_eq!(batch.failed, 0);
        assert_eq!(harness.store.lead_creates.load(Ordering::SeqCst), 1);
        assert_eq!(harness.store.draft_creates.load(Ordering::SeqCst), 3);
    }
}
