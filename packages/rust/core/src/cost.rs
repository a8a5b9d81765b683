//! Token and dollar accounting for model calls.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use leadqual_providers::Completion;
use leadqual_shared::PricingEntry;
use serde::Serialize;
use tracing::warn;

/// One recorded model call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub model: String,
    /// Pipeline step that made the call (`enrich`, `individual`, `offer`, ...).
    pub stage: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost: f64,
}

impl UsageRecord {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Totals for one stage or model.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageTotals {
    pub calls: usize,
    pub total_tokens: u64,
    pub total_cost: f64,
}

/// Aggregated view of a usage log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CostSummary {
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub by_stage: BTreeMap<String, UsageTotals>,
    pub by_model: BTreeMap<String, UsageTotals>,
}

/// Shape of the `--usage-log` file.
#[derive(Debug, Serialize)]
pub struct UsageLog {
    pub summary: CostSummary,
    pub detailed_log: Vec<UsageRecord>,
}

/// Per-model token prices.
#[derive(Debug, Clone, Default)]
pub struct Pricing {
    entries: Vec<PricingEntry>,
}

impl Pricing {
    pub fn new(entries: Vec<PricingEntry>) -> Self {
        Self { entries }
    }

    /// Dollar cost of a call, or `None` when the model has no price entry.
    ///
    /// Provider prefixes (`openai/gpt-4o-mini`) are ignored, and dated
    /// snapshots (`gpt-4o-mini-2024-07-18`) fall back to the longest
    /// matching entry name.
    pub fn cost(&self, model: &str, prompt_tokens: u64, completion_tokens: u64) -> Option<f64> {
        let model = model.rsplit('/').next().unwrap_or(model);
        let entry = self
            .entries
            .iter()
            .find(|e| e.model == model)
            .or_else(|| {
                self.entries
                    .iter()
                    .filter(|e| model.starts_with(&e.model))
                    .max_by_key(|e| e.model.len())
            })?;

        let unit = entry.unit_of_tokens.max(1) as f64;
        let cost = (prompt_tokens as f64 * entry.prompt_price
            + completion_tokens as f64 * entry.completion_price)
            / unit;
        Some((cost * 1e6).round() / 1e6)
    }
}

/// Thread-safe usage log. One per lead; merged into the batch tracker.
#[derive(Debug, Default)]
pub struct CostTracker {
    pricing: Pricing,
    records: Mutex<Vec<UsageRecord>>,
}

impl CostTracker {
    pub fn new(pricing: Pricing) -> Self {
        Self {
            pricing,
            records: Mutex::new(Vec::new()),
        }
    }

    /// Record the usage of one completion.
    pub fn record(&self, stage: &str, completion: &Completion) {
        let usage = completion.usage;
        let cost = self
            .pricing
            .cost(&completion.model, usage.prompt_tokens, usage.completion_tokens)
            .unwrap_or_else(|| {
                warn!(model = %completion.model, "no pricing entry for model, recording zero cost");
                0.0
            });

        self.push(UsageRecord {
            timestamp: Utc::now(),
            model: completion.model.clone(),
            stage: stage.to_string(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            cost,
        });
    }

    /// Append records produced elsewhere (e.g. a finished lead's tracker).
    pub fn extend(&self, records: impl IntoIterator<Item = UsageRecord>) {
        let mut guard = self.records.lock().unwrap_or_else(|e| e.into_inner());
        guard.extend(records);
    }

    fn push(&self, record: UsageRecord) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }

    pub fn records(&self) -> Vec<UsageRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn summary(&self) -> CostSummary {
        summarize(&self.records())
    }

    pub fn usage_log(&self) -> UsageLog {
        let detailed_log = self.records();
        UsageLog {
            summary: summarize(&detailed_log),
            detailed_log,
        }
    }
}

fn summarize(records: &[UsageRecord]) -> CostSummary {
    let mut summary = CostSummary::default();
    for record in records {
        summary.total_prompt_tokens += record.prompt_tokens;
        summary.total_completion_tokens += record.completion_tokens;
        summary.total_tokens += record.total_tokens();
        summary.total_cost += record.cost;

        add(summary.by_stage.entry(record.stage.clone()).or_default(), record);
        add(summary.by_model.entry(record.model.clone()).or_default(), record);
    }
    summary.total_cost = (summary.total_cost * 1e4).round() / 1e4;
    summary
}

fn add(totals: &mut UsageTotals, record: &UsageRecord) {
    totals.calls += 1;
    totals.total_tokens += record.total_tokens();
    totals.total_cost += record.cost;
}

#[cfg(test)]
mod tests {
    use leadqual_providers::TokenUsage;
    use pretty_assertions::assert_eq;

    use super::*;

    fn pricing() -> Pricing {
        Pricing::new(vec![
            PricingEntry {
                model: "gpt-4o-mini".into(),
                prompt_price: 0.15,
                completion_price: 0.60,
                unit_of_tokens: 1_000_000,
            },
            PricingEntry {
                model: "gpt-4o".into(),
                prompt_price: 2.5,
                completion_price: 10.0,
                unit_of_tokens: 1_000_000,
            },
        ])
    }

    fn completion(model: &str, prompt: u64, completion: u64) -> Completion {
        Completion {
            text: "{}".into(),
            usage: TokenUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
            },
            model: model.into(),
        }
    }

    #[test]
    fn cost_uses_per_unit_prices() {
        let cost = pricing().cost("gpt-4o-mini", 1_000_000, 1_000_000).expect("priced");
        assert!((cost - 0.75).abs() < 1e-9);
    }

    #[test]
    fn dated_and_prefixed_models_resolve_to_longest_entry() {
        let p = pricing();
        assert_eq!(
            p.cost("gpt-4o-mini-2024-07-18", 1000, 0),
            p.cost("gpt-4o-mini", 1000, 0)
        );
        assert_eq!(p.cost("openai/gpt-4o", 1000, 0), p.cost("gpt-4o", 1000, 0));
        assert_eq!(p.cost("claude-x", 1000, 0), None);
    }

    #[test]
    fn summary_groups_by_stage_and_model() {
        let tracker = CostTracker::new(pricing());
        tracker.record("individual", &completion("gpt-4o-mini", 100, 50));
        tracker.record("company", &completion("gpt-4o-mini", 100, 50));
        tracker.record("company", &completion("mystery-model", 10, 10));

        let summary = tracker.summary();
        assert_eq!(summary.total_tokens, 320);
        assert_eq!(summary.by_stage["company"].calls, 2);
        assert_eq!(summary.by_model["gpt-4o-mini"].total_tokens, 300);
        assert_eq!(summary.by_model["mystery-model"].total_cost, 0.0);
    }

    #[test]
    fn extend_merges_lead_trackers() {
        let lead = CostTracker::new(pricing());
        lead.record("offer", &completion("gpt-4o", 10, 10));
        let batch = CostTracker::new(pricing());
        batch.extend(lead.records());
        assert_eq!(batch.records().len(), 1);
        assert_eq!(batch.usage_log().detailed_log.len(), 1);
    }
}
