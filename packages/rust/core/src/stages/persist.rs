//! PersistResults: aggregate lead score, enrichment blobs and `Last Evaluated`.
//!
//! Writes only when at least one stage ran in this run, and only the fields
//! whose coerced values differ from the stored record.

use std::collections::BTreeMap;

use chrono::Utc;
use leadqual_scoring::{FORMULA_VERSION, LeadScore};
use leadqual_shared::{CompanyData, EnrichedProfile, Lead, ProfileData, Result, Stage};
use leadqual_storage::{FieldMap, FieldValue, RecordRef, Table, leads};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::LeadRunner;
use crate::graph::Inputs;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PersistSummary {
    /// Names of the fields written; empty for a no-op rerun.
    pub written: Vec<String>,
    pub score: Option<LeadScore>,
}

/// Stored shape of `Research Data`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredResearch {
    questions_asked: usize,
    answers: BTreeMap<String, String>,
}

impl LeadRunner {
    pub(super) async fn persist(&self, inputs: &Inputs) -> Result<PersistSummary> {
        let record = inputs.record()?;
        let enrichment = inputs.enrichment()?;

        let mut outputs = Vec::with_capacity(Stage::ALL.len());
        for stage in Stage::ALL {
            outputs.push(inputs.stage(stage)?);
        }

        let score = LeadScore::from_results(outputs.iter().filter_map(|output| {
            let category = output.stage.category()?;
            Some((category, output.evaluation()?.clone()))
        }));

        if !outputs.iter().any(|o| o.ran) {
            debug!(identity = self.identity(), "no stage ran; nothing to persist");
            return Ok(PersistSummary {
                written: Vec::new(),
                score: Some(score),
            });
        }

        let mut fields = FieldMap::new();
        fields.insert(leads::LEAD_SCORE.into(), FieldValue::Number(score.overall));
        fields.insert(leads::LEAD_TIER.into(), FieldValue::text(score.tier.as_str()));
        fields.insert(
            leads::FORMULA_VERSION.into(),
            FieldValue::Number(FORMULA_VERSION.into()),
        );
        fields.insert(
            leads::LAST_EVALUATED.into(),
            FieldValue::Date(Utc::now().date_naive()),
        );

        if enrichment.fetched {
            let profile = &enrichment.profile;
            if let Some(data) = &profile.profile {
                fields.insert(leads::PROFILE_DATA.into(), json(data));
            }
            if let Some(data) = &profile.company {
                fields.insert(leads::COMPANY_DATA.into(), json(data));
            }
            fields.insert(
                leads::RESEARCH_DATA.into(),
                json(&StoredResearch {
                    questions_asked: profile.questions_asked,
                    answers: profile.research.clone(),
                }),
            );
            fields.insert(leads::ENRICHMENT_ERRORS.into(), json(&enrichment.errors));
        }

        let changed = changed_fields(record, fields);
        if changed.is_empty() {
            debug!(identity = self.identity(), "aggregate fields unchanged");
            return Ok(PersistSummary {
                written: Vec::new(),
                score: Some(score),
            });
        }

        let written: Vec<String> = changed.keys().cloned().collect();
        self.write(Table::Leads, record, changed).await?;
        info!(
            identity = self.identity(),
            overall = score.overall,
            tier = %score.tier,
            fields = written.len(),
            "lead results persisted"
        );
        Ok(PersistSummary {
            written,
            score: Some(score),
        })
    }
}

fn json<T: Serialize>(value: &T) -> FieldValue {
    FieldValue::Json(serde_json::to_value(value).unwrap_or_default())
}

/// Coerce `fields` and keep those that differ from the stored record.
fn changed_fields(record: &RecordRef, fields: FieldMap) -> FieldMap {
    Table::Leads
        .schema()
        .coerce(fields)
        .into_iter()
        .filter(|(name, value)| record.get(name) != Some(value))
        .collect()
}

/// Rebuild an enriched profile from the blobs of an earlier run.
pub(super) fn profile_from_record(lead: &Lead, record: &RecordRef) -> EnrichedProfile {
    fn blob<T: serde::de::DeserializeOwned>(record: &RecordRef, field: &str) -> Option<T> {
        let value = record.get(field)?.as_json()?;
        serde_json::from_value(value.clone()).ok()
    }

    let research: StoredResearch = blob(record, leads::RESEARCH_DATA).unwrap_or_default();
    let mut profile = EnrichedProfile::from_lead(lead.clone());
    profile.profile = blob::<ProfileData>(record, leads::PROFILE_DATA);
    profile.company = blob::<CompanyData>(record, leads::COMPANY_DATA);
    profile.research = research.answers;
    profile.questions_asked = research.questions_asked;
    profile
}
