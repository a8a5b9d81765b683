//! Offer creation: match the lead against the offer catalogue.
//!
//! `find-best` scores every catalogue offer and keeps the best plus up to two
//! alternatives; `evaluate-single` scores only the requested offer.

use leadqual_shared::{LeadQualError, Offer, OfferMode, Result, Stage};
use leadqual_storage::{FieldValue, leads};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::replies::{self, OfferFit};
use super::{Computed, LeadRunner, LlmFailure, StageOutput, StageResult, profile_of};
use crate::graph::Inputs;

const ALTERNATIVES: usize = 2;

/// One scored offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferMatch {
    pub offer_id: String,
    pub offer_name: String,
    pub fit_score: f64,
    pub reasons: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferRecommendation {
    pub mode: OfferMode,
    pub best: Option<OfferMatch>,
    #[serde(default)]
    pub alternatives: Vec<OfferMatch>,
}

impl LeadRunner {
    pub(super) async fn offer(&self, inputs: &Inputs) -> Result<StageOutput> {
        let stage = Stage::Offer;
        let record = inputs.record()?;
        let profile = profile_of(inputs)?;
        let pain = inputs.stage(Stage::PainPoint)?;

        self.run_stage(stage, record, || async move {
            let candidates = self.offer_candidates()?;
            let mut computed = Computed::completed(StageResult::Unavailable);
            if candidates.is_empty() {
                computed.flag(LlmFailure::Invalid("offer catalogue is empty".into()));
            }

            let mut matches = Vec::with_capacity(candidates.len());
            for offer in candidates {
                let prompt = replies::offer_prompt(profile, pain.pain_report(), offer);
                match self.ask::<OfferFit>(stage, &prompt).await {
                    Ok(fit) => {
                        debug!(offer = %offer.id, fit = fit.fit_score, "offer scored");
                        matches.push(OfferMatch {
                            offer_id: offer.id.clone(),
                            offer_name: offer.name.clone(),
                            fit_score: fit.fit_score,
                            reasons: fit.reasons,
                            recommendations: fit.recommendations,
                        });
                    }
                    Err(failure) => computed.flag(match failure {
                        LlmFailure::Invalid(reason) => {
                            LlmFailure::Invalid(format!("offer {}: {reason}", offer.id))
                        }
                        other => other,
                    }),
                }
            }

            // Stable: equal scores keep catalogue order.
            matches.sort_by(|a, b| b.fit_score.total_cmp(&a.fit_score));
            let mut ranked = matches.into_iter();
            let best = ranked.next();
            if let Some(best) = &best {
                computed
                    .extra
                    .insert(leads::BEST_OFFER_ID.into(), FieldValue::text(&best.offer_id));
            }
            computed.result = StageResult::Offer(OfferRecommendation {
                mode: self.ctx.options.mode,
                best,
                alternatives: ranked.take(ALTERNATIVES).collect(),
            });
            Ok(computed)
        })
        .await
    }

    /// Offers to score for this run. An unknown `--offer-id` is a hard failure.
    fn offer_candidates(&self) -> Result<Vec<&Offer>> {
        match self.ctx.options.mode {
            OfferMode::FindBest => Ok(self.ctx.offers.iter().collect()),
            OfferMode::EvaluateSingle => {
                let id = self.ctx.options.offer_id.as_deref().unwrap_or_default();
                self.ctx
                    .offers
                    .iter()
                    .find(|o| o.id == id)
                    .map(|o| vec![o])
                    .ok_or_else(|| LeadQualError::pipeline(format!("unknown offer id {id:?}")))
            }
        }
    }
}
