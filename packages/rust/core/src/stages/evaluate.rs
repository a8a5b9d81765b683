//! Category evaluation stages: individual, company, technical and pain point.
//!
//! Scores always come from the scoring engine. The model only supplies the
//! narrative (or the pain points feeding the market score); if that reply is
//! unusable the deterministic score is still written and the stage is
//! flagged for review.

use leadqual_scoring::{Attributes, score};
use leadqual_shared::{Category, LeadQualError, Result, Stage};

use super::replies::{self, Narrative, PainPointReport};
use super::{Computed, LeadRunner, StageOutput, StageResult, profile_of};
use crate::graph::Inputs;

impl LeadRunner {
    pub(super) async fn evaluate(&self, stage: Stage, inputs: &Inputs) -> Result<StageOutput> {
        let record = inputs.record()?;
        let profile = profile_of(inputs)?;
        let category = stage
            .category()
            .ok_or_else(|| LeadQualError::pipeline(format!("{stage} is not a scoring stage")))?;

        self.run_stage(stage, record, || async move {
            let attrs = Attributes::from_profile(profile);
            let result = score(category, &attrs, &self.ctx.scoring);
            let prompt = replies::evaluation_prompt(stage, profile, &result);

            Ok(match self.ask::<Narrative>(stage, &prompt).await {
                Ok(narrative) => Computed::completed(StageResult::Evaluation {
                    result,
                    narrative: Some(narrative),
                }),
                Err(failure) => Computed::needs_review(
                    StageResult::Evaluation {
                        result,
                        narrative: None,
                    },
                    failure,
                ),
            })
        })
        .await
    }

    pub(super) async fn pain_points(&self, inputs: &Inputs) -> Result<StageOutput> {
        let stage = Stage::PainPoint;
        let record = inputs.record()?;
        let profile = profile_of(inputs)?;

        let mut evaluations = Vec::new();
        for evaluated in [Stage::Individual, Stage::Company, Stage::Technical] {
            if let Some(result) = inputs.stage(evaluated)?.evaluation() {
                evaluations.push((evaluated, result.total));
            }
        }

        self.run_stage(stage, record, || async move {
            let attrs = Attributes::from_profile(profile);
            let prompt = replies::pain_point_prompt(profile, &evaluations);

            Ok(match self.ask::<PainPointReport>(stage, &prompt).await {
                Ok(report) => {
                    let attrs = attrs.with_pain(report.severity(), &report.text());
                    Computed::completed(StageResult::PainPoints {
                        result: score(Category::Market, &attrs, &self.ctx.scoring),
                        report: Some(report),
                    })
                }
                Err(failure) => Computed::needs_review(
                    StageResult::PainPoints {
                        result: score(Category::Market, &attrs, &self.ctx.scoring),
                        report: None,
                    },
                    failure,
                ),
            })
        })
        .await
    }
}
