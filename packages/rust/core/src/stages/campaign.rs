//! Campaign generation: an outreach email sequence for the recommended offer.
//!
//! Each email is a `Campaign Drafts` record with identity
//! `<lead identity>#<position>`, found or created with the same discipline as
//! lead records. Regenerating a sequence rewrites subject, body and timing but
//! leaves a draft's review status alone. Drafts past the end of a shorter
//! regenerated sequence are deleted.

use leadqual_shared::{Result, Stage};
use leadqual_storage::{FieldMap, FieldValue, Table, drafts};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::replies::{self, CampaignReply};
use super::{Computed, LeadRunner, LlmFailure, StageOutput, StageResult, profile_of};
use crate::graph::Inputs;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailSummary {
    pub position: u32,
    pub subject: String,
    pub wait_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignSummary {
    pub offer_id: String,
    pub emails: Vec<EmailSummary>,
}

/// Identity of the draft at `position` (1-based) for a lead.
pub fn draft_identity(lead_identity: &str, position: u32) -> String {
    format!("{lead_identity}#{position}")
}

impl LeadRunner {
    pub(super) async fn campaign(&self, inputs: &Inputs) -> Result<StageOutput> {
        let stage = Stage::Campaign;
        let record = inputs.record()?;
        let profile = profile_of(inputs)?;
        let pain = inputs.stage(Stage::PainPoint).ok().and_then(|p| p.pain_report().cloned());
        let best = inputs
            .stage(Stage::Offer)?
            .offer()
            .and_then(|rec| rec.best.clone());

        self.run_stage(stage, record, || async move {
            let Some(best) = best else {
                return Ok(Computed::needs_review(
                    StageResult::Unavailable,
                    LlmFailure::Invalid("no recommended offer to build a campaign on".into()),
                ));
            };
            let Some(offer) = self.ctx.offers.iter().find(|o| o.id == best.offer_id) else {
                return Ok(Computed::needs_review(
                    StageResult::Unavailable,
                    LlmFailure::Invalid(format!("offer {} is no longer in the catalogue", best.offer_id)),
                ));
            };

            let prompt = replies::campaign_prompt(profile, offer, pain.as_ref());
            let reply = match self.ask::<CampaignReply>(stage, &prompt).await {
                Ok(reply) => reply,
                Err(failure) => return Ok(Computed::needs_review(StageResult::Unavailable, failure)),
            };

            let mut emails = Vec::with_capacity(reply.emails.len());
            for (index, email) in reply.emails.into_iter().enumerate() {
                let position = index as u32 + 1;
                let identity = draft_identity(self.identity(), position);

                let mut content = FieldMap::new();
                content.insert(drafts::SUBJECT.into(), FieldValue::text(&email.subject));
                content.insert(drafts::BODY.into(), FieldValue::text(&email.body));
                content.insert(drafts::WAIT_DAYS.into(), FieldValue::Number(email.wait_days.into()));
                content.insert(drafts::OFFER_ID.into(), FieldValue::text(&offer.id));

                let mut initial = content.clone();
                initial.insert(drafts::LEAD_IDENTITY.into(), FieldValue::text(self.identity()));
                initial.insert(drafts::LEAD_ID.into(), FieldValue::text(self.lead.identity.lead_id()));
                initial.insert(drafts::POSITION.into(), FieldValue::Number(position.into()));
                initial.insert(drafts::STATUS.into(), FieldValue::text("Drafted"));

                let (draft, created) = self
                    .find_or_create(Table::CampaignDrafts, &identity, initial)
                    .await?;
                if !created {
                    self.write(Table::CampaignDrafts, &draft, content).await?;
                }
                debug!(draft = %identity, created, "campaign draft saved");

                emails.push(EmailSummary {
                    position,
                    subject: email.subject,
                    wait_days: email.wait_days,
                });
            }

            let mut position = emails.len() as u32 + 1;
            while let Some(stale) = self
                .find(Table::CampaignDrafts, &draft_identity(self.identity(), position))
                .await?
            {
                self.remove(Table::CampaignDrafts, &stale).await?;
                debug!(draft = %stale.identity, "stale campaign draft removed");
                position += 1;
            }

            Ok(Computed::completed(StageResult::Campaign(CampaignSummary {
                offer_id: offer.id.clone(),
                emails,
            })))
        })
        .await
    }
}
