//! Structured model replies and the prompts that ask for them.
//!
//! Replies are deserialised strictly from the whole completion text. A reply
//! that does not parse, or parses but fails [`Reply::check`], is a
//! `ValidationError` and sends the stage to `Needs Review`.

use leadqual_scoring::{EvaluationResult, PainSeverity};
use leadqual_shared::coerce::coerce_number;
use leadqual_shared::{EnrichedProfile, LeadQualError, Offer, Result, Stage};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// A structured reply with semantic checks beyond its shape.
pub trait Reply: DeserializeOwned {
    fn check(&self) -> std::result::Result<(), String> {
        Ok(())
    }
}

/// Parse a completion as `T`. No substring recovery: the text must be the object.
pub fn parse_reply<T: Reply>(text: &str) -> Result<T> {
    let reply: T = serde_json::from_str(text.trim())
        .map_err(|e| LeadQualError::validation(format!("malformed model reply: {e}")))?;
    reply
        .check()
        .map_err(|reason| LeadQualError::validation(format!("invalid model reply: {reason}")))?;
    Ok(reply)
}

// ---------------------------------------------------------------------------
// Reply schemas
// ---------------------------------------------------------------------------

/// Narrative accompanying a deterministic category score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narrative {
    pub summary: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub concerns: Vec<String>,
}

impl Reply for Narrative {
    fn check(&self) -> std::result::Result<(), String> {
        if self.summary.trim().is_empty() {
            return Err("summary is empty".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PainCategory {
    Technical,
    Operational,
    Process,
    Automation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PainPoint {
    pub description: String,
    pub category: PainCategory,
    pub impact: PainSeverity,
    #[serde(default)]
    pub solution: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PainPointReport {
    pub pain_points: Vec<PainPoint>,
    pub summary: String,
}

impl PainPointReport {
    /// The strongest impact found; `None` when no pain points were reported.
    pub fn severity(&self) -> PainSeverity {
        self.pain_points
            .iter()
            .map(|p| p.impact)
            .max()
            .unwrap_or(PainSeverity::None)
    }

    /// Text used for pain keyword matching.
    pub fn text(&self) -> String {
        let mut parts: Vec<&str> = self
            .pain_points
            .iter()
            .map(|p| p.description.as_str())
            .collect();
        parts.push(&self.summary);
        parts.join("\n")
    }
}

impl Reply for PainPointReport {
    fn check(&self) -> std::result::Result<(), String> {
        if let Some(i) = self
            .pain_points
            .iter()
            .position(|p| p.description.trim().is_empty())
        {
            return Err(format!("pain point {i} has no description"));
        }
        Ok(())
    }
}

/// Fit of one offer for a lead. `fit_score` accepts numbers and the textual
/// encodings the record store accepts (`"85/100"`, `"High"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferFit {
    #[serde(deserialize_with = "lenient_score")]
    pub fit_score: f64,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl Reply for OfferFit {
    fn check(&self) -> std::result::Result<(), String> {
        if !(0.0..=100.0).contains(&self.fit_score) {
            return Err(format!("fit_score {} outside 0..=100", self.fit_score));
        }
        Ok(())
    }
}

fn lenient_score<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => coerce_number(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unrecognised score {s:?}"))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailDraft {
    pub subject: String,
    pub body: String,
    /// Days to wait after the previous email (0 for the first).
    #[serde(default)]
    pub wait_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignReply {
    pub emails: Vec<EmailDraft>,
}

impl Reply for CampaignReply {
    fn check(&self) -> std::result::Result<(), String> {
        if self.emails.is_empty() {
            return Err("no emails".into());
        }
        for (i, email) in self.emails.iter().enumerate() {
            if email.subject.trim().is_empty() || email.body.trim().is_empty() {
                return Err(format!("email {} is missing a subject or body", i + 1));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

pub const SYSTEM: &str = "You are a B2B sales analyst qualifying leads against an ideal \
customer profile. Reply with a single JSON object and nothing else.";

fn lead_context(profile: &EnrichedProfile) -> String {
    let lead = &profile.lead;
    let mut lines = vec![
        format!("Name: {}", lead.full_name()),
        format!("Company: {}", lead.company),
        format!("Role: {}", profile.role().unwrap_or("unknown")),
        format!("Seniority: {}", profile.seniority().unwrap_or("unknown")),
        format!("Industry: {}", profile.industry().unwrap_or("unknown")),
        format!(
            "Employees: {}",
            profile
                .employee_count()
                .map_or_else(|| "unknown".to_string(), |n| n.to_string())
        ),
        format!("Location: {}", profile.location().unwrap_or_default()),
    ];
    let technologies = profile.technologies();
    if !technologies.is_empty() {
        lines.push(format!(
            "Technologies: {}",
            technologies.into_iter().collect::<Vec<_>>().join(", ")
        ));
    }
    if let Some(funding) = profile.funding() {
        lines.push(format!("Funding: {funding}"));
    }
    if !lead.seo_description.is_empty() {
        lines.push(format!("Company description: {}", lead.seo_description));
    }
    lines.join("\n")
}

fn research_context(profile: &EnrichedProfile) -> String {
    if profile.research.is_empty() {
        return "No market research available.".into();
    }
    profile
        .research
        .iter()
        .map(|(key, answer)| format!("[{key}]\n{answer}"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn evaluation_prompt(stage: Stage, profile: &EnrichedProfile, result: &EvaluationResult) -> String {
    let breakdown = result
        .breakdown
        .iter()
        .map(|(criterion, b)| format!("- {criterion}: {:.0}/100 (weight {:.1})", b.score, b.weight))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Explain the {stage} fit of this lead. The score is already computed; do not change it.\n\n\
         Lead:\n{}\n\nScore: {:.1}/100\nCriteria:\n{breakdown}\n\n\
         Reply as JSON: {{\"summary\": string, \"strengths\": [string], \"concerns\": [string]}}",
        lead_context(profile),
        result.total,
    )
}

pub fn pain_point_prompt(profile: &EnrichedProfile, evaluations: &[(Stage, f64)]) -> String {
    let scores = evaluations
        .iter()
        .map(|(stage, total)| format!("- {stage}: {total:.1}/100"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Identify the operational pain points this company is likely facing that automation \
         could address. Rate each impact high, medium or low.\n\n\
         Lead:\n{}\n\nICP evaluation:\n{scores}\n\nResearch:\n{}\n\n\
         Reply as JSON: {{\"pain_points\": [{{\"description\": string, \"category\": \
         \"technical\"|\"operational\"|\"process\"|\"automation\", \"impact\": \
         \"high\"|\"medium\"|\"low\", \"solution\": string}}], \"summary\": string}}",
        lead_context(profile),
        research_context(profile),
    )
}

pub fn offer_prompt(profile: &EnrichedProfile, pain: Option<&PainPointReport>, offer: &Offer) -> String {
    let pain = pain.map_or_else(|| "Not analysed.".to_string(), PainPointReport::text);
    format!(
        "Rate how well this offer fits the lead, 0 to 100.\n\n\
         Lead:\n{}\n\nPain points:\n{pain}\n\n\
         Offer: {} ({})\nCategory: {}\nDescription: {}\nIndustry fit: {}\nTarget clients: {}\n\n\
         Reply as JSON: {{\"fit_score\": number, \"reasons\": [string], \"recommendations\": [string]}}",
        lead_context(profile),
        offer.name,
        offer.id,
        offer.category,
        offer.description,
        offer.industry_fit.join(", "),
        offer.target_client_type,
    )
}

pub fn campaign_prompt(profile: &EnrichedProfile, offer: &Offer, pain: Option<&PainPointReport>) -> String {
    let first_name = profile.lead.first_name.trim();
    let pain = pain.map_or_else(|| "Not analysed.".to_string(), |p| p.summary.clone());
    format!(
        "Write a three-email cold outreach sequence for this lead. The first email is under \
         75 words with a soft call to action and a clear opt-out. Each follow-up is under 50 \
         words, takes a fresh angle and does not repeat earlier points. Follow-ups wait 3 and \
         5 days.\n\n\
         Address the lead as: {}\nLead:\n{}\n\nPain summary: {pain}\n\n\
         Offer: {}\n{}\n\n\
         Reply as JSON: {{\"emails\": [{{\"subject\": string, \"body\": string, \"wait_days\": number}}]}}",
        if first_name.is_empty() { "there" } else { first_name },
        lead_context(profile),
        offer.name,
        offer.description,
    )
}
