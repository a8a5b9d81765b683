//! EnrichmentCollector: profile, company and market-research lookups for a lead.
//!
//! Providers are invoked independently. A failing or disabled provider adds a
//! [`ProviderError`] and leaves its fields absent; enrichment itself never
//! fails. The source [`Lead`] is never touched: the result wraps a clone.

use std::collections::BTreeMap;
use std::sync::Arc;

use leadqual_providers::{CompanyProvider, ProfileProvider, ProviderResult, ResearchProvider};
use leadqual_shared::{
    CompanyData, EnrichedProfile, EnrichmentConfig, Lead, ProfileData, ProviderError,
    ResearchQuestion,
};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::cost::CostTracker;

/// A provider that is either wired up or switched off with a reason.
pub enum ProviderSlot<T: ?Sized> {
    Enabled(Arc<T>),
    Disabled { reason: String },
}

impl<T: ?Sized> ProviderSlot<T> {
    pub fn disabled(reason: impl Into<String>) -> Self {
        Self::Disabled {
            reason: reason.into(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }
}

impl<T: ?Sized> Clone for ProviderSlot<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Enabled(p) => Self::Enabled(Arc::clone(p)),
            Self::Disabled { reason } => Self::Disabled {
                reason: reason.clone(),
            },
        }
    }
}

/// Output of one enrichment pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Enrichment {
    pub profile: EnrichedProfile,
    pub errors: Vec<ProviderError>,
    /// `false` when provider calls were skipped and `profile` was rebuilt
    /// from stored data.
    pub fetched: bool,
}

/// Collects provider data for leads.
#[derive(Clone)]
pub struct EnrichmentCollector {
    profile: ProviderSlot<dyn ProfileProvider>,
    company: ProviderSlot<dyn CompanyProvider>,
    research: ProviderSlot<dyn ResearchProvider>,
    questions: Vec<ResearchQuestion>,
    min_answer_len: usize,
}

impl EnrichmentCollector {
    /// A collector with every provider disabled.
    pub fn new(config: &EnrichmentConfig) -> Self {
        Self {
            profile: ProviderSlot::disabled("not configured"),
            company: ProviderSlot::disabled("not configured"),
            research: ProviderSlot::disabled("not configured"),
            questions: config.research_questions.clone(),
            min_answer_len: config.min_answer_len,
        }
    }

    pub fn with_profile(mut self, slot: ProviderSlot<dyn ProfileProvider>) -> Self {
        self.profile = slot;
        self
    }

    pub fn with_company(mut self, slot: ProviderSlot<dyn CompanyProvider>) -> Self {
        self.company = slot;
        self
    }

    pub fn with_research(mut self, slot: ProviderSlot<dyn ResearchProvider>) -> Self {
        self.research = slot;
        self
    }

    /// Enrich one lead. Research usage is recorded under stage `enrich`.
    #[instrument(skip_all, fields(identity = lead.identity.as_str()))]
    pub async fn enrich(&self, lead: &Lead, cost: &CostTracker) -> Enrichment {
        let (profile, company, research) = tokio::join!(
            self.lookup_profile(lead),
            self.lookup_company(lead),
            self.research(lead, cost),
        );

        let mut errors = Vec::new();
        let mut enriched = EnrichedProfile::from_lead(lead.clone());

        match profile {
            Ok(data) => enriched.profile = Some(data),
            Err(e) => errors.push(e),
        }
        match company {
            Ok(data) => enriched.company = Some(data),
            Err(e) => errors.push(e),
        }
        let (answers, research_errors) = research;
        enriched.questions_asked = self.questions.len();
        enriched.research = answers;
        errors.extend(research_errors);

        for error in &errors {
            warn!(provider = %error.provider, message = %error.message, "enrichment degraded");
        }
        debug!(
            profile = enriched.profile.is_some(),
            company = enriched.company.is_some(),
            answers = enriched.research.len(),
            "enrichment finished"
        );

        Enrichment {
            profile: enriched,
            errors,
            fetched: true,
        }
    }

    async fn lookup_profile(&self, lead: &Lead) -> ProviderResult<ProfileData> {
        let provider = match &self.profile {
            ProviderSlot::Enabled(p) => p,
            ProviderSlot::Disabled { reason } => return Err(disabled("profile", reason)),
        };
        let url = lead.linkedin_url.trim();
        if url.is_empty() {
            return Err(ProviderError::new("profile", "lead has no LinkedIn URL"));
        }
        provider.lookup_profile(url).await
    }

    async fn lookup_company(&self, lead: &Lead) -> ProviderResult<CompanyData> {
        let provider = match &self.company {
            ProviderSlot::Enabled(p) => p,
            ProviderSlot::Disabled { reason } => return Err(disabled("company", reason)),
        };
        let Some(domain) = lead.domain() else {
            return Err(ProviderError::new("company", "lead has no website domain"));
        };
        provider.lookup_company(&domain).await
    }

    /// Ask every configured question; each answer or failure stands alone.
    async fn research(
        &self,
        lead: &Lead,
        cost: &CostTracker,
    ) -> (BTreeMap<String, String>, Vec<ProviderError>) {
        let mut answers = BTreeMap::new();
        let mut errors = Vec::new();
        if self.questions.is_empty() {
            return (answers, errors);
        }

        let provider = match &self.research {
            ProviderSlot::Enabled(p) => p,
            ProviderSlot::Disabled { reason } => {
                errors.push(disabled("research", reason));
                return (answers, errors);
            }
        };

        let subject = if lead.company.trim().is_empty() {
            lead.domain().unwrap_or_default()
        } else {
            lead.company.trim().to_string()
        };
        if subject.is_empty() {
            errors.push(ProviderError::new("research", "lead has no company name or domain"));
            return (answers, errors);
        }

        for question in &self.questions {
            let query = question.render(&subject, lead.industry.trim());
            match provider.research(&query).await {
                Ok(completion) => {
                    cost.record("enrich", &completion);
                    let answer = completion.text.trim();
                    let chars = answer.chars().count();
                    if chars < self.min_answer_len {
                        errors.push(ProviderError::new(
                            "research",
                            format!("{}: answer too short ({chars} chars)", question.key),
                        ));
                    } else {
                        answers.insert(question.key.clone(), answer.to_string());
                    }
                }
                Err(e) => errors.push(ProviderError::new(
                    "research",
                    format!("{}: {}", question.key, e.message),
                )),
            }
        }
        (answers, errors)
    }
}

fn disabled(provider: &str, reason: &str) -> ProviderError {
    ProviderError::new(provider, format!("provider disabled ({reason})"))
}

#[cfg(test)]
pub(crate) mod tests {
    use async_trait::async_trait;
    use leadqual_providers::{Completion, TokenUsage};
    use leadqual_shared::LeadIdentity;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::cost::Pricing;

    pub(crate) struct FakeProfile;

    #[async_trait]
    impl ProfileProvider for FakeProfile {
        async fn lookup_profile(&self, url: &str) -> ProviderResult<ProfileData> {
            Ok(ProfileData {
                occupation: Some(format!("VP Operations ({url})")),
                skills: vec!["Python".into(), "SQL".into()],
                ..ProfileData::default()
            })
        }
    }

    pub(crate) struct FakeCompany;

    #[async_trait]
    impl CompanyProvider for FakeCompany {
        async fn lookup_company(&self, domain: &str) -> ProviderResult<CompanyData> {
            if domain == "down.example" {
                return Err(ProviderError::new("company", "HTTP 503"));
            }
            Ok(CompanyData {
                name: Some(domain.to_string()),
                employee_count: Some(120),
                funding: Some("Series A ($12000000)".into()),
                ..CompanyData::default()
            })
        }
    }

    /// Answers every question except ones mentioning "challenges", which get a
    /// three-character stub that is four bytes long.
    pub(crate) struct FakeResearch;

    #[async_trait]
    impl ResearchProvider for FakeResearch {
        async fn research(&self, query: &str) -> ProviderResult<Completion> {
            let text = if query.contains("challenges") {
                "n/ä".to_string()
            } else {
                format!("Detailed findings about: {query}")
            };
            Ok(Completion {
                text,
                usage: TokenUsage {
                    prompt_tokens: 20,
                    completion_tokens: 80,
                },
                model: "sonar".into(),
            })
        }
    }

    pub(crate) fn lead(email: &str, linkedin: &str, website: &str) -> Lead {
        let identity = LeadIdentity::from_parts(email, linkedin, website).expect("identity");
        let mut lead = Lead::new(identity);
        lead.email = email.into();
        lead.linkedin_url = linkedin.into();
        lead.website = website.into();
        lead.company = "Northwind".into();
        lead.industry = "SaaS".into();
        lead
    }

    fn full_collector() -> EnrichmentCollector {
        EnrichmentCollector::new(&EnrichmentConfig::default())
            .with_profile(ProviderSlot::Enabled(Arc::new(FakeProfile)))
            .with_company(ProviderSlot::Enabled(Arc::new(FakeCompany)))
            .with_research(ProviderSlot::Enabled(Arc::new(FakeResearch)))
    }

    #[tokio::test]
    async fn missing_linkedin_only_degrades_profile() {
        let lead = lead("ada@northwind.io", "", "northwind.io");
        let cost = CostTracker::new(Pricing::default());
        let out = full_collector().enrich(&lead, &cost).await;

        assert_eq!(out.profile.lead, lead);
        assert_eq!(out.profile.profile, None);
        assert!(out.profile.company.is_some());
        let profile_errors: Vec<_> = out.errors.iter().filter(|e| e.provider == "profile").collect();
        assert_eq!(
            profile_errors,
            vec![&ProviderError::new("profile", "lead has no LinkedIn URL")]
        );
    }

    #[tokio::test]
    async fn one_bad_research_answer_keeps_the_others() {
        let lead = lead("ada@northwind.io", "https://linkedin.com/in/ada", "northwind.io");
        let cost = CostTracker::new(Pricing::default());
        let out = full_collector().enrich(&lead, &cost).await;

        let asked = EnrichmentConfig::default().research_questions.len();
        assert_eq!(out.profile.questions_asked, asked);
        assert_eq!(out.profile.research.len(), asked - 1);
        assert!(!out.profile.research.contains_key("operational_challenges"));
        assert_eq!(out.errors.len(), 1);
        assert_eq!(
            out.errors[0].message,
            "operational_challenges: answer too short (3 chars)"
        );
        assert_eq!(cost.records().len(), asked);
    }

    #[tokio::test]
    async fn disabled_and_failing_providers_are_recorded() {
        let lead = lead("ada@down.example", "https://linkedin.com/in/ada", "down.example");
        let cost = CostTracker::new(Pricing::default());
        let collector = EnrichmentCollector::new(&EnrichmentConfig::default())
            .with_company(ProviderSlot::Enabled(Arc::new(FakeCompany)))
            .with_profile(ProviderSlot::disabled("PROXYCURL_API_KEY not set"));

        let out = collector.enrich(&lead, &cost).await;
        assert_eq!(out.profile, {
            let mut expected = EnrichedProfile::from_lead(lead.clone());
            expected.questions_asked = EnrichmentConfig::default().research_questions.len();
            expected
        });
        let providers: Vec<&str> = out.errors.iter().map(|e| e.provider.as_str()).collect();
        assert_eq!(providers, vec!["profile", "company", "research"]);
        assert_eq!(
            out.errors[0].message,
            "provider disabled (PROXYCURL_API_KEY not set)"
        );
    }

    #[tokio::test]
    async fn enrichment_is_repeatable() {
        let lead = lead("ada@northwind.io", "https://linkedin.com/in/ada", "northwind.io");
        let cost = CostTracker::new(Pricing::default());
        let collector = full_collector();
        let first = collector.enrich(&lead, &cost).await;
        let second = collector.enrich(&lead, &cost).await;
        assert_eq!(first, second);
    }
}
