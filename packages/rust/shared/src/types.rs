//! Core domain types for lead qualification.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

// ---------------------------------------------------------------------------
// LeadIdentity
// ---------------------------------------------------------------------------

/// The deduplication key of a lead: normalised email, else LinkedIn URL, else
/// website domain. The prefix records which source produced it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadIdentity(String);

impl LeadIdentity {
    /// Derive the identity from the raw contact fields, in priority order.
    pub fn from_parts(email: &str, linkedin_url: &str, website: &str) -> Option<Self> {
        let email = email.trim().to_lowercase();
        if email.contains('@') {
            return Some(Self(format!("email:{email}")));
        }
        if let Some(profile) = normalize_linkedin(linkedin_url) {
            return Some(Self(format!("linkedin:{profile}")));
        }
        website_domain(website).map(|domain| Self(format!("domain:{domain}")))
    }

    /// Wrap an already-normalised identity key (as stored or typed by a user).
    pub fn parse(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_lowercase();
        if ["email:", "linkedin:", "domain:"]
            .iter()
            .any(|prefix| lowered.starts_with(prefix))
        {
            return Some(Self(lowered));
        }
        Self::from_parts(&lowered, &lowered, &lowered)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short stable identifier used in the `Lead ID` field and log spans.
    pub fn lead_id(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        digest.iter().take(6).map(|b| format!("{b:02x}")).collect()
    }
}

impl std::fmt::Display for LeadIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn parse_loose_url(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    Url::parse(&candidate).ok()
}

/// `linkedin.com/in/<slug>` form of a LinkedIn profile URL, lower-cased.
pub fn normalize_linkedin(raw: &str) -> Option<String> {
    let url = parse_loose_url(raw)?;
    let host = url.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if !host.ends_with("linkedin.com") {
        return None;
    }
    let path = url.path().trim_end_matches('/').to_lowercase();
    if path.is_empty() {
        return None;
    }
    Some(format!("linkedin.com{path}"))
}

/// Host of a website URL without the `www.` prefix.
pub fn website_domain(raw: &str) -> Option<String> {
    let url = parse_loose_url(raw)?;
    let host = url.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    host.contains('.').then_some(host)
}

// ---------------------------------------------------------------------------
// Lead
// ---------------------------------------------------------------------------

/// One ingested lead. Never mutated after ingestion; enrichment produces an
/// [`EnrichedProfile`] that wraps it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub identity: LeadIdentity,
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    pub linkedin_url: String,
    pub email: String,
    pub industry: String,
    pub website: String,
    pub employee_count: Option<u64>,
    pub revenue: Option<f64>,
    pub city: String,
    pub state: String,
    pub country: String,
    pub title: String,
    pub seniority: String,
    pub departments: Vec<String>,
    pub technologies: BTreeSet<String>,
    pub keywords: Vec<String>,
    pub seo_description: String,
    pub company_city: String,
    pub company_state: String,
    pub company_country: String,
    pub company_linkedin_url: String,
}

impl Lead {
    /// Build a lead with only the identity fields set; the rest default to empty.
    pub fn new(identity: LeadIdentity) -> Self {
        Self {
            identity,
            first_name: String::new(),
            last_name: String::new(),
            company: String::new(),
            linkedin_url: String::new(),
            email: String::new(),
            industry: String::new(),
            website: String::new(),
            employee_count: None,
            revenue: None,
            city: String::new(),
            state: String::new(),
            country: String::new(),
            title: String::new(),
            seniority: String::new(),
            departments: Vec::new(),
            technologies: BTreeSet::new(),
            keywords: Vec::new(),
            seo_description: String::new(),
            company_city: String::new(),
            company_state: String::new(),
            company_country: String::new(),
            company_linkedin_url: String::new(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Person location, falling back to the company location.
    pub fn location(&self) -> String {
        let person = join_non_empty(&[&self.city, &self.state, &self.country]);
        if person.is_empty() {
            join_non_empty(&[&self.company_city, &self.company_state, &self.company_country])
        } else {
            person
        }
    }

    pub fn domain(&self) -> Option<String> {
        website_domain(&self.website)
    }
}

fn join_non_empty(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// Provider payloads
// ---------------------------------------------------------------------------

/// Person profile returned by the profile provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileData {
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub occupation: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub experiences: Vec<Experience>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub starts_at: Option<String>,
    #[serde(default)]
    pub ends_at: Option<String>,
}

/// Company profile returned by the company provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub employee_count: Option<u64>,
    #[serde(default)]
    pub revenue: Option<f64>,
    #[serde(default)]
    pub growth_stage: Option<String>,
    #[serde(default)]
    pub funding: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub integrations: Vec<String>,
    #[serde(default)]
    pub cloud_ready: Option<bool>,
    #[serde(default)]
    pub api_enabled: Option<bool>,
}

// ---------------------------------------------------------------------------
// EnrichedProfile
// ---------------------------------------------------------------------------

/// A lead plus everything the providers could add. Provider fields are absent
/// when that provider failed or was disabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedProfile {
    pub lead: Lead,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<CompanyData>,
    /// Research answers keyed by question key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub research: BTreeMap<String, String>,
    /// Number of research questions asked (answered or not).
    #[serde(default)]
    pub questions_asked: usize,
}

impl EnrichedProfile {
    /// An enrichment with no provider data.
    pub fn from_lead(lead: Lead) -> Self {
        Self {
            lead,
            profile: None,
            company: None,
            research: BTreeMap::new(),
            questions_asked: 0,
        }
    }

    /// Current role: profile occupation first, then the lead's title.
    pub fn role(&self) -> Option<&str> {
        self.profile
            .as_ref()
            .and_then(|p| p.occupation.as_deref())
            .filter(|s| !s.trim().is_empty())
            .or_else(|| non_empty(&self.lead.title))
    }

    pub fn seniority(&self) -> Option<&str> {
        non_empty(&self.lead.seniority)
    }

    pub fn skills(&self) -> Vec<&str> {
        self.profile
            .as_ref()
            .map(|p| p.skills.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn departments(&self) -> Vec<&str> {
        self.lead.departments.iter().map(String::as_str).collect()
    }

    pub fn industry(&self) -> Option<&str> {
        non_empty(&self.lead.industry).or_else(|| {
            self.company
                .as_ref()
                .and_then(|c| c.industry.as_deref())
                .filter(|s| !s.trim().is_empty())
        })
    }

    pub fn employee_count(&self) -> Option<u64> {
        self.lead
            .employee_count
            .or_else(|| self.company.as_ref().and_then(|c| c.employee_count))
    }

    pub fn revenue(&self) -> Option<f64> {
        self.lead
            .revenue
            .or_else(|| self.company.as_ref().and_then(|c| c.revenue))
    }

    pub fn location(&self) -> Option<String> {
        let location = self.lead.location();
        if !location.is_empty() {
            return Some(location);
        }
        self.company
            .as_ref()
            .filter(|c| !c.locations.is_empty())
            .map(|c| c.locations.join(", "))
    }

    pub fn growth_stage(&self) -> Option<&str> {
        self.company
            .as_ref()
            .and_then(|c| c.growth_stage.as_deref())
            .filter(|s| !s.trim().is_empty())
    }

    pub fn funding(&self) -> Option<&str> {
        self.company
            .as_ref()
            .and_then(|c| c.funding.as_deref())
            .filter(|s| !s.trim().is_empty())
    }

    /// Lead technologies merged with company-provider technologies.
    pub fn technologies(&self) -> BTreeSet<String> {
        let mut all = self.lead.technologies.clone();
        if let Some(company) = &self.company {
            all.extend(company.technologies.iter().cloned());
        }
        all
    }

    pub fn integrations(&self) -> Vec<&str> {
        self.company
            .as_ref()
            .map(|c| c.integrations.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn cloud_ready(&self) -> Option<bool> {
        self.company.as_ref().and_then(|c| c.cloud_ready)
    }

    pub fn api_enabled(&self) -> Option<bool> {
        self.company.as_ref().and_then(|c| c.api_enabled)
    }

    /// All research answers concatenated, for keyword matching.
    pub fn research_text(&self) -> String {
        self.research
            .values()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

// ---------------------------------------------------------------------------
// Categories, stages, statuses
// ---------------------------------------------------------------------------

/// The four top-level scoring dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Individual,
    Company,
    Technical,
    Market,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Individual,
        Category::Company,
        Category::Technical,
        Category::Market,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Company => "company",
            Self::Technical => "technical",
            Self::Market => "market",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted pipeline stage. Each has its own status field in the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Individual,
    Company,
    Technical,
    PainPoint,
    Offer,
    Campaign,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Individual,
        Stage::Company,
        Stage::Technical,
        Stage::PainPoint,
        Stage::Offer,
        Stage::Campaign,
    ];

    /// The scoring category a stage evaluates, if any.
    pub fn category(self) -> Option<Category> {
        match self {
            Self::Individual => Some(Category::Individual),
            Self::Company => Some(Category::Company),
            Self::Technical => Some(Category::Technical),
            Self::PainPoint => Some(Category::Market),
            Self::Offer | Self::Campaign => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Company => "company",
            Self::Technical => "technical",
            Self::PainPoint => "pain_point",
            Self::Offer => "offer",
            Self::Campaign => "campaign",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-stage evaluation status as stored in the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EvaluationStatus {
    #[default]
    #[serde(rename = "Not Started")]
    NotStarted,
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "Completed")]
    Completed,
    #[serde(rename = "Needs Review")]
    NeedsReview,
}

impl EvaluationStatus {
    pub const CHOICES: [&'static str; 4] = ["Not Started", "In Progress", "Completed", "Needs Review"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "Not Started",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::NeedsReview => "Needs Review",
        }
    }

    /// Case-insensitive parse of the stored label.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        [
            Self::NotStarted,
            Self::InProgress,
            Self::Completed,
            Self::NeedsReview,
        ]
        .into_iter()
        .find(|s| s.as_str().eq_ignore_ascii_case(raw))
    }
}

impl std::fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Offers
// ---------------------------------------------------------------------------

/// A catalogue offer that leads are matched against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub industry_fit: Vec<String>,
    #[serde(default)]
    pub target_client_type: String,
}

/// Offer selection mode for the offer stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OfferMode {
    #[default]
    FindBest,
    EvaluateSingle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_prefers_email() {
        let id = LeadIdentity::from_parts(
            " Ada@Example.COM ",
            "https://www.linkedin.com/in/ada/",
            "https://www.example.com",
        )
        .expect("identity");
        assert_eq!(id.as_str(), "email:ada@example.com");
    }

    #[test]
    fn identity_falls_back_to_linkedin_then_domain() {
        let id = LeadIdentity::from_parts("", "https://www.LinkedIn.com/in/Ada-L/", "example.com")
            .expect("identity");
        assert_eq!(id.as_str(), "linkedin:linkedin.com/in/ada-l");

        let id = LeadIdentity::from_parts("", "", "http://www.Example.com/about").expect("identity");
        assert_eq!(id.as_str(), "domain:example.com");

        assert!(LeadIdentity::from_parts("", "", "").is_none());
        assert!(LeadIdentity::from_parts("not-an-email", "", "").is_none());
    }

    #[test]
    fn lead_id_is_stable() {
        let a = LeadIdentity::from_parts("ada@example.com", "", "").expect("identity");
        let b = LeadIdentity::parse("EMAIL:ada@example.com").expect("identity");
        assert_eq!(a, b);
        assert_eq!(a.lead_id(), b.lead_id());
        assert_eq!(a.lead_id().len(), 12);
    }

    #[test]
    fn enriched_profile_falls_back_to_provider_fields() {
        let identity = LeadIdentity::from_parts("ada@example.com", "", "").expect("identity");
        let mut lead = Lead::new(identity);
        lead.title = "VP Engineering".into();
        let mut enriched = EnrichedProfile::from_lead(lead);
        assert_eq!(enriched.role(), Some("VP Engineering"));
        assert_eq!(enriched.employee_count(), None);

        enriched.company = Some(CompanyData {
            employee_count: Some(120),
            industry: Some("SaaS".into()),
            technologies: vec!["Postgres".into()],
            ..Default::default()
        });
        assert_eq!(enriched.employee_count(), Some(120));
        assert_eq!(enriched.industry(), Some("SaaS"));
        assert!(enriched.technologies().contains("Postgres"));
    }

    #[test]
    fn status_labels_roundtrip() {
        for status in [
            EvaluationStatus::NotStarted,
            EvaluationStatus::InProgress,
            EvaluationStatus::Completed,
            EvaluationStatus::NeedsReview,
        ] {
            assert_eq!(EvaluationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(
            EvaluationStatus::parse("completed"),
            Some(EvaluationStatus::Completed)
        );
        assert_eq!(EvaluationStatus::parse("Done"), None);
    }

    #[test]
    fn pain_point_stage_maps_to_market() {
        assert_eq!(Stage::PainPoint.category(), Some(Category::Market));
        assert_eq!(Stage::Campaign.category(), None);
    }
}
