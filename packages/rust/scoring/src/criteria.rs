//! Canonical sub-criterion formulas.
//!
//! Every function returns a sub-score in `0..=100`. A missing attribute is a
//! non-match (0), never an error. Matching is case-insensitive and trimmed.

use std::collections::BTreeSet;

use leadqual_shared::EnrichedProfile;
use serde::{Deserialize, Serialize};

use crate::config::{Criterion, ScoringConfig};

/// Seniority terms worth the top authority tier.
const EXECUTIVE_TERMS: &[&str] = &[
    "chief",
    "ceo",
    "cto",
    "cfo",
    "coo",
    "cmo",
    "cio",
    "c level",
    "c suite",
    "founder",
    "cofounder",
    "co founder",
    "owner",
    "president",
    "director",
    "vp",
    "svp",
    "evp",
    "vice president",
    "head",
    "partner",
];

/// Seniority terms worth the middle authority tier.
const MANAGER_TERMS: &[&str] = &["manager", "lead", "supervisor"];

const EXECUTIVE_SCORE: f64 = 90.0;
const MANAGER_SCORE: f64 = 50.0;

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// Severity of the strongest pain point found for a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PainSeverity {
    None,
    Low,
    Medium,
    High,
}

impl PainSeverity {
    pub fn score(self) -> f64 {
        match self {
            Self::High => 100.0,
            Self::Medium => 60.0,
            Self::Low => 30.0,
            Self::None => 0.0,
        }
    }
}

/// Normalised scoring inputs. All strings are lower-cased and trimmed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    pub role: Option<String>,
    pub seniority: Option<String>,
    pub departments: Vec<String>,
    pub skills: Vec<String>,
    pub industry: Option<String>,
    pub employee_count: Option<u64>,
    pub revenue: Option<f64>,
    pub location: Option<String>,
    pub growth_stage: Option<String>,
    pub technologies: BTreeSet<String>,
    pub integrations: Vec<String>,
    pub cloud_ready: Option<bool>,
    pub api_enabled: Option<bool>,
    pub funding: Option<String>,
    pub research_asked: usize,
    pub research_answered: usize,
    pub pain_severity: Option<PainSeverity>,
    pub pain_text: String,
}

impl Attributes {
    pub fn from_profile(profile: &EnrichedProfile) -> Self {
        Self {
            role: profile.role().map(norm),
            seniority: profile.seniority().map(norm),
            departments: profile.departments().into_iter().map(norm).collect(),
            skills: profile.skills().into_iter().map(norm).collect(),
            industry: profile.industry().map(norm),
            employee_count: profile.employee_count(),
            revenue: profile.revenue(),
            location: profile.location().as_deref().map(norm),
            growth_stage: profile.growth_stage().map(norm),
            technologies: profile.technologies().iter().map(|t| norm(t)).collect(),
            integrations: profile.integrations().into_iter().map(norm).collect(),
            cloud_ready: profile.cloud_ready(),
            api_enabled: profile.api_enabled(),
            funding: profile.funding().map(norm),
            research_asked: profile.questions_asked,
            research_answered: profile.research.len(),
            pain_severity: None,
            pain_text: norm(&profile.research_text()),
        }
    }

    /// Attach the outcome of pain-point analysis.
    pub fn with_pain(mut self, severity: PainSeverity, text: &str) -> Self {
        self.pain_severity = Some(severity);
        if !text.trim().is_empty() {
            self.pain_text.push('\n');
            self.pain_text.push_str(&norm(text));
        }
        self
    }
}

fn norm(s: &str) -> String {
    s.trim().to_lowercase()
}

// ---------------------------------------------------------------------------
// Formulas
// ---------------------------------------------------------------------------

/// Evaluate one criterion against the attributes.
pub fn evaluate(criterion: Criterion, attrs: &Attributes, config: &ScoringConfig) -> f64 {
    match criterion {
        Criterion::RoleMatch => binary(
            attrs
                .role
                .as_deref()
                .is_some_and(|role| contains_any(role, &config.individual.target_roles)),
        ),
        Criterion::AuthorityMatch => authority_tier(attrs),
        Criterion::DepartmentMatch => binary(attrs.departments.iter().any(|d| {
            config
                .individual
                .target_departments
                .iter()
                .any(|t| d.contains(t.as_str()))
        })),
        Criterion::SkillsMatch => {
            intersection_ratio(attrs.skills.iter(), &config.individual.required_skills)
        }
        Criterion::IndustryMatch => binary(
            attrs
                .industry
                .as_deref()
                .is_some_and(|i| contains_any(i, &config.company.target_industries)),
        ),
        Criterion::SizeMatch => binary(attrs.employee_count.is_some_and(|count| {
            config.company.min_employees.is_none_or(|min| count >= min)
                && config.company.max_employees.is_none_or(|max| count <= max)
        })),
        Criterion::LocationMatch => binary(
            attrs
                .location
                .as_deref()
                .is_some_and(|l| contains_any(l, &config.company.target_locations)),
        ),
        Criterion::GrowthMatch => binary(
            attrs
                .growth_stage
                .as_deref()
                .is_some_and(|g| contains_any(g, &config.company.growth_stages)),
        ),
        Criterion::RevenueMatch => binary(attrs.revenue.is_some_and(|revenue| {
            config.company.min_revenue.is_none_or(|min| revenue >= min)
                && config.company.max_revenue.is_none_or(|max| revenue <= max)
        })),
        Criterion::TechStackMatch => intersection_ratio(
            attrs.technologies.iter(),
            &config.technical.required_technologies,
        ),
        Criterion::IntegrationFeasibility => binary(
            attrs
                .integrations
                .iter()
                .chain(attrs.technologies.iter())
                .any(|i| config.technical.standard_integrations.contains(i)),
        ),
        Criterion::InfrastructureCompatibility => {
            match (attrs.cloud_ready, attrs.api_enabled) {
                (Some(true), Some(true)) => 100.0,
                (Some(true), _) | (_, Some(true)) => 75.0,
                (Some(false), Some(false)) => 25.0,
                _ => 0.0,
            }
        }
        Criterion::FundingSignal => binary(attrs.funding.as_deref().is_some_and(|f| !f.is_empty())),
        Criterion::ResearchCoverage => {
            if attrs.research_asked == 0 {
                0.0
            } else {
                let answered = attrs.research_answered.min(attrs.research_asked);
                answered as f64 / attrs.research_asked as f64 * 100.0
            }
        }
        Criterion::PainSeverity => attrs.pain_severity.map_or(0.0, PainSeverity::score),
        Criterion::KeywordMatch => {
            let keywords = &config.market.pain_keywords;
            if keywords.is_empty() {
                0.0
            } else {
                let found = keywords
                    .iter()
                    .filter(|k| attrs.pain_text.contains(k.as_str()))
                    .count();
                found as f64 / keywords.len() as f64 * 100.0
            }
        }
    }
}

fn binary(matched: bool) -> f64 {
    if matched { 100.0 } else { 0.0 }
}

fn contains_any(value: &str, targets: &[String]) -> bool {
    targets.iter().any(|t| value.contains(t.as_str()))
}

/// `|have ∩ required| / |required| * 100`; 0 when nothing is required.
fn intersection_ratio<'a>(have: impl Iterator<Item = &'a String>, required: &[String]) -> f64 {
    if required.is_empty() {
        return 0.0;
    }
    let have: BTreeSet<&str> = have.map(String::as_str).collect();
    let matched = required
        .iter()
        .filter(|r| have.contains(r.as_str()))
        .count();
    matched as f64 / required.len() as f64 * 100.0
}

/// Three-tier authority grading over seniority, then role.
fn authority_tier(attrs: &Attributes) -> f64 {
    [attrs.seniority.as_deref(), attrs.role.as_deref()]
        .into_iter()
        .flatten()
        .map(grade_title)
        .fold(0.0, f64::max)
}

fn grade_title(title: &str) -> f64 {
    let tokens: Vec<&str> = title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    let phrase = tokens.join(" ");
    let has = |term: &str| {
        if term.contains(' ') {
            phrase.contains(term)
        } else {
            tokens.contains(&term)
        }
    };

    if EXECUTIVE_TERMS.iter().any(|t| has(t)) {
        EXECUTIVE_SCORE
    } else if MANAGER_TERMS.iter().any(|t| has(t)) {
        MANAGER_SCORE
    } else {
        0.0
    }
}
