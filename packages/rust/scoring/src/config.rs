//! Validated scoring configuration.
//!
//! [`ScoringConfig`] is built once from the raw `[scoring]` TOML section and
//! is immutable afterwards. Every structural problem (weights not summing to
//! 100, unknown or misplaced criteria, bad fractions, inverted ranges) is a
//! `ConfigError` raised here, before any lead is processed.

use std::collections::BTreeMap;

use leadqual_shared::{
    AppConfig, Category, CompanyTargets, IndividualTargets, LeadQualError, MarketTargets, Result,
    ScoringSection, TechnicalTargets,
};
use serde::{Deserialize, Serialize};

const EPSILON: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Criterion
// ---------------------------------------------------------------------------

/// A named sub-criterion. Each belongs to exactly one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    RoleMatch,
    AuthorityMatch,
    DepartmentMatch,
    SkillsMatch,
    IndustryMatch,
    SizeMatch,
    LocationMatch,
    GrowthMatch,
    RevenueMatch,
    TechStackMatch,
    IntegrationFeasibility,
    InfrastructureCompatibility,
    FundingSignal,
    ResearchCoverage,
    PainSeverity,
    KeywordMatch,
}

impl Criterion {
    pub const ALL: [Criterion; 16] = [
        Criterion::RoleMatch,
        Criterion::AuthorityMatch,
        Criterion::DepartmentMatch,
        Criterion::SkillsMatch,
        Criterion::IndustryMatch,
        Criterion::SizeMatch,
        Criterion::LocationMatch,
        Criterion::GrowthMatch,
        Criterion::RevenueMatch,
        Criterion::TechStackMatch,
        Criterion::IntegrationFeasibility,
        Criterion::InfrastructureCompatibility,
        Criterion::FundingSignal,
        Criterion::ResearchCoverage,
        Criterion::PainSeverity,
        Criterion::KeywordMatch,
    ];

    pub fn category(self) -> Category {
        match self {
            Self::RoleMatch | Self::AuthorityMatch | Self::DepartmentMatch | Self::SkillsMatch => {
                Category::Individual
            }
            Self::IndustryMatch
            | Self::SizeMatch
            | Self::LocationMatch
            | Self::GrowthMatch
            | Self::RevenueMatch => Category::Company,
            Self::TechStackMatch
            | Self::IntegrationFeasibility
            | Self::InfrastructureCompatibility => Category::Technical,
            Self::FundingSignal | Self::ResearchCoverage | Self::PainSeverity | Self::KeywordMatch => {
                Category::Market
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RoleMatch => "role_match",
            Self::AuthorityMatch => "authority_match",
            Self::DepartmentMatch => "department_match",
            Self::SkillsMatch => "skills_match",
            Self::IndustryMatch => "industry_match",
            Self::SizeMatch => "size_match",
            Self::LocationMatch => "location_match",
            Self::GrowthMatch => "growth_match",
            Self::RevenueMatch => "revenue_match",
            Self::TechStackMatch => "tech_stack_match",
            Self::IntegrationFeasibility => "integration_feasibility",
            Self::InfrastructureCompatibility => "infrastructure_compatibility",
            Self::FundingSignal => "funding_signal",
            Self::ResearchCoverage => "research_coverage",
            Self::PainSeverity => "pain_severity",
            Self::KeywordMatch => "keyword_match",
        }
    }
}

impl std::fmt::Display for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Criterion {
    type Err = LeadQualError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| LeadQualError::config(format!("unknown scoring criterion '{s}'")))
    }
}

fn parse_category(name: &str) -> Result<Category> {
    Category::ALL
        .into_iter()
        .find(|c| c.as_str() == name.trim())
        .ok_or_else(|| LeadQualError::config(format!("unknown scoring category '{name}'")))
}

// ---------------------------------------------------------------------------
// ScoringConfig
// ---------------------------------------------------------------------------

/// Immutable, validated scoring configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringConfig {
    weights: BTreeMap<Category, f64>,
    criteria: BTreeMap<Category, BTreeMap<Criterion, f64>>,
    /// Target lists are lower-cased and trimmed at construction.
    pub individual: IndividualTargets,
    pub company: CompanyTargets,
    pub technical: TechnicalTargets,
    pub market: MarketTargets,
}

impl ScoringConfig {
    /// Build from the application config. A missing `[scoring]` section is a config error.
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        let section = config.scoring.as_ref().ok_or_else(|| {
            LeadQualError::config("missing [scoring] section; run `leadqual config init` for a sample")
        })?;
        Self::try_from(section)
    }

    /// Points allocated to `category` out of 100. Unlisted categories get 0.
    pub fn category_weight(&self, category: Category) -> f64 {
        self.weights.get(&category).copied().unwrap_or(0.0)
    }

    /// Criterion fractions configured for `category`.
    pub fn criteria(&self, category: Category) -> impl Iterator<Item = (Criterion, f64)> + '_ {
        self.criteria
            .get(&category)
            .into_iter()
            .flat_map(|m| m.iter().map(|(c, f)| (*c, *f)))
    }
}

impl TryFrom<&ScoringSection> for ScoringConfig {
    type Error = LeadQualError;

    fn try_from(section: &ScoringSection) -> Result<Self> {
        let mut weights = BTreeMap::new();
        for (name, weight) in &section.weights {
            let category = parse_category(name)?;
            if !weight.is_finite() || *weight < 0.0 {
                return Err(LeadQualError::config(format!(
                    "weight for '{name}' must be a non-negative number, got {weight}"
                )));
            }
            weights.insert(category, *weight);
        }

        let total: f64 = weights.values().sum();
        if (total - 100.0).abs() > EPSILON {
            return Err(LeadQualError::config(format!(
                "category weights sum to {total}, expected 100"
            )));
        }

        let mut criteria = BTreeMap::new();
        for (category, raw) in [
            (Category::Individual, &section.individual.criteria),
            (Category::Company, &section.company.criteria),
            (Category::Technical, &section.technical.criteria),
            (Category::Market, &section.market.criteria),
        ] {
            criteria.insert(category, parse_fractions(category, raw)?);
        }

        let company = &section.company;
        if let (Some(min), Some(max)) = (company.min_employees, company.max_employees) {
            if min > max {
                return Err(LeadQualError::config(format!(
                    "company employee range is inverted: {min} > {max}"
                )));
            }
        }
        if let (Some(min), Some(max)) = (company.min_revenue, company.max_revenue) {
            if min > max {
                return Err(LeadQualError::config(format!(
                    "company revenue range is inverted: {min} > {max}"
                )));
            }
        }

        Ok(Self {
            weights,
            criteria,
            individual: IndividualTargets {
                target_roles: normalize_all(&section.individual.target_roles),
                target_departments: normalize_all(&section.individual.target_departments),
                required_skills: normalize_all(&section.individual.required_skills),
                criteria: section.individual.criteria.clone(),
            },
            company: CompanyTargets {
                target_industries: normalize_all(&section.company.target_industries),
                target_locations: normalize_all(&section.company.target_locations),
                growth_stages: normalize_all(&section.company.growth_stages),
                ..section.company.clone()
            },
            technical: TechnicalTargets {
                required_technologies: normalize_all(&section.technical.required_technologies),
                standard_integrations: normalize_all(&section.technical.standard_integrations),
                criteria: section.technical.criteria.clone(),
            },
            market: MarketTargets {
                pain_keywords: normalize_all(&section.market.pain_keywords),
                criteria: section.market.criteria.clone(),
            },
        })
    }
}

fn parse_fractions(
    category: Category,
    raw: &BTreeMap<String, f64>,
) -> Result<BTreeMap<Criterion, f64>> {
    let mut parsed = BTreeMap::new();
    for (name, fraction) in raw {
        let criterion: Criterion = name.parse()?;
        if criterion.category() != category {
            return Err(LeadQualError::config(format!(
                "criterion '{criterion}' belongs to {}, not {category}",
                criterion.category()
            )));
        }
        if !fraction.is_finite() || !(0.0..=1.0).contains(fraction) {
            return Err(LeadQualError::config(format!(
                "fraction for '{criterion}' must be within [0, 1], got {fraction}"
            )));
        }
        parsed.insert(criterion, *fraction);
    }

    if !parsed.is_empty() {
        let sum: f64 = parsed.values().sum();
        if (sum - 1.0).abs() > EPSILON {
            return Err(LeadQualError::config(format!(
                "{category} criterion fractions sum to {sum}, expected 1.0"
            )));
        }
    }
    Ok(parsed)
}

/// Lower-case and trim a list of targets, dropping blanks.
pub(crate) fn normalize_all(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section() -> ScoringSection {
        ScoringSection::sample()
    }

    #[test]
    fn sample_section_validates() {
        let config = ScoringConfig::try_from(&section()).expect("valid sample");
        assert_eq!(config.category_weight(Category::Individual), 39.0);
        assert_eq!(config.criteria(Category::Company).count(), 5);
        assert!(config.company.target_industries.contains(&"saas".to_string()));
    }

    #[test]
    fn weights_summing_to_100_are_accepted_everywhere() {
        for individual in (0..=100).step_by(10) {
            for company in (0..=100 - individual).step_by(10) {
                for technical in (0..=100 - individual - company).step_by(10) {
                    let market = 100 - individual - company - technical;
                    let mut s = section();
                    s.weights = BTreeMap::from([
                        ("individual".to_string(), individual as f64),
                        ("company".to_string(), company as f64),
                        ("technical".to_string(), technical as f64),
                        ("market".to_string(), market as f64),
                    ]);
                    let config = ScoringConfig::try_from(&s).expect("valid weights");
                    let total: f64 = Category::ALL
                        .into_iter()
                        .map(|c| config.category_weight(c))
                        .sum();
                    assert!((total - 100.0).abs() < EPSILON);
                }
            }
        }
    }

    #[test]
    fn weights_not_summing_to_100_are_rejected() {
        for delta in [-10.0, -0.5, 0.5, 1.0, 25.0] {
            let mut s = section();
            *s.weights.get_mut("market").expect("market weight") += delta;
            let err = ScoringConfig::try_from(&s).expect_err("must reject");
            assert!(matches!(err, LeadQualError::Config { .. }), "{err}");
            assert!(err.to_string().contains("sum to"));
        }
    }

    #[test]
    fn missing_section_is_config_error() {
        let mut app = AppConfig::default();
        app.scoring = None;
        let err = ScoringConfig::from_app_config(&app).expect_err("missing section");
        assert!(err.to_string().contains("missing [scoring]"));
    }

    #[test]
    fn rejects_negative_weight_and_unknown_category() {
        let mut s = section();
        s.weights.insert("individual".into(), -1.0);
        s.weights.insert("company".into(), 77.0);
        assert!(ScoringConfig::try_from(&s).is_err());

        let mut s = section();
        s.weights.insert("vibes".into(), 0.0);
        let err = ScoringConfig::try_from(&s).expect_err("unknown category");
        assert!(err.to_string().contains("vibes"));
    }

    #[test]
    fn rejects_misplaced_or_unknown_criteria() {
        let mut s = section();
        s.individual.criteria.insert("industry_match".into(), 0.0);
        let err = ScoringConfig::try_from(&s).expect_err("misplaced");
        assert!(err.to_string().contains("belongs to company"));

        let mut s = section();
        s.market.criteria.insert("astrology".into(), 0.0);
        assert!(ScoringConfig::try_from(&s).is_err());
    }

    #[test]
    fn rejects_bad_fractions() {
        let mut s = section();
        s.technical.criteria.insert("tech_stack_match".into(), 0.6);
        let err = ScoringConfig::try_from(&s).expect_err("sum != 1");
        assert!(err.to_string().contains("fractions sum"));

        let mut s = section();
        s.technical.criteria = BTreeMap::from([("tech_stack_match".into(), 1.5)]);
        assert!(ScoringConfig::try_from(&s).is_err());
    }

    #[test]
    fn empty_category_criteria_is_allowed() {
        let mut s = section();
        s.market.criteria.clear();
        let config = ScoringConfig::try_from(&s).expect("valid");
        assert_eq!(config.criteria(Category::Market).count(), 0);
    }

    #[test]
    fn rejects_inverted_ranges() {
        let mut s = section();
        s.company.min_employees = Some(600);
        s.company.max_employees = Some(50);
        let err = ScoringConfig::try_from(&s).expect_err("inverted");
        assert!(err.to_string().contains("inverted"));
    }

    #[test]
    fn parses_from_toml() {
        let raw = r#"
[weights]
individual = 30
company = 40
technical = 15
market = 15

[company]
target_industries = ["SaaS"]
min_employees = 50
max_employees = 500
criteria = { industry_match = 0.5, size_match = 0.5 }
"#;
        let section: ScoringSection = toml::from_str(raw).expect("parse");
        let config = ScoringConfig::try_from(&section).expect("valid");
        assert_eq!(config.category_weight(Category::Company), 40.0);
        assert_eq!(config.company.target_industries, vec!["saas".to_string()]);
        assert_eq!(config.criteria(Category::Individual).count(), 0);
    }
}
