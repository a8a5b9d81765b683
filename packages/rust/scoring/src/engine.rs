//! The scoring engine: pure functions from attributes and config to scores.
//!
//! Normalisation: each breakdown entry's `weight` is the criterion's fraction
//! of its category allocation, expressed in points (entries sum to the
//! category weight). `weighted_total` is the category's contribution to the
//! 0..100 lead score; `total` rescales it to a 0..100 category score.

use std::collections::BTreeMap;

use leadqual_shared::Category;
use leadqual_shared::coerce::round1;
use serde::{Deserialize, Serialize};

use crate::config::{Criterion, ScoringConfig};
use crate::criteria::{Attributes, evaluate};

/// Version of the criterion formulas. Stored alongside scores.
pub const FORMULA_VERSION: u32 = 1;

/// One sub-criterion's contribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Sub-score in `0..=100`.
    pub score: f64,
    /// Points of the lead total this criterion can contribute.
    pub weight: f64,
}

/// The scored outcome of one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Category score in `0..=100`, one decimal.
    pub total: f64,
    /// Contribution to the lead score in `0..=category_weight`, one decimal.
    pub weighted_total: f64,
    pub breakdown: BTreeMap<Criterion, ScoreBreakdown>,
}

impl EvaluationResult {
    pub fn empty() -> Self {
        Self {
            total: 0.0,
            weighted_total: 0.0,
            breakdown: BTreeMap::new(),
        }
    }
}

/// Score one category.
pub fn score(category: Category, attrs: &Attributes, config: &ScoringConfig) -> EvaluationResult {
    let category_weight = config.category_weight(category);

    let breakdown: BTreeMap<Criterion, ScoreBreakdown> = config
        .criteria(category)
        .map(|(criterion, fraction)| {
            let entry = ScoreBreakdown {
                score: evaluate(criterion, attrs, config).clamp(0.0, 100.0),
                weight: fraction * category_weight,
            };
            (criterion, entry)
        })
        .collect();

    if breakdown.is_empty() {
        return EvaluationResult::empty();
    }

    let weighted: f64 = breakdown.values().map(|b| b.score * b.weight / 100.0).sum();
    let total = if category_weight > 0.0 {
        weighted * 100.0 / category_weight
    } else {
        0.0
    };

    EvaluationResult {
        total: round1(total),
        weighted_total: round1(weighted),
        breakdown,
    }
}

// ---------------------------------------------------------------------------
// LeadScore
// ---------------------------------------------------------------------------

/// Qualification tier derived from the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadTier {
    High,
    Medium,
    Low,
}

impl LeadTier {
    pub fn from_score(overall: f64) -> Self {
        if overall >= 70.0 {
            Self::High
        } else if overall >= 40.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

impl std::fmt::Display for LeadTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All category results for a lead plus the combined score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadScore {
    pub categories: BTreeMap<Category, EvaluationResult>,
    /// Sum of category contributions, `0..=100`, one decimal.
    pub overall: f64,
    pub tier: LeadTier,
}

impl LeadScore {
    pub fn from_results(results: impl IntoIterator<Item = (Category, EvaluationResult)>) -> Self {
        let categories: BTreeMap<_, _> = results.into_iter().collect();
        let overall = round1(categories.values().map(|r| r.weighted_total).sum());
        Self {
            categories,
            overall,
            tier: LeadTier::from_score(overall),
        }
    }
}

#[cfg(test)]
mod tests {
    use leadqual_shared::ScoringSection;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::criteria::PainSeverity;

    fn scenario_a_config() -> ScoringConfig {
        let raw = r#"
[weights]
individual = 30
company = 40
technical = 15
market = 15

[company]
target_industries = ["SaaS", "Fintech"]
min_employees = 50
max_employees = 500
criteria = { industry_match = 0.5, size_match = 0.5 }
"#;
        let section: ScoringSection = toml::from_str(raw).expect("parse");
        ScoringConfig::try_from(&section).expect("valid")
    }

    #[test]
    fn full_company_match_scores_100() {
        let attrs = Attributes {
            industry: Some("saas".into()),
            employee_count: Some(120),
            ..Default::default()
        };
        let result = score(Category::Company, &attrs, &scenario_a_config());

        assert_eq!(result.total, 100.0);
        assert_eq!(result.weighted_total, 40.0);
        assert_eq!(
            result.breakdown,
            BTreeMap::from([
                (
                    Criterion::IndustryMatch,
                    ScoreBreakdown {
                        score: 100.0,
                        weight: 20.0
                    }
                ),
                (
                    Criterion::SizeMatch,
                    ScoreBreakdown {
                        score: 100.0,
                        weight: 20.0
                    }
                ),
            ])
        );
    }

    #[test]
    fn weighted_total_matches_breakdown_sum() {
        let attrs = Attributes {
            industry: Some("saas".into()),
            employee_count: Some(900),
            ..Default::default()
        };
        let result = score(Category::Company, &attrs, &scenario_a_config());
        let expected: f64 = result
            .breakdown
            .values()
            .map(|b| b.score * b.weight / 100.0)
            .sum();
        assert_eq!(result.weighted_total, round1(expected));
        assert_eq!(result.weighted_total, 20.0);
        assert_eq!(result.total, 50.0);
    }

    #[test]
    fn category_without_criteria_is_empty() {
        let result = score(
            Category::Individual,
            &Attributes::default(),
            &scenario_a_config(),
        );
        assert_eq!(result, EvaluationResult::empty());
    }

    #[test]
    fn zero_weight_category_scores_zero() {
        let mut section = ScoringSection::sample();
        section.weights.insert("technical".into(), 0.0);
        section.weights.insert("market".into(), 24.0);
        let config = ScoringConfig::try_from(&section).expect("valid");
        let attrs = Attributes {
            cloud_ready: Some(true),
            api_enabled: Some(true),
            ..Default::default()
        };
        let result = score(Category::Technical, &attrs, &config);
        assert_eq!(result.total, 0.0);
        assert_eq!(result.weighted_total, 0.0);
        assert_eq!(result.breakdown.len(), 3);
    }

    #[test]
    fn scoring_is_pure() {
        let config = ScoringConfig::try_from(&ScoringSection::sample()).expect("valid");
        let attrs = Attributes {
            role: Some("vp of engineering".into()),
            seniority: Some("vp".into()),
            departments: vec!["engineering".into()],
            skills: vec!["automation".into()],
            industry: Some("saas".into()),
            employee_count: Some(200),
            technologies: ["aws".to_string(), "slack".to_string()].into(),
            funding: Some("series a".into()),
            research_asked: 3,
            research_answered: 2,
            ..Default::default()
        }
        .with_pain(PainSeverity::High, "manual reporting");

        for category in Category::ALL {
            let first = score(category, &attrs, &config);
            for _ in 0..5 {
                assert_eq!(score(category, &attrs, &config), first);
            }
        }
    }

    #[test]
    fn lead_score_sums_contributions_and_tiers() {
        let make = |weighted_total: f64| EvaluationResult {
            total: 0.0,
            weighted_total,
            breakdown: BTreeMap::new(),
        };
        let score = LeadScore::from_results([
            (Category::Individual, make(30.0)),
            (Category::Company, make(40.0)),
            (Category::Technical, make(0.3)),
        ]);
        assert_eq!(score.overall, 70.3);
        assert_eq!(score.tier, LeadTier::High);

        assert_eq!(LeadTier::from_score(40.0), LeadTier::Medium);
        assert_eq!(LeadTier::from_score(39.9), LeadTier::Low);
    }
}
