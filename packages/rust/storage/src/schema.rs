//! Declared table schemas and outbound field coercion.
//!
//! Every write goes through [`TableSchema::coerce`]. Unknown fields and enum
//! values outside the allowed set are dropped with a warning; status-like enums
//! carry a fallback instead. Numbers accept the textual encodings handled by
//! [`coerce_number`].

use chrono::{DateTime, NaiveDate};
use leadqual_shared::Stage;
use leadqual_shared::coerce::coerce_number;
use serde_json::Value;
use tracing::warn;

use crate::value::{DATE_FORMAT, FieldMap, FieldValue};

// ---------------------------------------------------------------------------
// Schema types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text,
    /// Fixed choices. `fallback` replaces invalid values instead of dropping them.
    Enum {
        choices: &'static [&'static str],
        fallback: Option<&'static str>,
    },
    /// Rounded to `precision` decimal places.
    Number { precision: u32 },
    /// `YYYY-MM-DD`.
    Date,
    /// JSON blob stored as text.
    Json,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

impl TableSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Coerce outbound fields to their declared types.
    pub fn coerce(&self, fields: FieldMap) -> FieldMap {
        let mut out = FieldMap::new();
        for (name, value) in fields {
            let Some(spec) = self.field(&name) else {
                warn!(table = self.name, field = %name, "dropping unknown field");
                continue;
            };
            match coerce_value(&spec.kind, value) {
                Some(coerced) => {
                    out.insert(name, coerced);
                }
                None => warn!(table = self.name, field = %name, "dropping invalid value"),
            }
        }
        out
    }
}

fn coerce_value(kind: &FieldKind, value: FieldValue) -> Option<FieldValue> {
    match kind {
        FieldKind::Text => Some(FieldValue::Text(match value {
            FieldValue::Text(s) => s,
            FieldValue::Number(n) => format!("{n}"),
            FieldValue::Date(d) => d.format(DATE_FORMAT).to_string(),
            FieldValue::Json(Value::String(s)) => s,
            FieldValue::Json(v) => v.to_string(),
        })),
        FieldKind::Enum { choices, fallback } => {
            let raw = match &value {
                FieldValue::Text(s) => Some(s.trim()),
                FieldValue::Json(Value::String(s)) => Some(s.trim()),
                _ => None,
            };
            raw.and_then(|raw| choices.iter().find(|c| c.eq_ignore_ascii_case(raw)))
                .or(fallback.as_ref())
                .map(|choice| FieldValue::Text((*choice).to_string()))
        }
        FieldKind::Number { precision } => {
            let number = match value {
                FieldValue::Number(n) => Some(n),
                FieldValue::Text(s) => coerce_number(&s),
                FieldValue::Json(Value::Number(n)) => n.as_f64(),
                FieldValue::Json(Value::String(s)) => coerce_number(&s),
                _ => None,
            }?;
            number
                .is_finite()
                .then(|| FieldValue::Number(round_to(number, *precision)))
        }
        FieldKind::Date => match value {
            FieldValue::Date(d) => Some(FieldValue::Date(d)),
            FieldValue::Text(s) => parse_date(&s).map(FieldValue::Date),
            _ => None,
        },
        FieldKind::Json => Some(FieldValue::Json(match value {
            FieldValue::Json(v) => v,
            FieldValue::Text(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
            FieldValue::Number(n) => serde_json::Number::from_f64(n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Date(d) => Value::String(d.format(DATE_FORMAT).to_string()),
        })),
    }
}

fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

// ---------------------------------------------------------------------------
// Leads table
// ---------------------------------------------------------------------------

/// Allowed values of every evaluation status field.
pub const STATUS_CHOICES: &[&str] = &["Not Started", "In Progress", "Completed", "Needs Review"];

/// Allowed values of the campaign draft status.
pub const DRAFT_STATUS_CHOICES: &[&str] = &["Drafted", "Approved", "Sent"];

const STATUS: FieldKind = FieldKind::Enum {
    choices: STATUS_CHOICES,
    fallback: Some("Not Started"),
};
const SCORE: FieldKind = FieldKind::Number { precision: 1 };
const COUNT: FieldKind = FieldKind::Number { precision: 0 };

/// Field names of the `Leads` table.
pub mod leads {
    pub const IDENTITY: &str = "Identity";
    pub const LEAD_ID: &str = "Lead ID";
    pub const EMAIL: &str = "Email";
    pub const NAME: &str = "Name";
    pub const COMPANY: &str = "Company";
    pub const TITLE: &str = "Title";
    pub const INDUSTRY: &str = "Industry";
    pub const LINKEDIN_URL: &str = "LinkedIn URL";
    pub const WEBSITE: &str = "Website";

    pub const INDIVIDUAL_STATUS: &str = "Individual Evaluation Status";
    pub const COMPANY_STATUS: &str = "Company Evaluation Status";
    pub const TECHNICAL_STATUS: &str = "Technical Evaluation Status";
    pub const PAIN_POINT_STATUS: &str = "Pain Point Status";
    pub const OFFER_STATUS: &str = "Offer Status";
    pub const CAMPAIGN_STATUS: &str = "Campaign Status";

    pub const INDIVIDUAL_SCORE: &str = "Individual Score";
    pub const COMPANY_SCORE: &str = "Company Score";
    pub const TECHNICAL_SCORE: &str = "Technical Score";
    pub const MARKET_SCORE: &str = "Market Score";

    pub const INDIVIDUAL_ANALYSIS: &str = "Individual Analysis";
    pub const COMPANY_ANALYSIS: &str = "Company Analysis";
    pub const TECHNICAL_ANALYSIS: &str = "Technical Analysis";
    pub const PAIN_POINTS: &str = "Pain Points";
    pub const OFFER_RECOMMENDATION: &str = "Offer Recommendation";
    pub const CAMPAIGN_SUMMARY: &str = "Campaign Summary";

    pub const BEST_OFFER_ID: &str = "Best Offer ID";
    pub const OFFER_FIT_SCORE: &str = "Offer Fit Score";

    pub const LEAD_SCORE: &str = "Lead Score";
    pub const LEAD_TIER: &str = "Lead Tier";
    pub const FORMULA_VERSION: &str = "Formula Version";

    pub const PROFILE_DATA: &str = "Profile Data";
    pub const COMPANY_DATA: &str = "Company Data";
    pub const RESEARCH_DATA: &str = "Research Data";
    pub const ENRICHMENT_ERRORS: &str = "Enrichment Errors";

    pub const LAST_EVALUATED: &str = "Last Evaluated";
}

/// Field names of the `Campaign Drafts` table.
pub mod drafts {
    pub const LEAD_IDENTITY: &str = "Lead Identity";
    pub const LEAD_ID: &str = "Lead ID";
    pub const POSITION: &str = "Position";
    pub const SUBJECT: &str = "Subject";
    pub const BODY: &str = "Body";
    pub const WAIT_DAYS: &str = "Wait Days";
    pub const OFFER_ID: &str = "Offer ID";
    pub const STATUS: &str = "Status";
}

macro_rules! field {
    ($name:expr, $kind:expr) => {
        FieldSpec {
            name: $name,
            kind: $kind,
        }
    };
}

pub static LEADS: TableSchema = TableSchema {
    name: "Leads",
    fields: &[
        field!(leads::IDENTITY, FieldKind::Text),
        field!(leads::LEAD_ID, FieldKind::Text),
        field!(leads::EMAIL, FieldKind::Text),
        field!(leads::NAME, FieldKind::Text),
        field!(leads::COMPANY, FieldKind::Text),
        field!(leads::TITLE, FieldKind::Text),
        field!(leads::INDUSTRY, FieldKind::Text),
        field!(leads::LINKEDIN_URL, FieldKind::Text),
        field!(leads::WEBSITE, FieldKind::Text),
        field!(leads::INDIVIDUAL_STATUS, STATUS),
        field!(leads::COMPANY_STATUS, STATUS),
        field!(leads::TECHNICAL_STATUS, STATUS),
        field!(leads::PAIN_POINT_STATUS, STATUS),
        field!(leads::OFFER_STATUS, STATUS),
        field!(leads::CAMPAIGN_STATUS, STATUS),
        field!(leads::INDIVIDUAL_SCORE, SCORE),
        field!(leads::COMPANY_SCORE, SCORE),
        field!(leads::TECHNICAL_SCORE, SCORE),
        field!(leads::MARKET_SCORE, SCORE),
        field!(leads::INDIVIDUAL_ANALYSIS, FieldKind::Json),
        field!(leads::COMPANY_ANALYSIS, FieldKind::Json),
        field!(leads::TECHNICAL_ANALYSIS, FieldKind::Json),
        field!(leads::PAIN_POINTS, FieldKind::Json),
        field!(leads::OFFER_RECOMMENDATION, FieldKind::Json),
        field!(leads::CAMPAIGN_SUMMARY, FieldKind::Json),
        field!(leads::BEST_OFFER_ID, FieldKind::Text),
        field!(leads::OFFER_FIT_SCORE, SCORE),
        field!(leads::LEAD_SCORE, SCORE),
        field!(
            leads::LEAD_TIER,
            FieldKind::Enum {
                choices: &["High", "Medium", "Low"],
                fallback: None,
            }
        ),
        field!(leads::FORMULA_VERSION, COUNT),
        field!(leads::PROFILE_DATA, FieldKind::Json),
        field!(leads::COMPANY_DATA, FieldKind::Json),
        field!(leads::RESEARCH_DATA, FieldKind::Json),
        field!(leads::ENRICHMENT_ERRORS, FieldKind::Json),
        field!(leads::LAST_EVALUATED, FieldKind::Date),
    ],
};

pub static CAMPAIGN_DRAFTS: TableSchema = TableSchema {
    name: "Campaign Drafts",
    fields: &[
        field!(drafts::LEAD_IDENTITY, FieldKind::Text),
        field!(drafts::LEAD_ID, FieldKind::Text),
        field!(drafts::POSITION, COUNT),
        field!(drafts::SUBJECT, FieldKind::Text),
        field!(drafts::BODY, FieldKind::Text),
        field!(drafts::WAIT_DAYS, COUNT),
        field!(drafts::OFFER_ID, FieldKind::Text),
        field!(
            drafts::STATUS,
            FieldKind::Enum {
                choices: DRAFT_STATUS_CHOICES,
                fallback: Some("Drafted"),
            }
        ),
    ],
};

/// The `Leads` fields owned by one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageFields {
    pub status: &'static str,
    pub score: Option<&'static str>,
    pub analysis: &'static str,
}

pub fn stage_fields(stage: Stage) -> StageFields {
    match stage {
        Stage::Individual => StageFields {
            status: leads::INDIVIDUAL_STATUS,
            score: Some(leads::INDIVIDUAL_SCORE),
            analysis: leads::INDIVIDUAL_ANALYSIS,
        },
        Stage::Company => StageFields {
            status: leads::COMPANY_STATUS,
            score: Some(leads::COMPANY_SCORE),
            analysis: leads::COMPANY_ANALYSIS,
        },
        Stage::Technical => StageFields {
            status: leads::TECHNICAL_STATUS,
            score: Some(leads::TECHNICAL_SCORE),
            analysis: leads::TECHNICAL_ANALYSIS,
        },
        Stage::PainPoint => StageFields {
            status: leads::PAIN_POINT_STATUS,
            score: Some(leads::MARKET_SCORE),
            analysis: leads::PAIN_POINTS,
        },
        Stage::Offer => StageFields {
            status: leads::OFFER_STATUS,
            score: Some(leads::OFFER_FIT_SCORE),
            analysis: leads::OFFER_RECOMMENDATION,
        },
        Stage::Campaign => StageFields {
            status: leads::CAMPAIGN_STATUS,
            score: None,
            analysis: leads::CAMPAIGN_SUMMARY,
        },
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn one(name: &str, value: FieldValue) -> FieldMap {
        FieldMap::from([(name.to_string(), value)])
    }

    #[rstest]
    #[case("85/100", 85.0)]
    #[case("90%", 90.0)]
    #[case("High", 90.0)]
    #[case("Strong", 90.0)]
    #[case("Moderate", 70.0)]
    #[case("weak", 30.0)]
    #[case("72.46", 72.5)]
    fn numeric_fields_accept_textual_encodings(#[case] raw: &str, #[case] expected: f64) {
        let out = LEADS.coerce(one(leads::COMPANY_SCORE, FieldValue::text(raw)));
        assert_eq!(
            out.get(leads::COMPANY_SCORE),
            Some(&FieldValue::Number(expected))
        );
    }

    #[test]
    fn unparsable_number_is_dropped() {
        let out = LEADS.coerce(one(leads::COMPANY_SCORE, FieldValue::text("excellent")));
        assert!(out.is_empty());
    }

    #[test]
    fn status_falls_back_instead_of_dropping() {
        let out = LEADS.coerce(one(leads::COMPANY_STATUS, FieldValue::text("Done")));
        assert_eq!(
            out.get(leads::COMPANY_STATUS),
            Some(&FieldValue::text("Not Started"))
        );

        let out = LEADS.coerce(one(leads::COMPANY_STATUS, FieldValue::text("completed")));
        assert_eq!(
            out.get(leads::COMPANY_STATUS),
            Some(&FieldValue::text("Completed"))
        );
    }

    #[test]
    fn non_status_enum_drops_invalid_values() {
        let out = LEADS.coerce(one(leads::LEAD_TIER, FieldValue::text("Platinum")));
        assert!(out.is_empty());

        let out = CAMPAIGN_DRAFTS.coerce(one(drafts::STATUS, FieldValue::text("Archived")));
        assert_eq!(out.get(drafts::STATUS), Some(&FieldValue::text("Drafted")));
    }

    #[test]
    fn unknown_fields_are_dropped() {
        let mut fields = one("Favourite Colour", FieldValue::text("teal"));
        fields.insert(leads::COMPANY.into(), FieldValue::text("Acme"));
        let out = LEADS.coerce(fields);
        assert_eq!(out, one(leads::COMPANY, FieldValue::text("Acme")));
    }

    #[test]
    fn dates_and_json_are_normalised() {
        let out = LEADS.coerce(one(
            leads::LAST_EVALUATED,
            FieldValue::text("2024-05-01T10:20:30Z"),
        ));
        assert_eq!(
            out.get(leads::LAST_EVALUATED),
            Some(&FieldValue::Date(
                NaiveDate::from_ymd_opt(2024, 5, 1).expect("date")
            ))
        );

        let out = LEADS.coerce(one(leads::PAIN_POINTS, FieldValue::text("{\"a\":1}")));
        assert_eq!(
            out.get(leads::PAIN_POINTS),
            Some(&FieldValue::Json(serde_json::json!({"a": 1})))
        );

        let out = LEADS.coerce(one(leads::PAIN_POINTS, FieldValue::text("free text")));
        assert_eq!(
            out.get(leads::PAIN_POINTS),
            Some(&FieldValue::Json(Value::String("free text".into())))
        );
    }

    #[test]
    fn every_stage_status_field_is_declared() {
        for stage in Stage::ALL {
            let fields = stage_fields(stage);
            assert!(LEADS.field(fields.status).is_some(), "{stage}");
            assert!(LEADS.field(fields.analysis).is_some(), "{stage}");
            if let Some(score) = fields.score {
                assert!(LEADS.field(score).is_some(), "{stage}");
            }
        }
    }
}
