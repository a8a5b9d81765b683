//! Weighted ICP scoring for leadqual.
//!
//! Pure and deterministic: no I/O, no clock, no randomness. Given the same
//! [`Attributes`] and [`ScoringConfig`], [`score`] always returns the same
//! [`EvaluationResult`].

pub mod config;
pub mod criteria;
pub mod engine;

pub use config::{Criterion, ScoringConfig};
pub use criteria::{Attributes, PainSeverity, evaluate};
pub use engine::{
    EvaluationResult, FORMULA_VERSION, LeadScore, LeadTier, ScoreBreakdown, score,
};
