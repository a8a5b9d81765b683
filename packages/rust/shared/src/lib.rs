//! Shared types, error model, and configuration for leadqual.
//!
//! This crate is the foundation depended on by all other leadqual crates.
//! It provides:
//! - [`LeadQualError`], the unified error type
//! - Domain types ([`Lead`], [`LeadIdentity`], [`EnrichedProfile`], [`Stage`], [`EvaluationStatus`])
//! - Configuration ([`AppConfig`], config loading)
//! - Lenient value coercion shared by ingestion and the record store

pub mod coerce;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CompanyTargets, DefaultsConfig, EnrichmentConfig, ExecutionMode,
    IndividualTargets, LlmConfig, MarketTargets, PipelineConfig, PricingEntry, ProviderConfig,
    ProvidersConfig, ResearchQuestion, ScoringSection, TechnicalTargets, config_dir,
    config_file_path, expand_home, init_config, load_config, load_config_from, provider_api_key,
    validate_api_key, write_default_config,
};
pub use error::{LeadQualError, ProviderError, Result};
pub use types::{
    Category, CompanyData, EnrichedProfile, EvaluationStatus, Experience, Lead, LeadIdentity,
    Offer, OfferMode, ProfileData, Stage,
};
