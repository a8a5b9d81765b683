//! Application configuration for leadqual.
//!
//! User config lives at `~/.leadqual/leadqual.toml`.
//! CLI flags override config file values, which override defaults.
//! Credentials are never stored here: each provider names the environment
//! variable that holds its key.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LeadQualError, Result};
use crate::types::Offer;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "leadqual.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".leadqual";

// ---------------------------------------------------------------------------
// Config structs (matching leadqual.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    /// Scoring weights and targets. Required for `run`; validated by the scoring crate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring: Option<ScoringSection>,

    /// Per-model token prices.
    #[serde(default)]
    pub pricing: Vec<PricingEntry>,

    /// Offer catalogue.
    #[serde(default)]
    pub offers: Vec<Offer>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            defaults: DefaultsConfig::default(),
            pipeline: PipelineConfig::default(),
            llm: LlmConfig::default(),
            providers: ProvidersConfig::default(),
            enrichment: EnrichmentConfig::default(),
            scoring: Some(ScoringSection::sample()),
            pricing: default_pricing(),
            offers: default_offers(),
        }
    }
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path to the libSQL record store.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.leadqual/leadqual.db".into()
}

/// Within-lead node scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Independent nodes of one lead run at the same time.
    #[default]
    Concurrent,
    /// Nodes run one at a time in topological order.
    Sequential,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Leads processed at the same time.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Per-lead timeout in seconds. Nodes not started by then are skipped.
    #[serde(default = "default_lead_timeout")]
    pub lead_timeout_secs: u64,

    #[serde(default)]
    pub execution: ExecutionMode,

    /// Attempts for each record-store call before the lead fails.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            lead_timeout_secs: default_lead_timeout(),
            execution: ExecutionMode::default(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay(),
            retry_max_delay_ms: default_retry_max_delay(),
        }
    }
}

fn default_workers() -> usize {
    4
}
fn default_lead_timeout() -> u64 {
    300
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_base_delay() -> u64 {
    200
}
fn default_retry_max_delay() -> u64 {
    5_000
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,

    /// OpenAI-compatible chat completions base URL.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_llm_key_env(),
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            temperature: default_temperature(),
        }
    }
}

fn default_llm_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.2
}

/// One `[providers.*]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Name of the env var holding the API key.
    pub api_key_env: String,
    pub base_url: String,
    /// Model name, for providers that take one (research).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// `[providers]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_profile_provider")]
    pub profile: ProviderConfig,

    #[serde(default = "default_company_provider")]
    pub company: ProviderConfig,

    #[serde(default = "default_research_provider")]
    pub research: ProviderConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_provider(),
            company: default_company_provider(),
            research: default_research_provider(),
        }
    }
}

fn default_profile_provider() -> ProviderConfig {
    ProviderConfig {
        api_key_env: "PROXYCURL_API_KEY".into(),
        base_url: "https://nubela.co/proxycurl/api".into(),
        model: None,
    }
}
fn default_company_provider() -> ProviderConfig {
    ProviderConfig {
        api_key_env: "PROXYCURL_API_KEY".into(),
        base_url: "https://nubela.co/proxycurl/api".into(),
        model: None,
    }
}
fn default_research_provider() -> ProviderConfig {
    ProviderConfig {
        api_key_env: "PERPLEXITY_API_KEY".into(),
        base_url: "https://api.perplexity.ai".into(),
        model: Some("sonar".into()),
    }
}

/// A market-research question template. `{company}` and `{industry}` are substituted per lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchQuestion {
    /// Key the answer is stored under.
    pub key: String,
    pub template: String,
}

impl ResearchQuestion {
    pub fn render(&self, company: &str, industry: &str) -> String {
        self.template
            .replace("{company}", company)
            .replace("{industry}", industry)
    }
}

/// `[enrichment]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default = "default_research_questions")]
    pub research_questions: Vec<ResearchQuestion>,

    /// Answers shorter than this (after trimming) count as empty.
    #[serde(default = "default_min_answer_len")]
    pub min_answer_len: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            research_questions: default_research_questions(),
            min_answer_len: default_min_answer_len(),
        }
    }
}

fn default_research_questions() -> Vec<ResearchQuestion> {
    vec![
        ResearchQuestion {
            key: "recent_news".into(),
            template: "What recent news, funding or expansion has {company} announced?".into(),
        },
        ResearchQuestion {
            key: "operational_challenges".into(),
            template: "What operational challenges do {industry} companies like {company} face?"
                .into(),
        },
        ResearchQuestion {
            key: "technology_initiatives".into(),
            template: "What technology or automation initiatives is {company} pursuing?".into(),
        },
    ]
}
fn default_min_answer_len() -> usize {
    10
}

/// `[[pricing]]` entry. Cost = tokens * price / `unit_of_tokens`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingEntry {
    pub model: String,
    pub prompt_price: f64,
    pub completion_price: f64,
    #[serde(default = "default_unit_of_tokens")]
    pub unit_of_tokens: u64,
}

fn default_unit_of_tokens() -> u64 {
    1_000_000
}

fn default_pricing() -> Vec<PricingEntry> {
    vec![
        PricingEntry {
            model: "gpt-4o-mini".into(),
            prompt_price: 0.15,
            completion_price: 0.60,
            unit_of_tokens: default_unit_of_tokens(),
        },
        PricingEntry {
            model: "sonar".into(),
            prompt_price: 1.0,
            completion_price: 1.0,
            unit_of_tokens: default_unit_of_tokens(),
        },
    ]
}

fn default_offers() -> Vec<Offer> {
    vec![
        Offer {
            id: "workflow-automation".into(),
            name: "Workflow Automation Sprint".into(),
            category: "automation".into(),
            description: "Two-week engagement automating a high-volume manual process.".into(),
            industry_fit: vec!["SaaS".into(), "E-commerce".into()],
            target_client_type: "mid-market".into(),
        },
        Offer {
            id: "ai-assistant".into(),
            name: "Internal AI Assistant".into(),
            category: "ai".into(),
            description: "Retrieval-backed assistant over internal documentation.".into(),
            industry_fit: vec!["SaaS".into(), "Financial Services".into()],
            target_client_type: "enterprise".into(),
        },
    ]
}

// ---------------------------------------------------------------------------
// [scoring] (raw shape; validated into ScoringConfig by the scoring crate)
// ---------------------------------------------------------------------------

/// `[scoring]` section as written in TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringSection {
    /// Category allocations, keyed by category name. Must sum to 100.
    pub weights: BTreeMap<String, f64>,

    #[serde(default)]
    pub individual: IndividualTargets,

    #[serde(default)]
    pub company: CompanyTargets,

    #[serde(default)]
    pub technical: TechnicalTargets,

    #[serde(default)]
    pub market: MarketTargets,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndividualTargets {
    #[serde(default)]
    pub target_roles: Vec<String>,
    #[serde(default)]
    pub target_departments: Vec<String>,
    #[serde(default)]
    pub required_skills: Vec<String>,
    /// Criterion name -> fraction of the category.
    #[serde(default)]
    pub criteria: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyTargets {
    #[serde(default)]
    pub target_industries: Vec<String>,
    #[serde(default)]
    pub min_employees: Option<u64>,
    #[serde(default)]
    pub max_employees: Option<u64>,
    #[serde(default)]
    pub target_locations: Vec<String>,
    #[serde(default)]
    pub growth_stages: Vec<String>,
    #[serde(default)]
    pub min_revenue: Option<f64>,
    #[serde(default)]
    pub max_revenue: Option<f64>,
    #[serde(default)]
    pub criteria: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechnicalTargets {
    #[serde(default)]
    pub required_technologies: Vec<String>,
    #[serde(default)]
    pub standard_integrations: Vec<String>,
    #[serde(default)]
    pub criteria: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketTargets {
    #[serde(default)]
    pub pain_keywords: Vec<String>,
    #[serde(default)]
    pub criteria: BTreeMap<String, f64>,
}

impl ScoringSection {
    /// The sample profile written by `config init`.
    pub fn sample() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let fractions = |items: &[(&str, f64)]| {
            items
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<BTreeMap<_, _>>()
        };

        Self {
            weights: fractions(&[
                ("individual", 39.0),
                ("company", 37.0),
                ("technical", 12.0),
                ("market", 12.0),
            ]),
            individual: IndividualTargets {
                target_roles: strings(&["ceo", "cto", "founder", "vp", "director", "head"]),
                target_departments: strings(&["engineering", "operations", "executive"]),
                required_skills: strings(&["automation", "leadership", "saas"]),
                criteria: fractions(&[
                    ("role_match", 0.3),
                    ("authority_match", 0.3),
                    ("department_match", 0.2),
                    ("skills_match", 0.2),
                ]),
            },
            company: CompanyTargets {
                target_industries: strings(&["saas", "software", "e-commerce", "fintech"]),
                min_employees: Some(50),
                max_employees: Some(500),
                target_locations: strings(&["united states", "canada", "united kingdom"]),
                growth_stages: strings(&["series a", "series b", "growth"]),
                min_revenue: Some(1_000_000.0),
                max_revenue: Some(100_000_000.0),
                criteria: fractions(&[
                    ("industry_match", 0.3),
                    ("size_match", 0.25),
                    ("location_match", 0.15),
                    ("growth_match", 0.15),
                    ("revenue_match", 0.15),
                ]),
            },
            technical: TechnicalTargets {
                required_technologies: strings(&["aws", "salesforce", "hubspot", "slack"]),
                standard_integrations: strings(&["rest api", "zapier", "webhooks"]),
                criteria: fractions(&[
                    ("tech_stack_match", 0.5),
                    ("integration_feasibility", 0.25),
                    ("infrastructure_compatibility", 0.25),
                ]),
            },
            market: MarketTargets {
                pain_keywords: strings(&["manual", "scaling", "efficiency", "integration"]),
                criteria: fractions(&[
                    ("funding_signal", 0.2),
                    ("research_coverage", 0.2),
                    ("pain_severity", 0.4),
                    ("keyword_match", 0.2),
                ]),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.leadqual/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| LeadQualError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.leadqual/leadqual.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LeadQualError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| LeadQualError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = config_file_path()?;
    write_default_config(&path)?;
    Ok(path)
}

/// Write the default config to `path`, creating parent directories.
pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| LeadQualError::io(dir, e))?;
    }

    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| LeadQualError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| LeadQualError::io(path, e))?;
    tracing::info!(?path, "created default config file");
    Ok(())
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Read the LLM API key from the environment. A missing key is fatal.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.llm.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(LeadQualError::config(format!(
            "LLM API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Read an enrichment provider key. `None` disables that provider.
pub fn provider_api_key(provider: &ProviderConfig) -> Option<String> {
    std::env::var(&provider.api_key_env)
        .ok()
        .filter(|val| !val.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("db_path"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
        assert!(toml_str.contains("[scoring.weights]"));
        assert!(toml_str.contains("[[offers]]"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.pipeline.workers, 4);
        assert_eq!(parsed.llm.api_key_env, "OPENAI_API_KEY");
        assert_eq!(parsed.scoring, Some(ScoringSection::sample()));
        assert_eq!(parsed.enrichment.research_questions.len(), 3);
        assert_eq!(parsed.offers.len(), 2);
    }

    #[test]
    fn missing_scoring_section_stays_absent() {
        let toml_str = r#"
[defaults]
db_path = "/tmp/leads.db"

[pipeline]
workers = 2
execution = "sequential"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert!(config.scoring.is_none());
        assert_eq!(config.pipeline.workers, 2);
        assert_eq!(config.pipeline.execution, ExecutionMode::Sequential);
        assert_eq!(config.pipeline.retry_attempts, 3);
        assert_eq!(config.providers.research.model.as_deref(), Some("sonar"));
    }

    #[test]
    fn research_question_renders_placeholders() {
        let q = ResearchQuestion {
            key: "k".into(),
            template: "How is {company} doing in {industry}?".into(),
        };
        assert_eq!(q.render("Acme", "SaaS"), "How is Acme doing in SaaS?");
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.llm.api_key_env = "LQ_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }

    #[test]
    fn missing_provider_key_disables_provider() {
        let provider = ProviderConfig {
            api_key_env: "LQ_TEST_NONEXISTENT_PROVIDER_KEY".into(),
            base_url: "http://localhost".into(),
            model: None,
        };
        assert!(provider_api_key(&provider).is_none());
    }

    #[test]
    fn expands_home_prefix() {
        assert_eq!(expand_home("/tmp/x.db"), PathBuf::from("/tmp/x.db"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/x.db"), home.join("x.db"));
        }
    }
}
