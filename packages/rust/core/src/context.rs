//! Immutable per-run context handed to every task node.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use leadqual_providers::{
    CompanyProvider, HttpCompanyProvider, HttpProfileProvider, HttpResearchProvider,
    LanguageModel, OpenAiChatModel, ProfileProvider, ResearchProvider,
};
use leadqual_scoring::ScoringConfig;
use leadqual_shared::{
    AppConfig, LeadQualError, Offer, OfferMode, ProviderConfig, Result, provider_api_key,
    validate_api_key,
};
use leadqual_storage::RecordStore;
use tokio::sync::OwnedMutexGuard;
use tracing::{info, warn};

use crate::cost::Pricing;
use crate::enrich::{EnrichmentCollector, ProviderSlot};
use crate::retry::RetryConfig;

/// Options chosen on the command line for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub mode: OfferMode,
    /// Offer to score in `evaluate-single` mode.
    pub offer_id: Option<String>,
    /// Re-run stages that are already `Completed`.
    pub force: bool,
}

impl RunOptions {
    pub fn validate(&self) -> Result<()> {
        if self.mode == OfferMode::EvaluateSingle && self.offer_id.is_none() {
            return Err(LeadQualError::config(
                "evaluate-single mode requires an offer id",
            ));
        }
        Ok(())
    }
}

/// Everything a lead pipeline needs. Built once, shared read-only.
pub struct PipelineContext {
    pub store: Arc<dyn RecordStore>,
    pub llm: Arc<dyn LanguageModel>,
    pub enrichment: EnrichmentCollector,
    pub scoring: ScoringConfig,
    pub offers: Vec<Offer>,
    pub options: RunOptions,
    pub retry: RetryConfig,
    pub pricing: Pricing,
    pub locks: IdentityLocks,
}

impl PipelineContext {
    /// Wire up HTTP providers from config, then open the store.
    ///
    /// `open_store` is only called once the run options, the scoring section
    /// and the LLM key have been validated, so a bad config leaves nothing on
    /// disk. Enrichment providers without a key are disabled.
    pub async fn from_config<F, Fut>(
        config: &AppConfig,
        options: RunOptions,
        open_store: F,
    ) -> Result<Self>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<dyn RecordStore>>>,
    {
        options.validate()?;
        let scoring = ScoringConfig::from_app_config(config)?;
        let llm_key = validate_api_key(config)?;
        let llm: Arc<dyn LanguageModel> = Arc::new(OpenAiChatModel::new(&config.llm, llm_key)?);

        let profile = slot(&config.providers.profile, |key| {
            Ok(Arc::new(HttpProfileProvider::new(&config.providers.profile, key)?)
                as Arc<dyn ProfileProvider>)
        })?;
        let company = slot(&config.providers.company, |key| {
            Ok(Arc::new(HttpCompanyProvider::new(&config.providers.company, key)?)
                as Arc<dyn CompanyProvider>)
        })?;
        let research = slot(&config.providers.research, |key| {
            Ok(Arc::new(HttpResearchProvider::new(&config.providers.research, key)?)
                as Arc<dyn ResearchProvider>)
        })?;

        info!(
            model = %config.llm.model,
            profile = profile.is_enabled(),
            company = company.is_enabled(),
            research = research.is_enabled(),
            offers = config.offers.len(),
            "pipeline context ready"
        );

        let store = open_store().await?;
        Ok(Self {
            store,
            llm,
            enrichment: EnrichmentCollector::new(&config.enrichment)
                .with_profile(profile)
                .with_company(company)
                .with_research(research),
            scoring,
            offers: config.offers.clone(),
            options,
            retry: RetryConfig::from(&config.pipeline),
            pricing: Pricing::new(config.pricing.clone()),
            locks: IdentityLocks::default(),
        })
    }
}

fn slot<T: ?Sized>(
    provider: &ProviderConfig,
    build: impl FnOnce(String) -> Result<Arc<T>>,
) -> Result<ProviderSlot<T>> {
    match provider_api_key(provider) {
        Some(key) => Ok(ProviderSlot::Enabled(build(key)?)),
        None => {
            warn!(env = %provider.api_key_env, "API key not set; provider disabled");
            Ok(ProviderSlot::disabled(format!("{} not set", provider.api_key_env)))
        }
    }
}

// ---------------------------------------------------------------------------
// Identity locks
// ---------------------------------------------------------------------------

/// Per-identity async locks serialising find-then-create.
///
/// Identities are compared case-insensitively, matching the store's
/// identity index. Idle entries are pruned on each acquisition.
#[derive(Default)]
pub struct IdentityLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl IdentityLocks {
    pub async fn lock(&self, identity: &str) -> OwnedMutexGuard<()> {
        let key = identity.trim().to_lowercase();
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.retain(|k, m| *k == key || Arc::strong_count(m) > 1);
            Arc::clone(map.entry(key).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of identities currently tracked.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
