//! Company enrichment by website domain.

use async_trait::async_trait;
use leadqual_shared::{CompanyData, ProviderConfig, ProviderError, Result};
use reqwest::Client;
use serde::Deserialize;

use crate::http::{DEFAULT_TIMEOUT_SECS, build_client, check_status, endpoint};
use crate::traits::{CompanyProvider, ProviderResult};

const PROVIDER: &str = "company";

#[derive(Debug, Clone)]
pub struct HttpCompanyProvider {
    client: Client,
    url: String,
    api_key: String,
}

impl HttpCompanyProvider {
    pub fn new(config: &ProviderConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: build_client(DEFAULT_TIMEOUT_SECS)?,
            url: endpoint(&config.base_url, "linkedin/company"),
            api_key,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireCompany {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    industry: Option<String>,
    #[serde(default)]
    company_size_on_linkedin: Option<u64>,
    /// `[min, max]`, either side may be null.
    #[serde(default)]
    company_size: Option<(Option<u64>, Option<u64>)>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    hq: Option<WireLocation>,
    #[serde(default)]
    locations: Vec<WireLocation>,
    #[serde(default)]
    funding_data: Vec<WireFunding>,
    #[serde(default)]
    revenue: Option<f64>,
    #[serde(default)]
    technologies: Vec<String>,
    #[serde(default)]
    integrations: Vec<String>,
    #[serde(default)]
    cloud_ready: Option<bool>,
    #[serde(default)]
    api_enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct WireLocation {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

impl WireLocation {
    fn render(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.city, &self.state, &self.country]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .filter(|p| !p.trim().is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(", "))
    }
}

#[derive(Debug, Deserialize)]
struct WireFunding {
    #[serde(default)]
    funding_type: Option<String>,
    #[serde(default)]
    money_raised: Option<f64>,
}

impl From<WireCompany> for CompanyData {
    fn from(wire: WireCompany) -> Self {
        let employee_count = wire
            .company_size_on_linkedin
            .or_else(|| wire.company_size.and_then(|(min, max)| max.or(min)));

        let mut locations: Vec<String> = wire.hq.iter().filter_map(WireLocation::render).collect();
        for location in wire.locations.iter().filter_map(WireLocation::render) {
            if !locations.contains(&location) {
                locations.push(location);
            }
        }

        // The latest round is last in the provider's list.
        let latest_round = wire.funding_data.last();
        let growth_stage = latest_round.and_then(|f| f.funding_type.clone());
        let funding = latest_round.map(|f| match (&f.funding_type, f.money_raised) {
            (Some(kind), Some(amount)) => format!("{kind} (${amount:.0})"),
            (Some(kind), None) => kind.clone(),
            (None, Some(amount)) => format!("${amount:.0}"),
            (None, None) => "undisclosed round".to_string(),
        });

        Self {
            name: wire.name,
            industry: wire.industry,
            employee_count,
            revenue: wire.revenue,
            growth_stage,
            funding,
            description: wire.description,
            locations,
            technologies: wire.technologies,
            integrations: wire.integrations,
            cloud_ready: wire.cloud_ready,
            api_enabled: wire.api_enabled,
        }
    }
}

#[async_trait]
impl CompanyProvider for HttpCompanyProvider {
    async fn lookup_company(&self, domain: &str) -> ProviderResult<CompanyData> {
        let response = self
            .client
            .get(&self.url)
            .bearer_auth(&self.api_key)
            .query(&[("company_domain", domain)])
            .send()
            .await
            .map_err(|e| ProviderError::new(PROVIDER, format!("{}: {e}", self.url)))?;

        let response = check_status(PROVIDER, response).await?;
        let wire: WireCompany = response
            .json()
            .await
            .map_err(|e| ProviderError::new(PROVIDER, format!("malformed company body: {e}")))?;
        Ok(wire.into())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn maps_company_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/linkedin/company"))
            .and(query_param("company_domain", "acme.io"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "Acme",
                "industry": "Computer Software",
                "company_size": [51, 200],
                "hq": { "city": "Austin", "state": "TX", "country": "US" },
                "locations": [{ "city": "Austin", "state": "TX", "country": "US" }, { "city": "London", "country": "GB" }],
                "funding_data": [
                    { "funding_type": "Seed", "money_raised": 2000000 },
                    { "funding_type": "Series A", "money_raised": 12000000 }
                ],
                "technologies": ["AWS"],
                "api_enabled": true
            })))
            .mount(&server)
            .await;

        let config = ProviderConfig {
            api_key_env: "UNUSED".into(),
            base_url: server.uri(),
            model: None,
        };
        let provider = HttpCompanyProvider::new(&config, "key".into()).expect("client");
        let company = provider.lookup_company("acme.io").await.expect("company");

        assert_eq!(company.employee_count, Some(200));
        assert_eq!(company.growth_stage.as_deref(), Some("Series A"));
        assert_eq!(company.funding.as_deref(), Some("Series A ($12000000)"));
        assert_eq!(
            company.locations,
            vec!["Austin, TX, US".to_string(), "London, GB".to_string()]
        );
        assert_eq!(company.api_enabled, Some(true));
        assert_eq!(company.cloud_ready, None);
    }

    #[tokio::test]
    async fn malformed_body_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let config = ProviderConfig {
            api_key_env: "UNUSED".into(),
            base_url: server.uri(),
            model: None,
        };
        let provider = HttpCompanyProvider::new(&config, "key".into()).expect("client");
        let err = provider.lookup_company("acme.io").await.expect_err("bad body");
        assert!(err.message.contains("malformed company body"));
    }
}
