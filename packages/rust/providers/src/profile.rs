//! LinkedIn profile enrichment over a Proxycurl-style person endpoint.

use async_trait::async_trait;
use leadqual_shared::{Experience, ProfileData, ProviderConfig, ProviderError, Result};
use reqwest::Client;
use serde::Deserialize;

use crate::http::{DEFAULT_TIMEOUT_SECS, build_client, check_status, endpoint};
use crate::traits::{ProfileProvider, ProviderResult};

const PROVIDER: &str = "profile";

#[derive(Debug, Clone)]
pub struct HttpProfileProvider {
    client: Client,
    url: String,
    api_key: String,
}

impl HttpProfileProvider {
    pub fn new(config: &ProviderConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: build_client(DEFAULT_TIMEOUT_SECS)?,
            url: endpoint(&config.base_url, "v2/linkedin"),
            api_key,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireProfile {
    #[serde(default)]
    headline: Option<String>,
    #[serde(default)]
    occupation: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    skills: Vec<String>,
    #[serde(default)]
    experiences: Vec<WireExperience>,
}

#[derive(Debug, Deserialize)]
struct WireExperience {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    starts_at: Option<WireDate>,
    #[serde(default)]
    ends_at: Option<WireDate>,
}

#[derive(Debug, Deserialize)]
struct WireDate {
    year: i32,
    #[serde(default)]
    month: Option<u32>,
}

impl WireDate {
    fn render(&self) -> String {
        match self.month {
            Some(month) => format!("{:04}-{:02}", self.year, month),
            None => format!("{:04}", self.year),
        }
    }
}

impl From<WireProfile> for ProfileData {
    fn from(wire: WireProfile) -> Self {
        Self {
            headline: wire.headline,
            occupation: wire.occupation,
            summary: wire.summary,
            skills: wire.skills,
            experiences: wire
                .experiences
                .into_iter()
                .filter_map(|e| {
                    Some(Experience {
                        title: e.title?,
                        company: e.company.unwrap_or_default(),
                        starts_at: e.starts_at.as_ref().map(WireDate::render),
                        ends_at: e.ends_at.as_ref().map(WireDate::render),
                    })
                })
                .collect(),
        }
    }
}

#[async_trait]
impl ProfileProvider for HttpProfileProvider {
    async fn lookup_profile(&self, linkedin_url: &str) -> ProviderResult<ProfileData> {
        let response = self
            .client
            .get(&self.url)
            .bearer_auth(&self.api_key)
            .query(&[("url", linkedin_url), ("skills", "include")])
            .send()
            .await
            .map_err(|e| ProviderError::new(PROVIDER, format!("{}: {e}", self.url)))?;

        let response = check_status(PROVIDER, response).await?;
        let wire: WireProfile = response
            .json()
            .await
            .map_err(|e| ProviderError::new(PROVIDER, format!("malformed profile body: {e}")))?;
        Ok(wire.into())
    }
}
