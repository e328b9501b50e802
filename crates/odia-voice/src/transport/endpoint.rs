use std::time::Duration;

use odia_core::WidgetConfig;
use odia_core::contracts::http::WIDGET_CONFIG_PATH;
use reqwest::{Client, RequestBuilder};

use crate::error::VoiceError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the proxy lives and how to authenticate against it.
#[derive(Debug, Clone)]
pub struct ProxyEndpoint {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl ProxyEndpoint {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, VoiceError> {
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Self::with_client(client, base_url, api_key)
    }

    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, VoiceError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(VoiceError::InvalidEndpoint(base_url));
        }
        Ok(Self {
            client,
            base_url,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Same endpoint, different widget key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub(crate) fn post(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.post(self.url(path)))
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Fetch the public widget configuration.
    pub async fn widget_config(&self) -> Result<WidgetConfig, VoiceError> {
        let response = self
            .authorize(self.client.get(self.url(WIDGET_CONFIG_PATH)))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}
