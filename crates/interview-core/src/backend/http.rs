use async_trait::async_trait;
use reqwest::Client;

use super::{Backend, RawResponse};
use crate::config::Config;
use crate::error::ClientError;

/// [`Backend`] over HTTP.
///
/// No client-side timeout is configured; requests run until the transport
/// gives up.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.api_base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read(response: reqwest::Response) -> Result<RawResponse, ClientError> {
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(RawResponse::new(status, body.to_vec()))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<RawResponse, ClientError> {
        let url = self.url(path);
        tracing::debug!(%url, "POST");

        let response = self.client.post(&url).json(&body).send().await?;
        Self::read(response).await
    }

    async fn get(&self, path: &str) -> Result<RawResponse, ClientError> {
        let url = self.url(path);
        tracing::debug!(%url, "GET");

        let response = self.client.get(&url).send().await?;
        Self::read(response).await
    }
}
