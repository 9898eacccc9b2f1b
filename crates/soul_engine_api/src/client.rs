use reqwest::header::{HeaderValue, USER_AGENT};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::SoulEngineApiConfig;
use crate::error::{parse_error_message, SoulEngineApiError};
use crate::url::auth_token_url;

#[derive(Debug, Clone)]
pub struct SoulEngineApiClient {
    http: Client,
    config: SoulEngineApiConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    soul_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
}

impl SoulEngineApiClient {
    pub fn new(config: SoulEngineApiConfig) -> Result<Self, SoulEngineApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(SoulEngineApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &SoulEngineApiConfig {
        &self.config
    }

    pub fn token_endpoint(&self) -> String {
        auth_token_url(&self.config.http_host)
    }

    pub fn build_request(&self, soul_id: &str) -> Result<reqwest::RequestBuilder, SoulEngineApiError> {
        if soul_id.trim().is_empty() {
            return Err(SoulEngineApiError::MissingSoulId);
        }

        let endpoint = self.token_endpoint();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(SoulEngineApiError::InvalidHost(self.config.http_host.clone()));
        }

        let mut request = self
            .http
            .post(endpoint)
            .json(&TokenRequest { soul_id });
        if let Some(user_agent) = self.config.user_agent.as_deref() {
            let value = HeaderValue::from_str(user_agent).map_err(|_| {
                SoulEngineApiError::InvalidHeader(format!("user agent {user_agent:?}"))
            })?;
            request = request.header(USER_AGENT, value);
        }

        Ok(request)
    }

    /// Exchanges `soul_id` for a credential. Performs exactly one request.
    pub async fn fetch_token(&self, soul_id: &str) -> Result<String, SoulEngineApiError> {
        let response = self.build_request(soul_id)?.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(SoulEngineApiError::Status(
                status,
                parse_error_message(status, &body),
            ));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)?;
        parsed
            .token
            .filter(|token| !token.is_empty())
            .ok_or(SoulEngineApiError::MissingToken)
    }
}
