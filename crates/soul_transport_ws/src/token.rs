use async_trait::async_trait;
use soul_engine_api::{SoulEngineApiClient, SoulEngineApiConfig, SoulEngineApiError};
use soul_transport::{AuthTokenError, TokenSource};
use tracing::debug;

pub const TOKEN_FETCH_FAILED: &str = "Failed to fetch auth token";
pub const TOKEN_MISSING: &str = "Auth token missing from response";

/// Token source backed by the engine's `POST /auth/token` endpoint.
#[derive(Debug, Clone)]
pub struct EngineTokenSource {
    client: SoulEngineApiClient,
}

impl EngineTokenSource {
    pub fn new(config: SoulEngineApiConfig) -> Result<Self, SoulEngineApiError> {
        SoulEngineApiClient::new(config).map(Self::from_client)
    }

    #[must_use]
    pub fn from_client(client: SoulEngineApiClient) -> Self {
        Self { client }
    }

    #[must_use]
    pub fn client(&self) -> &SoulEngineApiClient {
        &self.client
    }
}

#[async_trait]
impl TokenSource for EngineTokenSource {
    async fn fetch_token(&self, soul_id: &str) -> Result<String, AuthTokenError> {
        self.client.fetch_token(soul_id).await.map_err(|error| {
            debug!(endpoint = %self.client.token_endpoint(), %error, "auth token request failed");
            map_token_error(&error)
        })
    }
}

/// Collapses endpoint failures into the two user-facing token messages.
#[must_use]
pub fn map_token_error(error: &SoulEngineApiError) -> AuthTokenError {
    match error {
        SoulEngineApiError::MissingToken => AuthTokenError::new(TOKEN_MISSING),
        _ => AuthTokenError::new(TOKEN_FETCH_FAILED),
    }
}
