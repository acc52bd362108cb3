use crate::domain::model::AuthToken;
use crate::utils::error::{BeatError, Result};
use reqwest::Client;

/// 以 client credentials 流程向 Microsoft OAuth 端點換取 access token
pub struct TokenClient {
    http: Client,
    auth_url: String,
    resource_url: String,
    client_id: String,
    client_secret: String,
}

impl TokenClient {
    pub fn new(
        http: Client,
        auth_url: String,
        resource_url: String,
        client_id: String,
        client_secret: String,
    ) -> Self {
        Self {
            http,
            auth_url,
            resource_url,
            client_id,
            client_secret,
        }
    }

    pub async fn fetch(&self) -> Result<AuthToken> {
        tracing::info!("authenticating via {}", self.auth_url);

        let params = [
            ("grant_type", "client_credentials"),
            ("resource", self.resource_url.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];

        let response = self.http.post(&self.auth_url).form(&params).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BeatError::AuthError {
                status: status.as_u16(),
                body,
            });
        }

        let token: AuthToken = response.json().await?;
        tracing::debug!("got auth token, expires_on={}", token.expires_on);
        Ok(token)
    }
}
