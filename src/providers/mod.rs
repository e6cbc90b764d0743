//! Clients for the two systems of record that hold deploy keys.

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::error::ProviderError;
use crate::keys::{DeployKey, KeyOrigin, RepositoryTarget};

pub mod circleci;
pub mod github;

pub use circleci::CircleCiClient;
pub use github::GitHubClient;

const ERROR_BODY_LIMIT: usize = 512;

/// key: key-provider
/// Read and delete access to the keys one provider holds for a repository.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    fn origin(&self) -> KeyOrigin;

    async fn list_keys(&self, target: &RepositoryTarget) -> Result<Vec<DeployKey>, ProviderError>;

    async fn delete_key(
        &self,
        target: &RepositoryTarget,
        identifier: &str,
    ) -> Result<(), ProviderError>;
}

/// A provider that can also mint a fresh deploy key.
#[async_trait]
pub trait KeyIssuer: KeyProvider {
    async fn issue_key(&self, target: &RepositoryTarget) -> Result<DeployKey, ProviderError>;
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

/// Send a request and turn transport failures and non-2xx statuses into typed errors.
pub(crate) async fn send(
    provider: KeyOrigin,
    request: RequestBuilder,
) -> Result<Response, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|err| ProviderError::from_transport(provider, err))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > ERROR_BODY_LIMIT {
        let mut cut = ERROR_BODY_LIMIT;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    Err(ProviderError::Status {
        provider,
        status,
        body,
    })
}

pub(crate) async fn decode<T: DeserializeOwned>(
    provider: KeyOrigin,
    response: Response,
) -> Result<T, ProviderError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|err| ProviderError::from_transport(provider, err))?;
    serde_json::from_slice(&bytes).map_err(|err| ProviderError::Decode {
        provider,
        reason: err.to_string(),
    })
}
