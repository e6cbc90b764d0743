use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{decode, endpoint, send, KeyIssuer, KeyProvider};
use crate::error::ProviderError;
use crate::keys::{DeployKey, KeyOrigin, KeyRole, RepositoryTarget};

/// key: circleci-checkout-keys
/// Checkout-key API of the CI provider, addressed at `{api}/project/{vcs}/{org}`.
pub struct CircleCiClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct CheckoutKeyListing {
    #[serde(default)]
    items: Vec<CheckoutKeyRecord>,
}

#[derive(Debug, Deserialize)]
struct CheckoutKeyRecord {
    fingerprint: String,
    public_key: String,
    #[serde(rename = "type")]
    key_type: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl CheckoutKeyRecord {
    fn into_deploy_key(self) -> DeployKey {
        DeployKey::new(
            KeyOrigin::Ci,
            KeyRole::from_checkout_type(&self.key_type),
            self.fingerprint,
            &self.public_key,
        )
        .with_created_at(self.created_at)
    }
}

impl CircleCiClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build CircleCI client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
        })
    }

    fn auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.header("Circle-Token", &self.token)
    }
}

#[async_trait]
impl KeyProvider for CircleCiClient {
    fn origin(&self) -> KeyOrigin {
        KeyOrigin::Ci
    }

    async fn list_keys(&self, target: &RepositoryTarget) -> Result<Vec<DeployKey>, ProviderError> {
        let request = self.auth(self.client.get(endpoint(&self.base_url, &target.ci_path)));
        let response = send(KeyOrigin::Ci, request).await?;
        let listing: CheckoutKeyListing = decode(KeyOrigin::Ci, response).await?;
        debug!(
            repository = %target.name,
            count = listing.items.len(),
            "listed circleci checkout keys"
        );

        Ok(listing
            .items
            .into_iter()
            .map(CheckoutKeyRecord::into_deploy_key)
            .collect())
    }

    async fn delete_key(
        &self,
        target: &RepositoryTarget,
        identifier: &str,
    ) -> Result<(), ProviderError> {
        let path = format!("{}/{identifier}", target.ci_path);
        let request = self.auth(self.client.delete(endpoint(&self.base_url, &path)));
        send(KeyOrigin::Ci, request).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyIssuer for CircleCiClient {
    async fn issue_key(&self, target: &RepositoryTarget) -> Result<DeployKey, ProviderError> {
        let request = self
            .auth(self.client.post(endpoint(&self.base_url, &target.ci_path)))
            .json(&json!({ "type": KeyRole::DeployKey.as_str() }));
        let response = send(KeyOrigin::Ci, request).await?;
        let created: CheckoutKeyRecord = decode(KeyOrigin::Ci, response).await?;
        Ok(created.into_deploy_key())
    }
}
