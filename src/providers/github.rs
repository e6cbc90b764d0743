use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, LINK};
use serde::Deserialize;
use tracing::debug;

use super::{decode, endpoint, send, KeyProvider};
use crate::error::ProviderError;
use crate::keys::{DeployKey, KeyOrigin, KeyRole, RepositoryTarget};

const GITHUB_API_VERSION: &str = "2022-11-28";
const PAGE_SIZE: &str = "100";

/// key: github-deploy-keys
/// Deploy-key API of the source host, addressed at `{api}/repos/{org}`.
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct GitHubDeployKey {
    id: GitHubKeyId,
    key: String,
}

/// GitHub documents numeric ids; fixtures and proxies sometimes hand back strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GitHubKeyId {
    Number(u64),
    Text(String),
}

impl GitHubKeyId {
    fn into_identifier(self) -> String {
        match self {
            GitHubKeyId::Number(id) => id.to_string(),
            GitHubKeyId::Text(id) => id,
        }
    }
}

impl GitHubClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static(GITHUB_API_VERSION));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .context("failed to build GitHub client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
        })
    }
}

#[async_trait]
impl KeyProvider for GitHubClient {
    fn origin(&self) -> KeyOrigin {
        KeyOrigin::Host
    }

    /// Follows `Link: rel="next"` until the last page.
    async fn list_keys(&self, target: &RepositoryTarget) -> Result<Vec<DeployKey>, ProviderError> {
        let mut keys: Vec<GitHubDeployKey> = Vec::new();
        let mut request = self
            .client
            .get(endpoint(&self.base_url, &target.host_path))
            .query(&[("per_page", PAGE_SIZE)]);
        let mut pages = 0usize;
        loop {
            let response = send(KeyOrigin::Host, request.bearer_auth(&self.token)).await?;
            let next = next_page(response.headers());
            let page: Vec<GitHubDeployKey> = decode(KeyOrigin::Host, response).await?;
            keys.extend(page);
            pages += 1;
            match next {
                Some(url) => request = self.client.get(url),
                None => break,
            }
        }
        debug!(
            repository = %target.name,
            count = keys.len(),
            pages,
            "listed github deploy keys"
        );

        Ok(keys
            .into_iter()
            .map(|record| {
                DeployKey::new(
                    KeyOrigin::Host,
                    KeyRole::DeployKey,
                    record.id.into_identifier(),
                    &record.key,
                )
            })
            .collect())
    }

    async fn delete_key(
        &self,
        target: &RepositoryTarget,
        identifier: &str,
    ) -> Result<(), ProviderError> {
        let path = format!("{}/{identifier}", target.host_path);
        let request = self
            .client
            .delete(endpoint(&self.base_url, &path))
            .bearer_auth(&self.token);
        send(KeyOrigin::Host, request).await?;
        Ok(())
    }
}

fn next_page(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|entry| {
        let (target, params) = entry.split_once(';')?;
        params
            .split(';')
            .any(|param| param.trim() == r#"rel="next""#)
            .then(|| {
                target
                    .trim()
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string()
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(LINK, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn next_page_is_read_from_link_header() {
        let headers = link(
            r#"<https://api.github.com/repositories/42/keys?per_page=100&page=2>; rel="next", <https://api.github.com/repositories/42/keys?per_page=100&page=3>; rel="last""#,
        );
        assert_eq!(
            next_page(&headers).as_deref(),
            Some("https://api.github.com/repositories/42/keys?per_page=100&page=2")
        );
    }

    #[test]
    fn last_page_has_no_next_link() {
        let headers = link(
            r#"<https://api.github.com/repositories/42/keys?per_page=100&page=1>; rel="prev", <https://api.github.com/repositories/42/keys?per_page=100&page=1>; rel="first""#,
        );
        assert_eq!(next_page(&headers), None);
        assert_eq!(next_page(&HeaderMap::new()), None);
    }
}
