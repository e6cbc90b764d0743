use std::sync::Arc;

use tracing::debug;

use crate::error::InventoryError;
use crate::keys::{DeployKey, RepositoryTarget};
use crate::providers::{KeyIssuer, KeyProvider};

/// Keys currently registered for one repository, as seen by both providers.
#[derive(Clone, Debug, Default)]
pub struct InventorySnapshot {
    pub host_keys: Vec<DeployKey>,
    pub ci_keys: Vec<DeployKey>,
    /// CI entries left out because they are not deploy keys (user keys and the like).
    pub ignored_ci_keys: usize,
}

/// key: key-inventory
/// Read-only view over both providers for a single repository.
#[derive(Clone)]
pub struct KeyInventory {
    host: Arc<dyn KeyProvider>,
    ci: Arc<dyn KeyIssuer>,
}

impl KeyInventory {
    pub fn new(host: Arc<dyn KeyProvider>, ci: Arc<dyn KeyIssuer>) -> Self {
        Self { host, ci }
    }

    pub async fn fetch(
        &self,
        target: &RepositoryTarget,
    ) -> Result<InventorySnapshot, InventoryError> {
        let (host, ci) = tokio::join!(self.host.list_keys(target), self.ci.list_keys(target));

        let (host_keys, ci_listing) = match (host, ci) {
            (Ok(host_keys), Ok(ci_listing)) => (host_keys, ci_listing),
            (host, ci) => {
                return Err(InventoryError {
                    host: host.err(),
                    ci: ci.err(),
                })
            }
        };

        let listed = ci_listing.len();
        let ci_keys: Vec<DeployKey> = ci_listing
            .into_iter()
            .filter(DeployKey::is_rotatable)
            .collect();
        let snapshot = InventorySnapshot {
            ignored_ci_keys: listed - ci_keys.len(),
            host_keys,
            ci_keys,
        };

        debug!(
            repository = %target.name,
            host_keys = snapshot.host_keys.len(),
            ci_keys = snapshot.ci_keys.len(),
            ignored_ci_keys = snapshot.ignored_ci_keys,
            "fetched key inventory"
        );
        Ok(snapshot)
    }
}
