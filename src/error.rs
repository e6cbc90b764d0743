use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

use crate::keys::KeyOrigin;

/// Pre-flight configuration failure. Raised before any repository is processed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// A single provider call that did not complete.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} request failed: {source}")]
    Transport {
        provider: KeyOrigin,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} request timed out")]
    Timeout { provider: KeyOrigin },
    #[error("{provider} responded with {status}: {body}")]
    Status {
        provider: KeyOrigin,
        status: StatusCode,
        body: String,
    },
    #[error("{provider} returned an undecodable payload: {reason}")]
    Decode {
        provider: KeyOrigin,
        reason: String,
    },
}

impl ProviderError {
    pub fn from_transport(provider: KeyOrigin, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            ProviderError::Timeout { provider }
        } else {
            ProviderError::Transport { provider, source }
        }
    }

    pub fn provider(&self) -> KeyOrigin {
        match self {
            ProviderError::Transport { provider, .. }
            | ProviderError::Timeout { provider }
            | ProviderError::Status { provider, .. }
            | ProviderError::Decode { provider, .. } => *provider,
        }
    }
}

/// Inventory read failure. Names every provider whose listing did not complete.
#[derive(Debug)]
pub struct InventoryError {
    pub host: Option<ProviderError>,
    pub ci: Option<ProviderError>,
}

impl InventoryError {
    pub fn failed_providers(&self) -> Vec<KeyOrigin> {
        self.failures().map(ProviderError::provider).collect()
    }

    fn failures(&self) -> impl Iterator<Item = &ProviderError> {
        self.host.iter().chain(self.ci.iter())
    }
}

impl fmt::Display for InventoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let details = self
            .failures()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "provider unreachable: {details}")
    }
}

impl std::error::Error for InventoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures()
            .next()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

/// Terminal error attached to a repository outcome.
#[derive(Debug, Error)]
pub enum RotationError {
    #[error(transparent)]
    ProviderUnreachable(#[from] InventoryError),
    #[error("new key was not created: {source}")]
    CreationFailed {
        #[source]
        source: ProviderError,
    },
    #[error("illegal rotation phase transition from {from} to {to}")]
    IllegalTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error("rotation task for {repository} aborted: {reason}")]
    TaskAborted { repository: String, reason: String },
}
