use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::material;

/// key: deploy-key-origin
/// System of record a key was read from.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum KeyOrigin {
    Ci,
    Host,
}

impl KeyOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyOrigin::Ci => "ci",
            KeyOrigin::Host => "host",
        }
    }
}

impl fmt::Display for KeyOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum KeyRole {
    DeployKey,
    Other,
}

impl KeyRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyRole::DeployKey => "deploy-key",
            KeyRole::Other => "other",
        }
    }

    /// CircleCI reports `deploy-key` and `user-key`; anything but the former is left alone.
    pub fn from_checkout_type(value: &str) -> Self {
        match value.trim() {
            "deploy-key" => KeyRole::DeployKey,
            _ => KeyRole::Other,
        }
    }
}

/// key: deploy-key-model
/// Snapshot of one public-key credential as registered with a provider.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeployKey {
    pub identifier: String,
    pub public_key_material: String,
    pub origin: KeyOrigin,
    pub role: KeyRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl DeployKey {
    pub fn new(
        origin: KeyOrigin,
        role: KeyRole,
        identifier: impl Into<String>,
        public_key_material: impl AsRef<str>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            public_key_material: material::normalize(public_key_material.as_ref()),
            origin,
            role,
            created_at: None,
        }
    }

    pub fn with_created_at(mut self, created_at: Option<DateTime<Utc>>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn is_rotatable(&self) -> bool {
        self.role == KeyRole::DeployKey
    }

    pub fn matches(&self, other: &DeployKey) -> bool {
        self.public_key_material == other.public_key_material
    }

    pub fn sha256_fingerprint(&self) -> Option<String> {
        material::sha256_fingerprint(&self.public_key_material)
    }
}

/// key: repository-target
/// A repository plus the resource paths each provider addresses it by.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct RepositoryTarget {
    pub name: String,
    pub host_path: String,
    pub ci_path: String,
}

impl RepositoryTarget {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            host_path: format!("{name}/keys"),
            ci_path: format!("{name}/checkout-key"),
            name,
        }
    }
}
