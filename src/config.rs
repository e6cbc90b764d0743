use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;
use crate::keys::RepositoryTarget;
use crate::rotation::RotationPolicy;

pub const DEFAULT_CIRCLECI_API_BASE: &str = "https://circleci.com/api/v2";
pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_VCS_SLUG: &str = "gh";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;
pub const MAX_HTTP_TIMEOUT_SECS: u64 = 3600;
pub const MAX_CONCURRENCY: usize = 256;

/// key: rotation-config
/// Settings for one rotation run. Built once at startup and passed down by reference.
#[derive(Clone)]
pub struct RotationConfig {
    pub organization: String,
    pub repositories: Vec<String>,
    pub circleci_token: String,
    pub github_token: String,
    pub circleci_api_base: String,
    pub circleci_vcs_slug: String,
    pub github_api_base: String,
    pub request_timeout: Duration,
    pub policy: RotationPolicy,
    pub max_concurrency: usize,
    pub dry_run: bool,
}

impl fmt::Debug for RotationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotationConfig")
            .field("organization", &self.organization)
            .field("repositories", &self.repositories)
            .field("circleci_token", &"<redacted>")
            .field("github_token", &"<redacted>")
            .field("circleci_api_base", &self.circleci_api_base)
            .field("circleci_vcs_slug", &self.circleci_vcs_slug)
            .field("github_api_base", &self.github_api_base)
            .field("request_timeout", &self.request_timeout)
            .field("policy", &self.policy)
            .field("max_concurrency", &self.max_concurrency)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl RotationConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    ///
    /// Every required variable is checked before any optional one is parsed, and all
    /// missing names are reported together.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let organization = read("CIRCLECI_ORG");
        let repositories = read("CIRCLECI_REPOS")
            .map(|value| parse_repositories(&value))
            .filter(|repos| !repos.is_empty());
        let circleci_token = read("CIRCLECI_TOKEN");
        let github_token = read("GITHUB_TOKEN");

        let mut missing = Vec::new();
        if organization.is_none() {
            missing.push("CIRCLECI_ORG");
        }
        if repositories.is_none() {
            missing.push("CIRCLECI_REPOS");
        }
        if circleci_token.is_none() {
            missing.push("CIRCLECI_TOKEN");
        }
        if github_token.is_none() {
            missing.push("GITHUB_TOKEN");
        }

        let (
            Some(organization),
            Some(repositories),
            Some(circleci_token),
            Some(github_token),
        ) = (organization, repositories, circleci_token, github_token)
        else {
            return Err(ConfigError::Missing(missing));
        };

        let circleci_api_base = parse_base_url(
            "CIRCLECI_API_BASE",
            read("CIRCLECI_API_BASE"),
            DEFAULT_CIRCLECI_API_BASE,
        )?;
        let github_api_base = parse_base_url(
            "GITHUB_API_BASE",
            read("GITHUB_API_BASE"),
            DEFAULT_GITHUB_API_BASE,
        )?;
        let circleci_vcs_slug = read("CIRCLECI_VCS").unwrap_or_else(|| DEFAULT_VCS_SLUG.into());

        let timeout_secs = parse_bounded(
            "ROTATION_HTTP_TIMEOUT_SECS",
            read("ROTATION_HTTP_TIMEOUT_SECS"),
            DEFAULT_HTTP_TIMEOUT_SECS,
            MAX_HTTP_TIMEOUT_SECS,
        )?;
        let max_concurrency = parse_bounded(
            "ROTATION_MAX_CONCURRENCY",
            read("ROTATION_MAX_CONCURRENCY"),
            DEFAULT_MAX_CONCURRENCY as u64,
            MAX_CONCURRENCY as u64,
        )? as usize;

        let policy = match read("ROTATION_POLICY") {
            Some(raw) => RotationPolicy::parse(&raw).ok_or_else(|| ConfigError::Invalid {
                key: "ROTATION_POLICY",
                reason: format!(
                    "unsupported policy '{raw}'; expected 'always' or 'skip_unchanged'"
                ),
            })?,
            None => RotationPolicy::default(),
        };

        let dry_run = parse_flag("ROTATION_DRY_RUN", read("ROTATION_DRY_RUN"))?;

        Ok(Self {
            organization,
            repositories,
            circleci_token,
            github_token,
            circleci_api_base,
            circleci_vcs_slug,
            github_api_base,
            request_timeout: Duration::from_secs(timeout_secs),
            policy,
            max_concurrency,
            dry_run,
        })
    }

    pub fn targets(&self) -> Vec<RepositoryTarget> {
        self.repositories
            .iter()
            .map(RepositoryTarget::new)
            .collect()
    }

    /// Base URL of the CircleCI project API for the configured organization.
    pub fn circleci_project_url(&self) -> String {
        format!(
            "{}/project/{}/{}",
            self.circleci_api_base, self.circleci_vcs_slug, self.organization
        )
    }

    /// Base URL of the GitHub repository API for the configured organization.
    pub fn github_repos_url(&self) -> String {
        format!("{}/repos/{}", self.github_api_base, self.organization)
    }
}

fn parse_repositories(raw: &str) -> Vec<String> {
    let mut repositories: Vec<String> = Vec::new();
    for item in raw.split(',') {
        let trimmed = item.trim();
        if trimmed.is_empty() || repositories.iter().any(|existing| existing == trimmed) {
            continue;
        }
        repositories.push(trimmed.to_string());
    }
    repositories
}

fn parse_base_url(
    key: &'static str,
    value: Option<String>,
    default_value: &str,
) -> Result<String, ConfigError> {
    let raw = value.unwrap_or_else(|| default_value.to_string());
    let parsed = Url::parse(&raw).map_err(|err| ConfigError::Invalid {
        key,
        reason: err.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid {
            key,
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn parse_bounded(
    key: &'static str,
    value: Option<String>,
    default_value: u64,
    max_value: u64,
) -> Result<u64, ConfigError> {
    let Some(raw) = value else {
        return Ok(default_value);
    };
    match raw.parse::<u64>() {
        Ok(parsed) if (1..=max_value).contains(&parsed) => Ok(parsed),
        _ => Err(ConfigError::Invalid {
            key,
            reason: format!("expected an integer between 1 and {max_value}, got '{raw}'"),
        }),
    }
}

/// Unset means false. Unrecognized spellings are rejected rather than read as false.
fn parse_flag(key: &'static str, value: Option<String>) -> Result<bool, ConfigError> {
    let Some(raw) = value else {
        return Ok(false);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            reason: format!("expected one of 1/true/yes or 0/false/no, got '{raw}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 4] = [
        ("CIRCLECI_ORG", "acme"),
        ("CIRCLECI_REPOS", "api, web,,api , worker"),
        ("CIRCLECI_TOKEN", "cci-token"),
        ("GITHUB_TOKEN", "gh-token"),
    ];

    #[test]
    fn required_settings_with_defaults() {
        let config = RotationConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.organization, "acme");
        assert_eq!(config.repositories, vec!["api", "web", "worker"]);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.policy, RotationPolicy::Always);
        assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert!(!config.dry_run);
        assert_eq!(
            config.circleci_project_url(),
            "https://circleci.com/api/v2/project/gh/acme"
        );
        assert_eq!(config.github_repos_url(), "https://api.github.com/repos/acme");
    }

    #[test]
    fn all_missing_settings_are_reported() {
        let err = RotationConfig::from_lookup(lookup(&[("CIRCLECI_ORG", "acme")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Missing(vec!["CIRCLECI_REPOS", "CIRCLECI_TOKEN", "GITHUB_TOKEN"])
        );
    }

    #[test]
    fn blank_repository_list_counts_as_missing() {
        let mut vars = REQUIRED.to_vec();
        vars[1] = ("CIRCLECI_REPOS", " , ,");
        let err = RotationConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert_eq!(err, ConfigError::Missing(vec!["CIRCLECI_REPOS"]));
    }

    #[test]
    fn optional_overrides_are_parsed() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("CIRCLECI_API_BASE", "http://127.0.0.1:9000/api/v2/"),
            ("CIRCLECI_VCS", "bb"),
            ("ROTATION_HTTP_TIMEOUT_SECS", "5"),
            ("ROTATION_POLICY", "skip-unchanged"),
            ("ROTATION_MAX_CONCURRENCY", "2"),
            ("ROTATION_DRY_RUN", "Yes"),
        ]);
        let config = RotationConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(
            config.circleci_project_url(),
            "http://127.0.0.1:9000/api/v2/project/bb/acme"
        );
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.policy, RotationPolicy::SkipUnchanged);
        assert_eq!(config.max_concurrency, 2);
        assert!(config.dry_run);
    }

    #[test]
    fn invalid_optional_values_are_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("ROTATION_HTTP_TIMEOUT_SECS", "0"));
        assert!(matches!(
            RotationConfig::from_lookup(lookup(&vars)),
            Err(ConfigError::Invalid {
                key: "ROTATION_HTTP_TIMEOUT_SECS",
                ..
            })
        ));

        let mut vars = REQUIRED.to_vec();
        vars.push(("ROTATION_POLICY", "sometimes"));
        assert!(matches!(
            RotationConfig::from_lookup(lookup(&vars)),
            Err(ConfigError::Invalid {
                key: "ROTATION_POLICY",
                ..
            })
        ));

        let mut vars = REQUIRED.to_vec();
        vars.push(("GITHUB_API_BASE", "ftp://example.com"));
        assert!(matches!(
            RotationConfig::from_lookup(lookup(&vars)),
            Err(ConfigError::Invalid {
                key: "GITHUB_API_BASE",
                ..
            })
        ));
    }

    #[test]
    fn out_of_range_limits_are_rejected() {
        for (key, raw) in [
            ("ROTATION_MAX_CONCURRENCY", "18446744073709551615"),
            ("ROTATION_MAX_CONCURRENCY", "257"),
            ("ROTATION_HTTP_TIMEOUT_SECS", "18446744073709551615"),
        ] {
            let mut vars = REQUIRED.to_vec();
            vars.push((key, raw));
            match RotationConfig::from_lookup(lookup(&vars)) {
                Err(ConfigError::Invalid { key: rejected, .. }) => assert_eq!(rejected, key),
                other => panic!("{key}={raw} should be rejected, got {other:?}"),
            }
        }

        let mut vars = REQUIRED.to_vec();
        vars.push(("ROTATION_MAX_CONCURRENCY", "256"));
        let config = RotationConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.max_concurrency, MAX_CONCURRENCY);
    }

    #[test]
    fn dry_run_flag_must_be_recognized() {
        for (raw, expected) in [("TRUE", true), ("1", true), ("no", false), ("0", false)] {
            let mut vars = REQUIRED.to_vec();
            vars.push(("ROTATION_DRY_RUN", raw));
            let config = RotationConfig::from_lookup(lookup(&vars)).unwrap();
            assert_eq!(config.dry_run, expected, "ROTATION_DRY_RUN={raw}");
        }

        for raw in ["ture", "on", "enabled"] {
            let mut vars = REQUIRED.to_vec();
            vars.push(("ROTATION_DRY_RUN", raw));
            assert!(matches!(
                RotationConfig::from_lookup(lookup(&vars)),
                Err(ConfigError::Invalid {
                    key: "ROTATION_DRY_RUN",
                    ..
                })
            ));
        }
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let config = RotationConfig::from_lookup(lookup(&REQUIRED)).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("cci-token"));
        assert!(!rendered.contains("gh-token"));
    }
}
