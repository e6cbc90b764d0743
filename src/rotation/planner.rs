use serde::Serialize;

use crate::keys::DeployKey;

/// key: rotation-policy
/// How the planner treats a repository that already has a working key pair.
#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RotationPolicy {
    /// Retire every CI deploy key and its host counterparts, then issue a new one.
    #[default]
    Always,
    /// Keep the newest key present on both sides; only clean up the rest.
    SkipUnchanged,
}

impl RotationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RotationPolicy::Always => "always",
            RotationPolicy::SkipUnchanged => "skip_unchanged",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "always" => Some(RotationPolicy::Always),
            "skip_unchanged" | "skip-unchanged" => Some(RotationPolicy::SkipUnchanged),
            _ => None,
        }
    }
}

/// Key pair left in place by [`RotationPolicy::SkipUnchanged`].
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct RetainedPair {
    pub ci: String,
    pub host: Vec<String>,
}

/// key: reconciliation-plan
/// Deletions and creation decided for one repository. Computed per run, never stored.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct ReconciliationPlan {
    pub keys_to_delete_on_host: Vec<String>,
    pub keys_to_delete_on_ci: Vec<String>,
    pub should_create_new_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retained: Option<RetainedPair>,
}

impl ReconciliationPlan {
    pub fn deletion_count(&self) -> usize {
        self.keys_to_delete_on_host.len() + self.keys_to_delete_on_ci.len()
    }

    fn delete_ci(&mut self, key: &DeployKey) {
        push_unique(&mut self.keys_to_delete_on_ci, &key.identifier);
    }

    fn delete_host(&mut self, key: &DeployKey) {
        push_unique(&mut self.keys_to_delete_on_host, &key.identifier);
    }
}

/// key: reconciliation-planner
/// Pure comparison of the two inventories. Matching across providers is by public key
/// material only.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReconciliationPlanner {
    policy: RotationPolicy,
}

impl ReconciliationPlanner {
    pub fn new(policy: RotationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RotationPolicy {
        self.policy
    }

    pub fn plan(&self, host_keys: &[DeployKey], ci_keys: &[DeployKey]) -> ReconciliationPlan {
        let ci_keys: Vec<&DeployKey> = ci_keys.iter().filter(|key| key.is_rotatable()).collect();

        let keeper = match self.policy {
            RotationPolicy::Always => None,
            RotationPolicy::SkipUnchanged => newest_healthy_pair(host_keys, &ci_keys),
        };

        let mut plan = ReconciliationPlan {
            should_create_new_key: keeper.is_none(),
            ..ReconciliationPlan::default()
        };

        for ci_key in &ci_keys {
            if keeper.is_some_and(|kept| std::ptr::eq(kept, *ci_key)) {
                continue;
            }
            plan.delete_ci(ci_key);
            for host_key in counterparts(host_keys, ci_key) {
                if keeper.is_some_and(|kept| kept.matches(host_key)) {
                    continue;
                }
                plan.delete_host(host_key);
            }
        }

        if let Some(kept) = keeper {
            plan.retained = Some(RetainedPair {
                ci: kept.identifier.clone(),
                host: counterparts(host_keys, kept)
                    .map(|key| key.identifier.clone())
                    .collect(),
            });
        }

        plan
    }
}

fn counterparts<'a>(
    host_keys: &'a [DeployKey],
    ci_key: &'a DeployKey,
) -> impl Iterator<Item = &'a DeployKey> + 'a {
    host_keys.iter().filter(move |host_key| host_key.matches(ci_key))
}

/// Newest CI deploy key with at least one host counterpart. Ties keep listing order.
fn newest_healthy_pair<'a>(
    host_keys: &[DeployKey],
    ci_keys: &[&'a DeployKey],
) -> Option<&'a DeployKey> {
    let mut best: Option<&'a DeployKey> = None;
    for candidate in ci_keys.iter().copied() {
        if counterparts(host_keys, candidate).next().is_none() {
            continue;
        }
        match best {
            Some(current) if candidate.created_at <= current.created_at => {}
            _ => best = Some(candidate),
        }
    }
    best
}

fn push_unique(target: &mut Vec<String>, identifier: &str) {
    if !target.iter().any(|existing| existing == identifier) {
        target.push(identifier.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeyOrigin, KeyRole};
    use chrono::{TimeZone, Utc};

    fn host(id: &str, material: &str) -> DeployKey {
        DeployKey::new(KeyOrigin::Host, KeyRole::DeployKey, id, material)
    }

    fn ci(fingerprint: &str, material: &str) -> DeployKey {
        DeployKey::new(KeyOrigin::Ci, KeyRole::DeployKey, fingerprint, material)
    }

    fn user_key(fingerprint: &str, material: &str) -> DeployKey {
        DeployKey::new(KeyOrigin::Ci, KeyRole::Other, fingerprint, material)
    }

    #[test]
    fn always_policy_retires_matching_pair_and_skips_user_keys() {
        let plan = ReconciliationPlanner::default().plan(
            &[host("h1", "AAA")],
            &[ci("f1", "AAA"), user_key("f2", "BBB")],
        );
        assert_eq!(plan.keys_to_delete_on_host, vec!["h1"]);
        assert_eq!(plan.keys_to_delete_on_ci, vec!["f1"]);
        assert!(plan.should_create_new_key);
        assert_eq!(plan.retained, None);
    }

    #[test]
    fn empty_ci_inventory_still_provisions() {
        let plan = ReconciliationPlanner::default().plan(&[host("h1", "AAA")], &[]);
        assert!(plan.keys_to_delete_on_host.is_empty());
        assert!(plan.keys_to_delete_on_ci.is_empty());
        assert!(plan.should_create_new_key);
    }

    #[test]
    fn always_policy_requests_a_key_for_any_inventory() {
        let planner = ReconciliationPlanner::new(RotationPolicy::Always);
        let inventories: Vec<(Vec<DeployKey>, Vec<DeployKey>)> = vec![
            (vec![], vec![]),
            (vec![host("h1", "K1")], vec![ci("f1", "K1")]),
            (vec![host("h1", "K1")], vec![ci("f2", "K2")]),
            (vec![], vec![user_key("u1", "U1")]),
            (
                vec![host("h1", "K1"), host("h2", "K2")],
                vec![ci("f1", "K1"), ci("f2", "K2")],
            ),
        ];
        for (host_keys, ci_keys) in inventories {
            assert!(planner.plan(&host_keys, &ci_keys).should_create_new_key);
        }
    }

    #[test]
    fn host_keys_without_ci_counterpart_are_left_alone() {
        let plan = ReconciliationPlanner::default().plan(
            &[host("h1", "K1"), host("h9", "OTHER")],
            &[ci("f1", "K1"), ci("f2", "K2")],
        );
        assert_eq!(plan.keys_to_delete_on_ci, vec!["f1", "f2"]);
        assert_eq!(plan.keys_to_delete_on_host, vec!["h1"]);
    }

    #[test]
    fn duplicate_host_material_marks_every_match() {
        let plan = ReconciliationPlanner::default().plan(
            &[host("h1", "K1"), host("h2", "K1")],
            &[ci("f1", "K1")],
        );
        assert_eq!(plan.keys_to_delete_on_host, vec!["h1", "h2"]);
    }

    #[test]
    fn matching_ignores_key_comments() {
        let material = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl";
        let plan = ReconciliationPlanner::default().plan(
            &[host("42", &format!("{material} deploy@github"))],
            &[ci("aa:bb", &format!("{material}\n"))],
        );
        assert_eq!(plan.keys_to_delete_on_host, vec!["42"]);
    }

    #[test]
    fn skip_unchanged_keeps_newest_pair_and_cleans_the_rest() {
        let older = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let plan = ReconciliationPlanner::new(RotationPolicy::SkipUnchanged).plan(
            &[host("h1", "K1"), host("h2", "K2")],
            &[
                ci("f1", "K1").with_created_at(Some(older)),
                ci("f2", "K2").with_created_at(Some(newer)),
                ci("f3", "K3"),
            ],
        );
        assert!(!plan.should_create_new_key);
        assert_eq!(plan.keys_to_delete_on_ci, vec!["f1", "f3"]);
        assert_eq!(plan.keys_to_delete_on_host, vec!["h1"]);
        assert_eq!(
            plan.retained,
            Some(RetainedPair {
                ci: "f2".into(),
                host: vec!["h2".into()],
            })
        );
    }

    #[test]
    fn skip_unchanged_rotates_when_no_pair_is_healthy() {
        let plan = ReconciliationPlanner::new(RotationPolicy::SkipUnchanged)
            .plan(&[host("h1", "K1")], &[ci("f2", "K2")]);
        assert!(plan.should_create_new_key);
        assert_eq!(plan.keys_to_delete_on_ci, vec!["f2"]);
        assert!(plan.keys_to_delete_on_host.is_empty());
        assert_eq!(plan.retained, None);
    }

    #[test]
    fn policy_names_parse() {
        assert_eq!(RotationPolicy::parse("Always"), Some(RotationPolicy::Always));
        assert_eq!(
            RotationPolicy::parse("skip_unchanged"),
            Some(RotationPolicy::SkipUnchanged)
        );
        assert_eq!(RotationPolicy::parse("never"), None);
    }
}
