//! Installation ledger: which agents have which plugins installed.
//!
//! The ledger lives inside the registry cache; these functions only mutate a
//! [`Catalog`] in memory. Persisting is done by
//! [`RegistryStore`](crate::registry::RegistryStore).

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::{Catalog, PluginRecord};

/// Add `agent_id` to the plugin's installed agents. Returns whether anything
/// changed; unknown plugins are a no-op.
pub fn mark_installed(
    catalog: &mut Catalog,
    plugin_id: &str,
    agent_id: &str,
    now: DateTime<Utc>,
) -> bool {
    let Some(record) = catalog.get_mut(plugin_id) else {
        return false;
    };
    let added = record.installed_agents.insert(agent_id.to_string());
    let first = !record.installed || record.installation_date.is_none();
    if first {
        record.installed = true;
        record.installation_date = Some(now);
    }
    added || first
}

/// Remove `agent_id` from the plugin's installed agents. Returns whether
/// anything changed; unknown plugins are a no-op.
pub fn mark_uninstalled(catalog: &mut Catalog, plugin_id: &str, agent_id: &str) -> bool {
    let Some(record) = catalog.get_mut(plugin_id) else {
        return false;
    };
    let removed = record.installed_agents.remove(agent_id);
    let was_installed = record.installed;
    reconcile(record);
    removed || was_installed != record.installed
}

/// Whether the ledger lists `agent_id` for `plugin_id`.
pub fn is_tracked(catalog: &Catalog, plugin_id: &str, agent_id: &str) -> bool {
    catalog
        .get(plugin_id)
        .is_some_and(|r| r.installed_agents.contains(agent_id))
}

/// Re-derive `installed` and `installation_date` from `installed_agents`.
pub fn reconcile(record: &mut PluginRecord) {
    if record.installed_agents.is_empty() {
        record.installed = false;
        record.installation_date = None;
    } else {
        record.installed = true;
        if record.installation_date.is_none() {
            record.installation_date = Some(Utc::now());
        }
    }
}

pub fn reconcile_all(catalog: &mut Catalog) {
    catalog.mcps.iter_mut().for_each(reconcile);
}

/// Carry installation state from `previous` into `next`, matched by id.
///
/// Records in `next` start from a clean slate so upstream data never asserts
/// local installation state. Returns the ids of installed plugins that `next`
/// no longer contains.
pub fn carry_forward(previous: &Catalog, next: &mut Catalog) -> Vec<String> {
    let prior: HashMap<&str, &PluginRecord> = previous
        .mcps
        .iter()
        .filter(|r| r.installed || !r.installed_agents.is_empty())
        .map(|r| (r.id.as_str(), r))
        .collect();

    for record in next.mcps.iter_mut() {
        match prior.get(record.id.as_str()) {
            Some(old) => {
                record.installed = old.installed;
                record.installed_agents = old.installed_agents.clone();
                record.installation_date = old.installation_date;
                reconcile(record);
            }
            None => {
                record.installed = false;
                record.installed_agents.clear();
                record.installation_date = None;
            }
        }
    }

    let mut dropped: Vec<String> = prior
        .keys()
        .filter(|id| next.get(id).is_none())
        .map(|id| id.to_string())
        .collect();
    dropped.sort();
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn catalog(ids: &[&str]) -> Catalog {
        Catalog::new(
            ids.iter()
                .map(|id| PluginRecord {
                    id: id.to_string(),
                    command: Some(format!("npx {id}")),
                    ..Default::default()
                })
                .collect(),
        )
    }

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn first_install_stamps_date_and_later_ones_keep_it() {
        let mut c = catalog(&["p"]);
        assert!(mark_installed(&mut c, "p", "cursor", t(100)));
        assert!(mark_installed(&mut c, "p", "zed", t(200)));

        let p = c.get("p").unwrap();
        assert!(p.installed);
        assert_eq!(p.installation_date, Some(t(100)));
        assert_eq!(p.installed_agents.len(), 2);
    }

    #[test]
    fn install_is_idempotent() {
        let mut c = catalog(&["p"]);
        assert!(mark_installed(&mut c, "p", "cursor", t(100)));
        let before = c.clone();
        assert!(!mark_installed(&mut c, "p", "cursor", t(999)));
        assert_eq!(c, before);
    }

    #[test]
    fn last_uninstall_clears_flag_and_date() {
        let mut c = catalog(&["p"]);
        mark_installed(&mut c, "p", "a", t(1));
        mark_installed(&mut c, "p", "b", t(2));

        assert!(mark_uninstalled(&mut c, "p", "a"));
        assert!(c.get("p").unwrap().installed);

        assert!(mark_uninstalled(&mut c, "p", "b"));
        let p = c.get("p").unwrap();
        assert!(!p.installed);
        assert!(p.installation_date.is_none());
        assert!(p.installed_agents.is_empty());

        assert!(!mark_uninstalled(&mut c, "p", "b"));
    }

    #[test]
    fn unknown_plugin_is_a_no_op() {
        let mut c = catalog(&["p"]);
        let before = c.clone();
        assert!(!mark_installed(&mut c, "missing", "a", t(1)));
        assert!(!mark_uninstalled(&mut c, "missing", "a"));
        assert_eq!(c, before);
    }

    #[test]
    fn carry_forward_preserves_state_and_reports_dropped() {
        let mut previous = catalog(&["keep", "gone", "plain"]);
        mark_installed(&mut previous, "keep", "cursor", t(5));
        mark_installed(&mut previous, "gone", "zed", t(6));

        let mut next = catalog(&["keep", "plain", "new"]);
        next.get_mut("new").unwrap().installed = true;
        next.get_mut("new").unwrap().installed_agents.insert("bogus".into());

        let dropped = carry_forward(&previous, &mut next);
        assert_eq!(dropped, vec!["gone".to_string()]);

        let keep = next.get("keep").unwrap();
        assert!(keep.installed);
        assert!(keep.installed_agents.contains("cursor"));
        assert_eq!(keep.installation_date, Some(t(5)));

        let new = next.get("new").unwrap();
        assert!(!new.installed);
        assert!(new.installed_agents.is_empty());
        assert!(!next.get("plain").unwrap().installed);
    }

    #[test]
    fn reconcile_fixes_inconsistent_records() {
        let mut record = PluginRecord {
            id: "x".into(),
            installed: true,
            installation_date: Some(t(1)),
            ..Default::default()
        };
        reconcile(&mut record);
        assert!(!record.installed);
        assert!(record.installation_date.is_none());
    }
}
