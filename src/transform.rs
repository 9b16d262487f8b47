//! Authoritative registry record → [`PluginRecord`].
//!
//! Upstream records come in two layouts: the flat v0 layout (`packages`,
//! `registry_name`, `environment_variables`) and the wrapped layout
//! (`{"server": {...}, "_meta": {...}}` with camelCase package fields). Both
//! are read through lenient `Value` lookups so one odd record cannot fail the
//! whole page.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::models::{EnvVarSpec, PluginRecord};

/// Package ecosystem whose packages are installable.
pub const PRIMARY_REGISTRY: &str = "npm";

/// Launcher for packages of the primary ecosystem.
pub const RUNNER: &str = "npx -y";

pub const DEFAULT_TRANSPORT: &str = "stdio";

const DEFAULT_CATEGORY: &str = "uncategorized";

const META_KEYS: [&str; 2] = [
    "io.modelcontextprotocol.registry/official",
    "io.modelcontextprotocol.registry",
];

/// Transform one upstream record. Returns `None` when no identity can be
/// resolved.
pub fn transform(raw: &Value) -> Option<PluginRecord> {
    let server = server_body(raw)?;

    let id = registry_id(raw)
        .or_else(|| first_str(server, &["id", "uuid", "name"]))
        .or_else(|| first_str(raw, &["id", "uuid", "name"]))?;

    let name = first_str(server, &["title", "name"]).unwrap_or_else(|| id.clone());
    let description = first_str(server, &["description"]).unwrap_or_default();
    let category = first_str(server, &["category"])
        .or_else(|| {
            server
                .get("categories")
                .and_then(Value::as_array)
                .and_then(|c| c.iter().find_map(Value::as_str))
                .map(String::from)
        })
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

    let packages = server
        .get("packages")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let version = first_str(server, &["version"])
        .or_else(|| {
            server
                .get("version_detail")
                .and_then(|v| first_str(v, &["version"]))
        })
        .unwrap_or_else(|| "latest".to_string());

    let command = packages
        .iter()
        .filter(|p| registry_type(p).as_deref() == Some(PRIMARY_REGISTRY))
        .find_map(build_command);

    Some(PluginRecord {
        id,
        name,
        category,
        description,
        version,
        command,
        env: collect_env(packages),
        ..Default::default()
    })
}

/// Whether an upstream record is active. Records without a status are active.
pub fn is_active(raw: &Value) -> bool {
    let status = META_KEYS
        .iter()
        .find_map(|key| raw.get("_meta").and_then(|m| m.get(*key)))
        .and_then(|meta| meta.get("status"))
        .or_else(|| server_body(raw).and_then(|s| s.get("status")))
        .or_else(|| raw.get("status"));

    match status {
        None | Some(Value::Null) => true,
        Some(s) => s.as_str() == Some("active"),
    }
}

fn server_body(raw: &Value) -> Option<&Value> {
    match raw.get("server") {
        Some(inner) if inner.is_object() => Some(inner),
        _ if raw.is_object() => Some(raw),
        _ => None,
    }
}

/// Registry-assigned id embedded in `_meta`, in either layout.
fn registry_id(raw: &Value) -> Option<String> {
    let metas = [
        raw.get("_meta"),
        raw.get("server").and_then(|s| s.get("_meta")),
    ];
    metas
        .into_iter()
        .flatten()
        .flat_map(|meta| META_KEYS.iter().filter_map(move |key| meta.get(*key)))
        .find_map(|official| first_str(official, &["serverId", "server_id", "id"]))
}

fn registry_type(package: &Value) -> Option<String> {
    first_str(package, &["registryType", "registry_type", "registry_name"])
        .map(|t| t.to_ascii_lowercase())
}

fn build_command(package: &Value) -> Option<String> {
    let identifier = first_str(package, &["identifier", "name"])?;
    let version = first_str(package, &["version"]).unwrap_or_else(|| "latest".to_string());
    let mut command = format!("{RUNNER} {identifier}@{version}");

    let transport = package
        .get("transport")
        .and_then(|t| match t {
            Value::String(s) => Some(s.clone()),
            other => first_str(other, &["type"]),
        })
        .or_else(|| first_str(package, &["transport_type", "transportType"]));
    if let Some(transport) = transport.filter(|t| t != DEFAULT_TRANSPORT) {
        command.push_str(" --transport ");
        command.push_str(&transport);
    }

    Some(command)
}

/// Union of env vars over all packages. Later definitions win on name clashes.
fn collect_env(packages: &[Value]) -> BTreeMap<String, EnvVarSpec> {
    let mut env = BTreeMap::new();
    for package in packages {
        let vars = package
            .get("environmentVariables")
            .or_else(|| package.get("environment_variables"))
            .and_then(Value::as_array);
        for var in vars.into_iter().flatten() {
            let Some(name) = first_str(var, &["name"]) else {
                continue;
            };
            let spec = EnvVarSpec {
                required: first_bool(var, &["isRequired", "is_required", "required"]),
                description: first_str(var, &["description"]).unwrap_or_default(),
                placeholder: first_str(var, &["placeholder", "default"]).unwrap_or_default(),
                help: first_str(var, &["help", "format"]).unwrap_or_default(),
                secret: first_bool(var, &["isSecret", "is_secret", "secret"]),
            };
            env.insert(name, spec);
        }
    }
    env
}

fn first_str(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| value.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(String::from)
}

fn first_bool(value: &Value, keys: &[&str]) -> bool {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(Value::as_bool))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wrapped_record_prefers_registry_id() {
        let raw = json!({
            "server": {
                "name": "io.github.acme/fs",
                "title": "Filesystem",
                "description": "Files",
                "version": "1.2.0",
                "packages": [{
                    "registryType": "npm",
                    "identifier": "@acme/fs",
                    "version": "1.2.0",
                    "transport": {"type": "stdio"},
                    "environmentVariables": [
                        {"name": "ROOT", "isRequired": true, "description": "Root dir"},
                        {"name": "TOKEN", "isSecret": true, "default": "xxx"}
                    ]
                }]
            },
            "_meta": {
                "io.modelcontextprotocol.registry/official": {
                    "serverId": "5f0c-uuid",
                    "status": "active"
                }
            }
        });

        let record = transform(&raw).unwrap();
        assert_eq!(record.id, "5f0c-uuid");
        assert_eq!(record.name, "Filesystem");
        assert_eq!(record.version, "1.2.0");
        assert_eq!(record.category, "uncategorized");
        assert_eq!(record.command.as_deref(), Some("npx -y @acme/fs@1.2.0"));
        assert!(record.env["ROOT"].required);
        assert_eq!(record.env["ROOT"].description, "Root dir");
        assert!(record.env["TOKEN"].secret);
        assert_eq!(record.env["TOKEN"].placeholder, "xxx");
        assert!(!record.installed);
        assert!(record.installed_agents.is_empty());
    }

    #[test]
    fn flat_v0_record_uses_snake_case_fields() {
        let raw = json!({
            "id": "abc-123",
            "name": "io.github.acme/search",
            "version_detail": {"version": "0.3.1"},
            "packages": [
                {"registry_name": "docker", "name": "acme/search"},
                {
                    "registry_name": "npm",
                    "name": "@acme/search",
                    "environment_variables": [{"name": "API_KEY", "is_required": true}]
                }
            ]
        });

        let record = transform(&raw).unwrap();
        assert_eq!(record.id, "abc-123");
        assert_eq!(record.version, "0.3.1");
        assert_eq!(record.command.as_deref(), Some("npx -y @acme/search@latest"));
        assert!(record.env["API_KEY"].required);
    }

    #[test]
    fn non_default_transport_appends_flag() {
        let raw = json!({
            "name": "sse-server",
            "packages": [{
                "registryType": "npm",
                "identifier": "sse-pkg",
                "version": "2.0.0",
                "transport": {"type": "sse"}
            }]
        });
        let record = transform(&raw).unwrap();
        assert_eq!(
            record.command.as_deref(),
            Some("npx -y sse-pkg@2.0.0 --transport sse")
        );
    }

    #[test]
    fn skips_npm_package_without_identifier() {
        let raw = json!({
            "name": "two-npm",
            "packages": [
                {"registryType": "npm", "version": "1.0.0"},
                {"registryType": "npm", "identifier": "@x/real", "version": "3.1.0"}
            ]
        });
        let record = transform(&raw).unwrap();
        assert_eq!(record.command.as_deref(), Some("npx -y @x/real@3.1.0"));
    }

    #[test]
    fn no_primary_package_means_no_command() {
        let raw = json!({
            "name": "py-only",
            "packages": [{"registryType": "pypi", "identifier": "py-only"}]
        });
        let record = transform(&raw).unwrap();
        assert!(record.command.is_none());
        assert!(!record.is_installable());
    }

    #[test]
    fn env_name_clash_takes_last_definition() {
        let raw = json!({
            "name": "dup",
            "packages": [
                {"registryType": "pypi", "identifier": "a",
                 "environmentVariables": [{"name": "K", "description": "first"}]},
                {"registryType": "npm", "identifier": "b",
                 "environmentVariables": [{"name": "K", "description": "second", "isRequired": true}]}
            ]
        });
        let record = transform(&raw).unwrap();
        assert_eq!(record.env.len(), 1);
        assert_eq!(record.env["K"].description, "second");
        assert!(record.env["K"].required);
    }

    #[test]
    fn unidentifiable_records_are_dropped() {
        assert!(transform(&json!({"description": "no id"})).is_none());
        assert!(transform(&json!({"name": "   "})).is_none());
        assert!(transform(&json!("string")).is_none());
        assert!(transform(&json!(null)).is_none());
    }

    #[test]
    fn status_filter() {
        assert!(is_active(&json!({"name": "x"})));
        assert!(is_active(&json!({"name": "x", "status": "active"})));
        assert!(!is_active(&json!({"name": "x", "status": "deprecated"})));
        assert!(!is_active(&json!({
            "server": {"name": "x"},
            "_meta": {"io.modelcontextprotocol.registry/official": {"status": "deleted"}}
        })));
    }
}
