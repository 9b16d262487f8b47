//! Per-agent config schema adapters.
//!
//! Every agent config is handled through a logical view with a top-level
//! `mcpServers` map of `{command, args, env}` entries. Agents whose files use a
//! different layout get a [`PlatformSchema`] that translates between their
//! native shape and the logical view. Keys outside the server map are kept as-is.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

/// Key of the server map in the logical view.
pub const SERVERS_KEY: &str = "mcpServers";

/// Config layout family an agent belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    /// `mcpServers` at the top level (Claude, Cursor, Windsurf, Gemini, custom agents).
    Standard,
    /// VS Code `mcp.json`: `servers` map, stdio entries tagged with `"type": "stdio"`.
    VsCode,
    /// Zed `settings.json`: `context_servers` map.
    Zed,
    /// opencode `opencode.json`: `mcp` map of `{type: "local", command: [...], environment}`.
    OpenCode,
}

impl AgentKind {
    /// Kind for an agent id. Unknown ids use the standard layout.
    pub fn for_agent(agent_id: &str) -> Self {
        match agent_id {
            "vscode" | "vscode-insiders" => AgentKind::VsCode,
            "zed" => AgentKind::Zed,
            "opencode" => AgentKind::OpenCode,
            _ => AgentKind::Standard,
        }
    }

    pub fn schema(self) -> &'static dyn PlatformSchema {
        match self {
            AgentKind::Standard => &STANDARD,
            AgentKind::VsCode => &VSCODE,
            AgentKind::Zed => &ZED,
            AgentKind::OpenCode => &OPENCODE,
        }
    }
}

/// Shortcut for `AgentKind::for_agent(agent_id).schema()`.
pub fn schema_for(agent_id: &str) -> &'static dyn PlatformSchema {
    AgentKind::for_agent(agent_id).schema()
}

/// Translation between an agent's on-disk config and the logical view.
pub trait PlatformSchema: Send + Sync {
    /// Native config → logical view. Always returns an object with an
    /// `mcpServers` object.
    fn ensure_schema(&self, raw: Value) -> Value;

    /// Logical view → native config, ready to be written.
    fn to_native(&self, normalized: Value) -> Value;

    /// Insert or overwrite `mcpServers[plugin_id]`.
    ///
    /// `command_line` is split on whitespace into `command` and `args`. An empty
    /// command line yields an empty `command` and no args.
    fn set_entry(
        &self,
        normalized: Value,
        plugin_id: &str,
        command_line: &str,
        env: &BTreeMap<String, String>,
    ) -> Value {
        let mut root = into_object(normalized);
        let mut servers = match root.remove(SERVERS_KEY) {
            Some(Value::Object(map)) => map,
            Some(_) => {
                tracing::warn!("Replacing non-object {SERVERS_KEY} with an empty map");
                Map::new()
            }
            None => Map::new(),
        };
        let (command, args) = split_command_line(command_line);
        servers.insert(
            plugin_id.to_string(),
            json!({
                "command": command,
                "args": args,
                "env": env,
            }),
        );
        root.insert(SERVERS_KEY.to_string(), Value::Object(servers));
        Value::Object(root)
    }

    /// Delete `mcpServers[plugin_id]`. Returns `false` and the unchanged config
    /// when there was no such entry.
    fn remove_entry(&self, normalized: Value, plugin_id: &str) -> (Value, bool) {
        let mut config = normalized;
        let removed = config
            .get_mut(SERVERS_KEY)
            .and_then(Value::as_object_mut)
            .and_then(|servers| servers.remove(plugin_id))
            .is_some();
        (config, removed)
    }
}

/// Whether the logical view has an entry for `plugin_id`.
pub fn has_entry(normalized: &Value, plugin_id: &str) -> bool {
    normalized
        .get(SERVERS_KEY)
        .and_then(Value::as_object)
        .is_some_and(|servers| servers.contains_key(plugin_id))
}

pub fn split_command_line(command_line: &str) -> (String, Vec<String>) {
    let mut tokens = command_line.split_whitespace().map(String::from);
    let command = tokens.next().unwrap_or_default();
    (command, tokens.collect())
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn take_map(root: &mut Map<String, Value>, key: &str) -> Map<String, Value> {
    match root.remove(key) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Layouts that differ from the logical view only in the server map key and,
/// optionally, a `"type": "stdio"` tag on command entries.
struct KeyedSchema {
    native_key: &'static str,
    tag_stdio: bool,
}

static STANDARD: KeyedSchema = KeyedSchema {
    native_key: SERVERS_KEY,
    tag_stdio: false,
};

static VSCODE: KeyedSchema = KeyedSchema {
    native_key: "servers",
    tag_stdio: true,
};

static ZED: KeyedSchema = KeyedSchema {
    native_key: "context_servers",
    tag_stdio: false,
};

static OPENCODE: OpenCodeSchema = OpenCodeSchema;

impl PlatformSchema for KeyedSchema {
    fn ensure_schema(&self, raw: Value) -> Value {
        let mut root = into_object(raw);
        let mut servers = take_map(&mut root, SERVERS_KEY);
        if self.native_key != SERVERS_KEY {
            servers.extend(take_map(&mut root, self.native_key));
        }
        if self.tag_stdio {
            for entry in servers.values_mut().filter_map(Value::as_object_mut) {
                if entry.get("type").and_then(Value::as_str) == Some("stdio") {
                    entry.remove("type");
                }
            }
        }
        root.insert(SERVERS_KEY.to_string(), Value::Object(servers));
        Value::Object(root)
    }

    fn to_native(&self, normalized: Value) -> Value {
        let mut root = into_object(normalized);
        let mut servers = take_map(&mut root, SERVERS_KEY);
        if self.tag_stdio {
            for entry in servers.values_mut().filter_map(Value::as_object_mut) {
                if entry.contains_key("command") && !entry.contains_key("type") {
                    entry.insert("type".to_string(), json!("stdio"));
                }
            }
        }
        root.insert(self.native_key.to_string(), Value::Object(servers));
        Value::Object(root)
    }
}

/// opencode keeps servers under `mcp`, with the command and its args in a
/// single array and env vars under `environment`.
struct OpenCodeSchema;

impl OpenCodeSchema {
    const NATIVE_KEY: &'static str = "mcp";

    fn from_local(mut entry: Map<String, Value>) -> Map<String, Value> {
        if !matches!(entry.get("command"), Some(Value::Array(_))) {
            return entry;
        }
        let Some(Value::Array(parts)) = entry.remove("command") else {
            return entry;
        };
        let mut parts = parts
            .into_iter()
            .filter_map(|p| p.as_str().map(String::from));
        let command = parts.next().unwrap_or_default();
        let args: Vec<String> = parts.collect();
        let env = entry
            .remove("environment")
            .filter(Value::is_object)
            .unwrap_or_else(|| json!({}));
        entry.remove("type");
        entry.insert("command".to_string(), json!(command));
        entry.insert("args".to_string(), json!(args));
        entry.insert("env".to_string(), env);
        entry
    }

    fn to_local(mut entry: Map<String, Value>) -> Map<String, Value> {
        if !matches!(entry.get("command"), Some(Value::String(_))) {
            return entry;
        }
        let Some(Value::String(command)) = entry.remove("command") else {
            return entry;
        };
        let mut argv = vec![Value::String(command)];
        if let Some(Value::Array(args)) = entry.remove("args") {
            argv.extend(args);
        }
        let env = entry
            .remove("env")
            .filter(Value::is_object)
            .unwrap_or_else(|| json!({}));
        entry.insert("type".to_string(), json!("local"));
        entry.insert("command".to_string(), Value::Array(argv));
        entry.insert("environment".to_string(), env);
        entry.entry("enabled").or_insert(json!(true));
        entry
    }
}

impl PlatformSchema for OpenCodeSchema {
    fn ensure_schema(&self, raw: Value) -> Value {
        let mut root = into_object(raw);
        let mut servers = take_map(&mut root, SERVERS_KEY);
        for (id, entry) in take_map(&mut root, Self::NATIVE_KEY) {
            let entry = match entry {
                Value::Object(map)
                    if map.get("type").and_then(Value::as_str) == Some("local") =>
                {
                    Value::Object(Self::from_local(map))
                }
                other => other,
            };
            servers.insert(id, entry);
        }
        root.insert(SERVERS_KEY.to_string(), Value::Object(servers));
        Value::Object(root)
    }

    fn to_native(&self, normalized: Value) -> Value {
        let mut root = into_object(normalized);
        let servers = take_map(&mut root, SERVERS_KEY)
            .into_iter()
            .map(|(id, entry)| match entry {
                Value::Object(map) => (id, Value::Object(Self::to_local(map))),
                other => (id, other),
            })
            .collect();
        root.insert(Self::NATIVE_KEY.to_string(), Value::Object(servers));
        Value::Object(root)
    }
}
