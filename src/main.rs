//! mcpdock CLI

use std::collections::BTreeMap;
use std::time::Duration;

use clap::{Parser, Subcommand};
use mcpdock::install::InstallError;
use mcpdock::logging::init_logging;
use mcpdock::registry::{run_periodic_refresh, REFRESH_PERIOD};
use mcpdock::{mirrors, AgentDescriptor, AgentType, Catalog, Manager, Paths, UninstallOutcome};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "mcpdock")]
#[command(about = "Browse MCP plugins and install them into coding-agent configs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List plugins in the catalog (refreshes first if the cache is empty)
    Catalog {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-fetch the catalog from the registry sources
    Refresh {
        /// Keep running and refresh periodically
        #[arg(long)]
        watch: bool,

        /// Minutes between refreshes with --watch
        #[arg(long, default_value_t = REFRESH_PERIOD.as_secs() / 60)]
        every: u64,
    },

    /// Show whether a plugin is installed for an agent
    Status {
        /// Agent ID (e.g. cursor)
        agent: String,

        /// Plugin ID
        plugin: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Install a plugin into an agent's config
    Install {
        /// Agent ID
        agent: String,

        /// Plugin ID
        plugin: String,

        /// Environment variable for the plugin (repeatable)
        #[arg(short, long = "env", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        env: Vec<(String, String)>,
    },

    /// Remove a plugin from an agent's config
    Uninstall {
        /// Agent ID
        agent: String,

        /// Plugin ID
        plugin: String,
    },

    /// Manage agents
    Agents {
        #[command(subcommand)]
        action: AgentsAction,
    },

    /// Manage secondary registry mirrors (none by default; MCPDOCK_MIRRORS adds more)
    Mirrors {
        #[command(subcommand)]
        action: MirrorsAction,
    },

    /// Show resolved paths (for debugging)
    Paths,
}

#[derive(Subcommand)]
enum AgentsAction {
    /// List detected and custom agents
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Register a custom agent by its MCP config path
    Add {
        /// Display name (the ID is derived from it)
        name: String,

        /// Absolute path to the agent's MCP JSON config
        path: String,
    },

    /// Remove a custom agent
    Remove {
        /// Agent ID
        id: String,
    },
}

#[derive(Subcommand)]
enum MirrorsAction {
    /// List mirror URLs
    List,

    /// Add a mirror URL (a JSON file shaped like {"mcps": [...]})
    Add { url: String },

    /// Remove a mirror URL
    Remove { url: String },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty variable name in {s:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);
    let paths = Paths::resolve();

    match cli.command {
        Commands::Paths => {
            println!("Home:           {}", paths.home().display());
            println!("Registry cache: {}", paths.registry_cache().display());
            println!("Custom agents:  {}", paths.agents_file().display());
            println!("Mirrors list:   {}", paths.mirrors_path().display());
            println!("Registry URL:   {}", paths.registry_url);
            if paths.env_mirrors.is_empty() {
                println!("Env mirrors:    (none, set MCPDOCK_MIRRORS)");
            } else {
                println!("Env mirrors:    {}", paths.env_mirrors.join(", "));
            }
            println!("Cache exists:   {}", paths.registry_cache().exists());
        }
        Commands::Mirrors { action } => match action {
            MirrorsAction::List => {
                let urls = mirrors::list_mirrors(paths.mirrors_path()).await;
                if urls.is_empty() && paths.env_mirrors.is_empty() {
                    println!(
                        "No mirrors in {}. Add one with: mcpdock mirrors add <url>",
                        paths.mirrors_path().display()
                    );
                    return;
                }
                for url in &paths.env_mirrors {
                    println!("{url}  (MCPDOCK_MIRRORS)");
                }
                for url in urls {
                    println!("{url}");
                }
            }
            MirrorsAction::Add { url } => match mirrors::add_mirror(paths.mirrors_path(), &url).await {
                Ok(()) => println!("Added {}", url.trim()),
                Err(e) => fail(e),
            },
            MirrorsAction::Remove { url } => {
                match mirrors::remove_mirror(paths.mirrors_path(), &url).await {
                    Ok(()) => println!("Removed {}", url.trim()),
                    Err(e) => fail(e),
                }
            }
        },
        command => {
            let manager = match Manager::open(paths).await {
                Ok(m) => m,
                Err(e) => fail(format!("HTTP client error: {e}")),
            };
            run(&manager, command).await;
        }
    }
}

async fn run(manager: &Manager, command: Commands) {
    match command {
        Commands::Catalog { json } => {
            let catalog = manager.get_catalog().await.unwrap_or_else(|e| fail(e));
            if json {
                print_json(&catalog);
            } else if catalog.is_empty() {
                println!("Catalog is empty. Check connectivity and run: mcpdock refresh");
            } else {
                print_catalog(&catalog);
            }
        }
        Commands::Refresh { watch, every } => {
            if watch {
                let period = Duration::from_secs(every.max(1) * 60);
                run_periodic_refresh(manager.registry(), period).await;
            } else {
                match manager.refresh_catalog().await {
                    Ok(catalog) => println!("Catalog has {} plugins", catalog.mcps.len()),
                    Err(e) => fail(e),
                }
            }
        }
        Commands::Status { agent, plugin, json } => {
            match manager.get_install_status(&agent, &plugin).await {
                Ok(status) if json => print_json(&status),
                Ok(status) => {
                    let state = if status.installed { "installed" } else { "not installed" };
                    println!("{} for {}: {}", plugin, status.agent_id, state);
                    println!("Config:  {}", status.config_path.display());
                    if status.installed != status.tracked {
                        println!("Note:    ledger says {}", if status.tracked { "installed" } else { "not installed" });
                    }
                }
                Err(e) => fail(e),
            }
        }
        Commands::Install { agent, plugin, env } => {
            if let Err(e) = manager.get_catalog().await {
                fail(e);
            }
            let env: BTreeMap<String, String> = env.into_iter().collect();
            match manager.install(&agent, &plugin, &env).await {
                Ok(outcome) if outcome.changed => {
                    println!("Installed {} for {} ({})", plugin, agent, outcome.config_path.display())
                }
                Ok(outcome) => println!(
                    "{} already installed for {} ({})",
                    plugin,
                    agent,
                    outcome.config_path.display()
                ),
                Err(InstallError::MissingEnv { missing, .. }) => {
                    eprintln!("Error: missing required environment variables:");
                    for var in missing {
                        let secret = if var.spec.secret { " (secret)" } else { "" };
                        eprintln!("  {}{}  {}", var.name, secret, var.spec.description);
                        if !var.spec.placeholder.is_empty() {
                            eprintln!("      e.g. {}", var.spec.placeholder);
                        }
                    }
                    eprintln!("Pass them with -e KEY=VALUE");
                    std::process::exit(1);
                }
                Err(e) => fail(e),
            }
        }
        Commands::Uninstall { agent, plugin } => match manager.uninstall(&agent, &plugin).await {
            Ok(UninstallOutcome::Removed { config_path }) => {
                println!("Uninstalled {} from {} ({})", plugin, agent, config_path.display())
            }
            Ok(UninstallOutcome::NotFound { config_path }) => {
                eprintln!("{} is not installed for {} ({})", plugin, agent, config_path.display());
                std::process::exit(1);
            }
            Err(e) => fail(e),
        },
        Commands::Agents { action } => match action {
            AgentsAction::List { json } => {
                let agents = manager.list_agents().await;
                if json {
                    print_json(&agents);
                } else if agents.is_empty() {
                    println!("No agents found. Register one with: mcpdock agents add <name> <path>");
                } else {
                    print_agents(&agents);
                }
            }
            AgentsAction::Add { name, path } => match manager.add_persisted_agent(&name, &path).await {
                Ok(agent) => println!("Added agent {}", agent.id),
                Err(e) => fail(e),
            },
            AgentsAction::Remove { id } => match manager.remove_persisted_agent(&id).await {
                Ok(()) => println!("Removed agent {id}"),
                Err(e) => fail(e),
            },
        },
        Commands::Mirrors { .. } | Commands::Paths => {}
    }
}

fn fail(err: impl std::fmt::Display) -> ! {
    eprintln!("Error: {err}");
    std::process::exit(1);
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(output) => println!("{output}"),
        Err(e) => fail(e),
    }
}

fn print_catalog(catalog: &Catalog) {
    const INDENT: &str = "        ";

    for p in &catalog.mcps {
        println!("{}", p.id);
        println!("{}Name:      {}", INDENT, p.name);
        println!("{}Version:   {}", INDENT, p.version);
        println!("{}Category:  {}", INDENT, p.category);
        if !p.description.is_empty() {
            println!("{}Summary:   {}", INDENT, p.description.lines().next().unwrap_or("").trim());
        }
        match p.command.as_deref() {
            Some(cmd) => println!("{}Command:   {}", INDENT, cmd),
            None => println!("{}Command:   (not installable)", INDENT),
        }
        let required: Vec<&str> = p.required_env().map(|(k, _)| k.as_str()).collect();
        if !required.is_empty() {
            println!("{}Requires:  {}", INDENT, required.join(", "));
        }
        if p.installed {
            let agents: Vec<&str> = p.installed_agents.iter().map(String::as_str).collect();
            println!("{}Installed: {}", INDENT, agents.join(", "));
        }
        println!();
    }
}

fn print_agents(agents: &[AgentDescriptor]) {
    const INDENT: &str = "        ";

    for a in agents {
        let kind = match a.agent_type {
            AgentType::Detected => "detected",
            AgentType::Persisted => "custom",
        };
        println!("{}", a.id);
        println!("{}Name:     {}", INDENT, a.name);
        println!("{}Type:     {}", INDENT, kind);
        println!("{}Category: {}", INDENT, a.category);
        match &a.mcp_config_path {
            Some(p) => println!("{}Config:   {}", INDENT, p.display()),
            None => println!("{}Config:   (unresolved)", INDENT),
        }
        println!();
    }
}
