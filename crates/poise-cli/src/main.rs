//! Poise CLI
//!
//! Developer tools for checking policy decisions, compiling rule sets and
//! replaying message scripts against an in-memory background service.

mod simulate;

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use poise_compiler::build_rule_set;
use poise_core::params::sanitize_url;
use poise_core::policy::{Dimension, PathHostMatch};
use poise_core::{Persona, PolicyConfig};

#[derive(Parser)]
#[command(name = "poise")]
#[command(about = "Poise policy simulator and rule compiler")]
struct Cli {
    /// Log filter, e.g. `info` or `poise_service=debug`
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide a URL against whitelist/blacklist entries
    Decide {
        /// URL to decide
        #[arg(long)]
        url: String,

        /// Stored config JSON to start from
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Whitelist origin entry
        #[arg(long = "whitelist")]
        whitelist: Vec<String>,

        /// Whitelist path entry
        #[arg(long = "wpath")]
        whitelist_paths: Vec<String>,

        /// Whitelist pattern entry
        #[arg(long = "wpattern")]
        whitelist_patterns: Vec<String>,

        /// Blacklist origin entry
        #[arg(long = "blacklist")]
        blacklist: Vec<String>,

        /// Blacklist path entry
        #[arg(long = "bpath")]
        blacklist_paths: Vec<String>,

        /// Blacklist pattern entry
        #[arg(long = "bpattern")]
        blacklist_patterns: Vec<String>,

        /// Compare path entry hosts exactly instead of by base domain
        #[arg(long)]
        exact_host: bool,
    },

    /// Compile a config into declarative rules
    Compile {
        /// Stored config JSON (defaults when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the persona an origin reports to trackers
    Persona {
        #[arg(long)]
        origin: String,
    },

    /// Preview tracking-parameter poisoning of a URL
    Sanitize {
        #[arg(long)]
        url: String,

        /// Base for relative URLs
        #[arg(long)]
        base: Option<String>,
    },

    /// Replay a JSON step script against an in-memory background service
    Simulate {
        /// Script file: a JSON array of steps
        #[arg(short, long)]
        script: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let result = match cli.command {
        Commands::Decide {
            url,
            config,
            whitelist,
            whitelist_paths,
            whitelist_patterns,
            blacklist,
            blacklist_paths,
            blacklist_patterns,
            exact_host,
        } => {
            let entries = [
                (Dimension::WhitelistOrigin, whitelist),
                (Dimension::WhitelistPath, whitelist_paths),
                (Dimension::WhitelistPattern, whitelist_patterns),
                (Dimension::BlacklistOrigin, blacklist),
                (Dimension::BlacklistPath, blacklist_paths),
                (Dimension::BlacklistPattern, blacklist_patterns),
            ];
            cmd_decide(&url, config.as_deref(), &entries, exact_host)
        }
        Commands::Compile { config, output } => cmd_compile(config.as_deref(), output.as_deref()),
        Commands::Persona { origin } => cmd_persona(&origin),
        Commands::Sanitize { url, base } => cmd_sanitize(&url, base.as_deref()),
        Commands::Simulate { script } => simulate::run(&script),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<PolicyConfig, String> {
    let Some(path) = path else {
        return Ok(PolicyConfig::default());
    };
    let text = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    let value = serde_json::from_str(&text).map_err(|e| format!("Invalid config '{}': {}", path.display(), e))?;
    Ok(PolicyConfig::from_value_lossy(value))
}

pub(crate) fn print_json(value: &impl serde::Serialize) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{text}");
    Ok(())
}

fn cmd_decide(
    url: &str,
    config: Option<&Path>,
    entries: &[(Dimension, Vec<String>)],
    exact_host: bool,
) -> Result<(), String> {
    let mut cfg = load_config(config)?;
    if exact_host {
        cfg.path_host_match = PathHostMatch::ExactHost;
    }
    for (dim, inputs) in entries {
        for input in inputs {
            cfg.add_entry(*dim, input)
                .map_err(|e| format!("Rejected entry: {e}"))?;
        }
    }

    let matcher = cfg.matcher();
    let verdict = matcher.decide(url);
    print_json(&json!({
        "url": url,
        "verdict": verdict,
        "whitelisted": matcher.whitelist_match(url).is_some(),
        "entries": Dimension::ALL
            .into_iter()
            .filter(|dim| !cfg.entries(*dim).is_empty())
            .map(|dim| (dim.field().to_string(), json!(cfg.entries(dim))))
            .collect::<serde_json::Map<_, _>>(),
    }))
}

fn cmd_compile(config: Option<&Path>, output: Option<&Path>) -> Result<(), String> {
    let cfg = load_config(config)?;
    let set = build_rule_set(&cfg).map_err(|e| e.to_string())?;
    let text = serde_json::to_string_pretty(&set.to_vec()).map_err(|e| e.to_string())?;

    match output {
        Some(path) => {
            fs::write(path, text).map_err(|e| format!("Failed to write '{}': {}", path.display(), e))?;
            eprintln!("Compiled {} rules to '{}'", set.len(), path.display());
        }
        None => println!("{text}"),
    }
    let stats = &set.stats;
    eprintln!(
        "  Rules:    {} -> {} (deduped {}, subsumed {}, capped {})",
        stats.before, stats.after, stats.deduped, stats.subsumed, stats.capped
    );
    Ok(())
}

fn cmd_persona(origin: &str) -> Result<(), String> {
    print_json(&Persona::for_origin(origin))
}

fn cmd_sanitize(url: &str, base: Option<&str>) -> Result<(), String> {
    print_json(&sanitize_url(url, base))
}
