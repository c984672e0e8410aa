//! # Stability Guard CLI (`sguard`)
//!
//! ## Usage
//!
//! ```bash
//! sguard --config ./config/sguard.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sguard init` | Write a starter config and prepare the audit database |
//! | `sguard scan [PATH]` | Scan a source tree; exits 1 on findings |
//! | `sguard check --kind K --name N` | Gateway decision; exits 1 when blocked |
//! | `sguard search "<query>"` | Search the catalog |
//! | `sguard similar <name>` | Catalog neighbours of an entry |
//! | `sguard stats` | Registry and catalog counts |
//! | `sguard export <file>` | Write a registry + catalog snapshot |
//! | `sguard serve` | Start the HTTP tool server |
//!
//! State lives in process memory. Commands other than `init` start from
//! `[registry].snapshot` (if set) and, with `--scan`, from a scan of
//! `[scan].root`.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use stability_guard::audit;
use stability_guard::config::{self, Config, DEFAULT_CONFIG_PATH};
use stability_guard::guard::StabilityGuard;
use stability_guard::scan;
use stability_guard::server;
use stability_guard_core::catalog::SearchOptions;
use stability_guard_core::gateway::{CreationRequest, RequestKind};
use stability_guard_core::models::EntityKind;

const EXAMPLE_CONFIG: &str = include_str!("../config/sguard.example.toml");

/// Stability Guard: duplicate prevention and mock-data detection for
/// application source trees.
#[derive(Parser)]
#[command(name = "sguard", version)]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults apply when it
    /// does not exist.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Warnings and errors only.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Copy)]
struct Seed {
    /// Populate the registry from `[scan].root` first.
    #[arg(long)]
    scan: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter config (if missing) and migrate the audit database.
    Init {
        /// Overwrite an existing config file.
        #[arg(long)]
        force: bool,
    },

    /// Scan a source tree for duplicate declarations and mock data.
    Scan {
        /// Scan root; defaults to `[scan].root`.
        path: Option<PathBuf>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,

        /// Write the resulting registry + catalog snapshot here.
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Ask the gateway whether an artifact may be created.
    Check {
        /// component, service, hook, type, module, utility, table or column.
        #[arg(long)]
        kind: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        category: Option<String>,

        /// Functionality phrase (repeatable).
        #[arg(long = "functionality")]
        functionality: Vec<String>,

        /// Prop / method / return / field name (repeatable).
        #[arg(long = "member")]
        members: Vec<String>,

        /// Column a table request defines (repeatable).
        #[arg(long = "field")]
        required_fields: Vec<String>,

        /// Owning table for column requests.
        #[arg(long)]
        table: Option<String>,

        /// File with the proposed source text.
        #[arg(long)]
        source: Option<PathBuf>,

        #[arg(long)]
        json: bool,

        #[command(flatten)]
        seed: Seed,
    },

    /// Search the catalog.
    Search {
        query: String,

        #[arg(long)]
        category: Option<String>,

        /// Required tag (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,

        #[arg(long)]
        kind: Option<String>,

        #[arg(long)]
        fuzzy: bool,

        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[command(flatten)]
        seed: Seed,
    },

    /// List catalog entries similar to a named one.
    Similar {
        name: String,

        /// Defaults to `[catalog].similar_threshold`.
        #[arg(long)]
        threshold: Option<f64>,

        #[command(flatten)]
        seed: Seed,
    },

    /// Registry and catalog counts.
    Stats {
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        seed: Seed,
    },

    /// Write the registry + catalog snapshot as JSON.
    Export {
        output: PathBuf,

        #[command(flatten)]
        seed: Seed,
    },

    /// Start the HTTP tool server on `[server].bind`.
    Serve {
        #[command(flatten)]
        seed: Seed,
    },
}

fn init_logging(cli: &Cli) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.filter_module("sqlx", log::LevelFilter::Warn);
    builder.target(env_logger::Target::Stderr).init();
}

/// Build the guard and optionally seed it from the configured scan root.
async fn open_guard(cfg: &Config, seed: Seed) -> Result<StabilityGuard> {
    let guard = StabilityGuard::from_config(cfg).await?;
    if seed.scan {
        let report = scan::run_scan(&guard, &cfg.scan, None)?;
        log::info!(
            "seeded {} declaration(s) from {}",
            report.recorded,
            report.root
        );
    }
    Ok(guard)
}

fn parse_entity_kind(kind: &str) -> Result<EntityKind> {
    kind.parse::<EntityKind>().map_err(anyhow::Error::msg)
}

fn parse_request_kind(kind: &str) -> Result<RequestKind> {
    serde_json::from_value(serde_json::Value::String(kind.trim().to_ascii_lowercase()))
        .map_err(|_| {
            anyhow::anyhow!(
                "unknown kind '{}': expected component, service, hook, type, module, utility, table, or column",
                kind
            )
        })
}

fn run_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        println!("Config already exists at {} (use --force to overwrite).", path.display());
    } else {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, EXAMPLE_CONFIG)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli);

    let command = match cli.command {
        Commands::Init { force } => {
            run_init(&cli.config, force)?;
            let cfg = config::load_config(&cli.config)?;
            if cfg.audit.is_enabled() {
                let sink = audit::sink_from_config(&cfg.audit).await?;
                println!("Audit sink '{}' ready.", sink.name());
            }
            return Ok(ExitCode::SUCCESS);
        }
        command => command,
    };

    let cfg = config::load_or_minimal(&cli.config)?;

    match command {
        Commands::Init { .. } => {}
        Commands::Scan { path, json, save } => {
            let guard = StabilityGuard::from_config(&cfg).await?;
            let report = scan::run_scan(&guard, &cfg.scan, path.as_deref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                scan::print_report(&report);
            }
            if let Some(out) = save {
                guard.save_snapshot(&out)?;
                log::info!("snapshot written to {}", out.display());
            }
            if report.has_findings() {
                return Ok(ExitCode::from(1));
            }
        }
        Commands::Check {
            kind,
            name,
            category,
            functionality,
            members,
            required_fields,
            table,
            source,
            json,
            seed,
        } => {
            let source = match source {
                Some(path) => Some(
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read source: {}", path.display()))?,
                ),
                None => None,
            };
            let request = CreationRequest {
                kind: parse_request_kind(&kind)?,
                name,
                table_name: table,
                functionality,
                description: None,
                required_fields,
                category,
                members,
                source,
            };
            let guard = open_guard(&cfg, seed).await?;
            let result = guard.analyze(&request).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_decision(&result);
            }
            if !result.decision.can_proceed {
                return Ok(ExitCode::from(1));
            }
        }
        Commands::Search {
            query,
            category,
            tags,
            kind,
            fuzzy,
            limit,
            seed,
        } => {
            let options = SearchOptions {
                category,
                tags,
                kind: kind.as_deref().map(parse_entity_kind).transpose()?,
                fuzzy,
            };
            let guard = open_guard(&cfg, seed).await?;
            let hits = guard.search(&query, &options);
            if hits.is_empty() {
                println!("No results.");
            }
            for (i, hit) in hits.iter().take(limit).enumerate() {
                let e = &hit.entry;
                println!(
                    "{}. [{}] {} ({}) relevance {}",
                    i + 1,
                    e.kind,
                    e.name,
                    e.file_path.as_deref().unwrap_or("-"),
                    hit.relevance
                );
                if let Some(description) = &e.description {
                    println!("    {}", description);
                }
            }
        }
        Commands::Similar {
            name,
            threshold,
            seed,
        } => {
            let guard = open_guard(&cfg, seed).await?;
            let similar = guard.similar(&name, threshold);
            if similar.is_empty() {
                println!("No similar entries for '{}'.", name);
            }
            for s in similar {
                println!(
                    "  {:.2}  [{}] {} ({})",
                    s.score,
                    s.kind,
                    s.name,
                    s.file_path.as_deref().unwrap_or("-")
                );
            }
        }
        Commands::Stats { json, seed } => {
            let guard = open_guard(&cfg, seed).await?;
            let stats = guard.stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Stability Guard Stats");
                println!("=====================");
                println!();
                println!("  Registry:  {} entities", stats.registry.total);
                for (kind, count) in &stats.registry.by_kind {
                    println!("    {:<10} {}", kind.to_string(), count);
                }
                println!("  Locked:    {}", stats.registry.locked);
                println!();
                println!("  Catalog:   {} entries", stats.catalog.total);
                for (category, count) in &stats.catalog.by_category {
                    println!("    {:<16} {}", category, count);
                }
            }
        }
        Commands::Export { output, seed } => {
            let guard = open_guard(&cfg, seed).await?;
            guard.save_snapshot(&output)?;
            println!(
                "Exported {} entities to {}",
                guard.stats().registry.total,
                output.display()
            );
        }
        Commands::Serve { seed } => {
            let guard = open_guard(&cfg, seed).await?;
            server::run_server(Arc::new(cfg.clone()), Arc::new(guard)).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_decision(result: &stability_guard::guard::GuardedDecision) {
    let d = &result.decision;
    let verdict = if d.approved_for_creation {
        "APPROVED"
    } else if d.should_proceed {
        "PROCEED"
    } else if d.can_proceed {
        "REVIEW"
    } else {
        "BLOCKED"
    };
    let kind = serde_json::to_value(d.kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    println!("{} {} '{}'", verdict, kind, d.name);
    println!(
        "  risk {}  type safety {}  database usage {}",
        d.risk_score, d.type_safety_score, d.database_usage_score
    );
    for reason in &d.blocking_reasons {
        println!("  ✗ {}", reason);
    }
    for warning in &d.warnings {
        println!("  ! {}", warning);
    }
    for rec in &d.recommendations {
        println!("  → {}", rec);
    }
    for alt in &d.existing_alternatives {
        println!(
            "  ≈ {} {} ({}) {:.2}",
            alt.kind,
            alt.name,
            alt.file_path.as_deref().unwrap_or("-"),
            alt.score
        );
    }
    log::debug!("audit: {:?}", result.audit);
}
