mod config;
mod tokens;

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use cxg_core::{
    ActivationEngine, GraphSummary, PatternSet, PatternStore, SequenceGraph, TreeQuery,
    UnifiedGraphComposer, export_events, export_trees,
};
use cxg_store::Store;

use crate::config::FileConfig;

#[derive(Parser)]
#[command(name = "cxg", about = "Construction-graph recognizer CLI")]
struct Cli {
    /// Pattern database (default: $CXG_DATA_DIR/patterns.db or ~/.cxg/patterns.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// TOML config file (default: $CXG_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import patterns from a grammar JSON file
    Import {
        /// Input file path
        path: PathBuf,
    },

    /// Export all patterns to a grammar JSON file
    Export {
        /// Output file path
        path: PathBuf,
    },

    /// List stored patterns
    List,

    /// Compile and compose patterns, reporting the first error
    Check {
        /// Patterns to check (default: all)
        names: Vec<String>,
    },

    /// Feed a token stream through the engine and print recognised constructions
    Parse {
        /// Patterns to load (default: all)
        #[arg(long = "pattern")]
        patterns: Vec<String>,

        /// Token file, one `TYPE:value` per line (default: stdin)
        #[arg(long)]
        tokens: Option<PathBuf>,

        /// Run each pattern anchored at the first token, without composition
        #[arg(long)]
        isolated: bool,

        /// Only print trees of this pattern
        #[arg(long)]
        root: Option<String>,

        /// Maximum number of trees
        #[arg(long)]
        limit: Option<usize>,

        /// Drop trees nested inside other trees
        #[arg(long)]
        maximal: bool,

        /// Print trees as JSON
        #[arg(long)]
        json: bool,

        /// Print the raw event log as JSON
        #[arg(long)]
        events: bool,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config_path = config::resolve_path(cli.config.as_deref());
    let config = config::load(config_path.as_deref())?;

    match &cli.command {
        Commands::Import { path } => cmd_import(&cli, path),
        Commands::Export { path } => cmd_export(&cli, path),
        Commands::List => cmd_list(&cli),
        Commands::Check { names } => cmd_check(&cli, names),
        Commands::Parse {
            patterns,
            tokens,
            isolated,
            root,
            limit,
            maximal,
            json,
            events,
        } => {
            let opts = ParseOptions {
                isolated: *isolated,
                query: TreeQuery {
                    pattern: root.clone(),
                    limit: limit.or(config.output.limit),
                    maximal_only: *maximal || config.output.maximal,
                    min_span: 0,
                },
                json: *json || config.output.json,
                events: *events,
            };
            cmd_parse(&cli, &config, patterns, tokens.as_deref(), &opts)
        }
    }
}

fn open_store(cli: &Cli) -> Result<Store> {
    let path = cli.db.clone().unwrap_or_else(cxg_store::default_db_path);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Store::open(&path).context("failed to open pattern store")
}

fn load_patterns(store: &Store, names: &[String]) -> Result<PatternSet> {
    let patterns = if names.is_empty() {
        store.load_all()?
    } else {
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        store.load_by_names(&names)?
    };
    if patterns.is_empty() {
        bail!("no patterns stored; run `cxg import <file>` first");
    }
    Ok(patterns)
}

fn cmd_import(cli: &Cli, path: &Path) -> Result<()> {
    let store = open_store(cli)?;
    let count = store
        .import_json_file(path)
        .with_context(|| format!("failed to import {}", path.display()))?;
    println!("imported {count} patterns from {}", path.display());
    Ok(())
}

fn cmd_export(cli: &Cli, path: &Path) -> Result<()> {
    let store = open_store(cli)?;
    store
        .export_json_file(path)
        .with_context(|| format!("failed to export to {}", path.display()))?;
    println!("exported to {}", path.display());
    Ok(())
}

fn cmd_list(cli: &Cli) -> Result<()> {
    let store = open_store(cli)?;
    let patterns = store.load_all()?;
    if patterns.is_empty() {
        println!("(no patterns)");
        return Ok(());
    }
    for (name, spec) in &patterns {
        let refs = spec.references();
        let refs = if refs.is_empty() {
            String::from("-")
        } else {
            refs.join(",")
        };
        println!(
            "{name:<16} nodes={:<3} edges={:<3} refs={refs}",
            spec.nodes.len(),
            spec.edges.len()
        );
    }
    Ok(())
}

fn cmd_check(cli: &Cli, names: &[String]) -> Result<()> {
    let store = open_store(cli)?;
    let patterns = load_patterns(&store, names)?;
    let graph = UnifiedGraphComposer::build(&patterns)?;
    let summary = GraphSummary::of(&graph);

    println!("patterns:   {}", summary.patterns);
    println!("nodes:      {}", summary.nodes);
    for (kind, count) in &summary.edges {
        println!("{:<11} {count}", format!("{kind}:"));
    }
    for name in &summary.empty_patterns {
        println!("warning: '{name}' can complete without consuming a token");
    }
    println!("ok");
    Ok(())
}

struct ParseOptions {
    isolated: bool,
    query: TreeQuery,
    json: bool,
    events: bool,
}

fn cmd_parse(
    cli: &Cli,
    config: &FileConfig,
    names: &[String],
    tokens: Option<&Path>,
    opts: &ParseOptions,
) -> Result<()> {
    let store = open_store(cli)?;
    let patterns = load_patterns(&store, names)?;

    let mut engine = if opts.isolated {
        let graphs = patterns
            .iter()
            .map(|(name, spec)| SequenceGraph::build(name, spec))
            .collect::<cxg_core::Result<Vec<_>>>()?;
        ActivationEngine::isolated(&graphs, config.engine.clone())?
    } else {
        ActivationEngine::from_patterns(&patterns, config.engine.clone())?
    };

    let reader: Box<dyn BufRead> = match tokens {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open tokens {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(io::stdin().lock()),
    };

    tracing::info!(
        session = %engine.session(),
        patterns = patterns.len(),
        mode = ?engine.mode(),
        "parse session started"
    );
    let mut count = 0usize;
    for token in tokens::tokens(reader) {
        let token = token.context("failed to read tokens")?;
        engine
            .process_input(&token.element_type, &token.value)
            .with_context(|| format!("failed at token {:?}", token.element_type))?;
        count += 1;
    }
    tracing::info!(session = %engine.session(), tokens = count, "parse session finished");

    if opts.events {
        println!("{}", export_events(engine.events())?);
        return Ok(());
    }

    let trees = engine.results(&opts.query);
    if opts.json {
        println!("{}", export_trees(&trees)?);
    } else if trees.is_empty() {
        println!("(no constructions recognised)");
    } else {
        for tree in &trees {
            print!("{}", tree.render());
        }
    }
    Ok(())
}
