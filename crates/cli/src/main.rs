use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::import;
use cli::session::Session;
use std::path::PathBuf;
use std::sync::Arc;
use tagscope_core::dispatch::SearchDispatcher;
use tagscope_core::config;
use tagscope_core::config::AppConfig;
use tagscope_core::suggester::term_at_cursor;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Parse { query, json } => run_parse(&query, json),
        Commands::Search { query, json } => run_search(cfg, &query, json).await,
        Commands::Suggest {
            text,
            cursor,
            limit,
            json,
        } => run_suggest(cfg, &text, cursor, limit, json).await,
        Commands::Similar {
            item,
            tags,
            limit,
            within,
            json,
        } => run_similar(cfg, item, &tags, limit, within.as_deref(), json).await,
        Commands::Duplicates { threshold, json } => run_duplicates(cfg, threshold, json).await,
        Commands::Import { file, inactive } => run_import(cfg, file, inactive).await,
        Commands::Dirs {
            activate,
            deactivate,
            json,
        } => run_dirs(cfg, activate, deactivate, json).await,
        Commands::Live => run_live(cfg).await,
    }
}

#[derive(Parser)]
#[command(name = "tagscope")]
#[command(about = "Boolean tag search over tagged image collections", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the parsed form of a query
    Parse {
        query: String,
        /// Print the expression tree as JSON
        #[arg(long)]
        json: bool,
    },
    /// Items of active directories matching a query
    Search {
        /// e.g. 'cat AND (outdoor OR night) -blurry'
        query: String,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Autocomplete a tag name
    Suggest {
        /// Tag prefix, or the whole query text when --cursor is given
        #[arg(default_value = "")]
        text: String,
        /// Complete the term under this character offset of TEXT
        #[arg(long)]
        cursor: Option<usize>,
        /// Maximum suggestions (defaults to search.suggestion_limit)
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Items whose tags resemble those of ITEM, or of --tags
    Similar {
        #[arg(required_unless_present = "tags")]
        item: Option<i64>,
        /// Score against these tags instead, e.g. cat=0.9,outdoor=0.8
        #[arg(long, value_delimiter = ',', conflicts_with_all = ["item", "within"])]
        tags: Vec<String>,
        /// Number of results (defaults to search.similar_limit)
        #[arg(short, long)]
        limit: Option<usize>,
        /// Only rank items matching this query
        #[arg(long)]
        within: Option<String>,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Report near-identical item pairs
    Duplicates {
        /// Minimum score (defaults to similarity.duplicate_threshold)
        #[arg(long)]
        threshold: Option<f64>,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Load tagger output from a JSON file
    Import {
        file: PathBuf,
        /// Register the directory as inactive
        #[arg(long, default_value_t = false)]
        inactive: bool,
    },
    /// List directories or toggle whether they are searched
    Dirs {
        #[arg(long, conflicts_with = "deactivate")]
        activate: Option<i64>,
        #[arg(long)]
        deactivate: Option<i64>,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Read queries from stdin, printing only the result of the newest one
    Live,
}

fn run_parse(query: &str, json: bool) -> Result<()> {
    let expr = tagscope_core::parse(query)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&expr)?);
    } else {
        println!("{}", expr);
    }
    Ok(())
}

async fn run_search(cfg: AppConfig, query: &str, json: bool) -> Result<()> {
    let session = Session::open(cfg).await?;
    let items = session.engine.search(query).await?;
    let hits = session.hits(&items)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }
    for hit in &hits {
        println!("{}\t{}", hit.id, hit.path.as_deref().unwrap_or("-"));
    }
    eprintln!("{} item(s)", hits.len());
    Ok(())
}

async fn run_suggest(
    cfg: AppConfig,
    text: &str,
    cursor: Option<usize>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let limit = limit.unwrap_or(cfg.search.suggestion_limit);
    let prefix = match cursor {
        Some(at) => term_at_cursor(text, at).unwrap_or_default(),
        None => text.to_string(),
    };
    let session = Session::open(cfg).await?;
    let suggestions = session.engine.suggest(&prefix, limit).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&suggestions)?);
        return Ok(());
    }
    for s in &suggestions {
        println!("{}\t{}", s.name, s.count);
    }
    Ok(())
}

async fn run_similar(
    cfg: AppConfig,
    item: Option<i64>,
    tags: &[String],
    limit: Option<usize>,
    within: Option<&str>,
    json: bool,
) -> Result<()> {
    let limit = limit.unwrap_or(cfg.search.similar_limit);
    let session = Session::open(cfg).await?;
    let scored = match (item, within) {
        (Some(item), Some(query)) => session.engine.find_similar_within(item, query, limit).await?,
        (Some(item), None) => session.engine.find_similar(item, limit).await?,
        (None, _) => {
            let weights = tags
                .iter()
                .map(|t| import::parse_tag_weight(t))
                .collect::<Result<Vec<_>>>()?;
            session.engine.find_similar_to_tags(&weights, limit).await?
        }
    };
    let hits = session.scored_hits(&scored)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }
    for hit in &hits {
        println!(
            "{:.3}\t{}\t{}",
            hit.score.unwrap_or_default(),
            hit.id,
            hit.path.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

async fn run_duplicates(cfg: AppConfig, threshold: Option<f64>, json: bool) -> Result<()> {
    let session = Session::open(cfg).await?;
    let pairs = session.engine.find_duplicates(threshold).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&pairs)?);
        return Ok(());
    }
    for p in &pairs {
        println!("{:.3}\t{}\t{}", p.score, p.first, p.second);
    }
    eprintln!("{} pair(s)", pairs.len());
    Ok(())
}

async fn run_import(cfg: AppConfig, file: PathBuf, inactive: bool) -> Result<()> {
    let session = Session::open(cfg).await?;
    let summary = import::import_path(&session.store, &file, !inactive).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn run_dirs(
    cfg: AppConfig,
    activate: Option<i64>,
    deactivate: Option<i64>,
    json: bool,
) -> Result<()> {
    let session = Session::open(cfg).await?;
    let toggle = activate
        .map(|id| (id, true))
        .or_else(|| deactivate.map(|id| (id, false)));
    if let Some((id, active)) = toggle {
        if !session.store.set_directory_active(id, active).await? {
            anyhow::bail!("no directory with id {id}");
        }
    }
    let dirs = session.store.directories().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&dirs)?);
        return Ok(());
    }
    for d in &dirs {
        let state = if d.active { "active" } else { "inactive" };
        println!("{}\t{}\t{}", d.id, state, d.path);
    }
    Ok(())
}

async fn run_live(cfg: AppConfig) -> Result<()> {
    let session = Session::open(cfg).await?;
    let engine = Arc::new(session.engine);
    let (dispatcher, mut results) = SearchDispatcher::new(Arc::clone(&engine));

    let printer = tokio::spawn(async move {
        while let Some(outcome) = results.recv().await {
            match outcome.result {
                Ok(items) => {
                    let mut ids: Vec<i64> = items.into_iter().collect();
                    ids.sort_unstable();
                    println!("[{}] {} -> {:?}", outcome.seq, outcome.query, ids);
                }
                Err(err) => println!("[{}] {} -> error: {}", outcome.seq, outcome.query, err),
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        dispatcher.submit(line.trim());
    }
    drop(dispatcher);
    printer.await?;
    Ok(())
}
