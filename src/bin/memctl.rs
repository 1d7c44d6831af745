//! Evermind memory administration CLI
//!
//! Thin operational surface over the memory store: migrations, stats,
//! listing, recall debugging, export, and deletion. Payload output (exports,
//! listings) goes to stdout; logs go to stderr.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use evermind::config::Config;
use evermind::database::{
    init_pool, init_pool_for_migrations, migrations, FragmentStore, PgFragmentStore,
};
use evermind::memory::{
    render_chat_context, DeleteFilter, ListOptions, MemoryExporter, MemoryService, OrderBy,
    OrderDirection, RetrievalQuery,
};
use evermind::provider::OpenAiClient;
use evermind::{Error, Result, VERSION};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "evermind-memctl",
    version = VERSION,
    about = "Administration tool for the Evermind memory store",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the fragments table, indexes, and match function
    Migrate,

    /// Show fragment count and age range for an owner
    Stats {
        /// Owner whose fragments to inspect
        #[arg(long)]
        owner: String,
        /// Optional persona/avatar scope
        #[arg(long)]
        scope: Option<String>,
    },

    /// List stored fragments
    List {
        /// Owner whose fragments to list
        #[arg(long)]
        owner: String,
        /// Optional persona/avatar scope
        #[arg(long)]
        scope: Option<String>,
        /// Page size; 0 lists everything
        #[arg(long, default_value_t = 50)]
        limit: usize,
        /// Rows to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Sort key: created_at, updated_at, text
        #[arg(long, default_value = "created_at")]
        order_by: String,
        /// Oldest first instead of newest first
        #[arg(long)]
        asc: bool,
    },

    /// Run a similarity search and show scores plus the rendered chat block
    Recall {
        /// Query text to match against stored memories
        query: String,
        /// Owner whose fragments may be searched
        #[arg(long)]
        owner: String,
        /// Optional persona/avatar scope
        #[arg(long)]
        scope: Option<String>,
        /// Minimum similarity in [0, 1]; defaults to MEMORY_SIMILARITY_THRESHOLD
        #[arg(long)]
        threshold: Option<f32>,
        /// Maximum matches; defaults to MEMORY_MATCH_COUNT
        #[arg(long)]
        count: Option<usize>,
    },

    /// Export an owner's fragments as JSON or CSV
    Export {
        /// Owner whose fragments to export
        #[arg(long)]
        owner: String,
        /// Optional persona/avatar scope
        #[arg(long)]
        scope: Option<String>,
        /// Output format: json or csv
        #[arg(long, default_value = "json")]
        format: String,
        /// Include embedding vectors (large)
        #[arg(long)]
        include_embeddings: bool,
        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Delete a single fragment by id
    Delete {
        /// Fragment id
        id: Uuid,
        /// Owner the fragment must belong to
        #[arg(long)]
        owner: String,
    },

    /// Bulk-delete fragments matching a filter (everything when no filter given)
    Purge {
        /// Owner whose fragments to delete
        #[arg(long)]
        owner: String,
        /// Optional persona/avatar scope
        #[arg(long)]
        scope: Option<String>,
        /// Only fragments with this tone: positive, negative, neutral
        #[arg(long)]
        tone: Option<String>,
        /// Only fragments created at or after this RFC 3339 timestamp
        #[arg(long)]
        after: Option<DateTime<Utc>>,
        /// Only fragments created at or before this RFC 3339 timestamp
        #[arg(long)]
        before: Option<DateTime<Utc>>,
        /// Only fragments whose text contains this substring
        #[arg(long)]
        contains: Option<String>,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env()?;
    init_logging(&config);

    match cli.command {
        Commands::Migrate => run_migrate(&config).await?,
        Commands::Stats { owner, scope } => show_stats(&config, &owner, scope.as_deref()).await?,
        Commands::List {
            owner,
            scope,
            limit,
            offset,
            order_by,
            asc,
        } => list_fragments(&config, &owner, scope.as_deref(), limit, offset, &order_by, asc).await?,
        Commands::Recall {
            query,
            owner,
            scope,
            threshold,
            count,
        } => recall(&config, &query, &owner, scope.as_deref(), threshold, count).await?,
        Commands::Export {
            owner,
            scope,
            format,
            include_embeddings,
            output,
        } => {
            export(
                &config,
                &owner,
                scope.as_deref(),
                &format,
                include_embeddings,
                output.as_deref(),
            )
            .await?
        }
        Commands::Delete { id, owner } => delete_fragment(&config, id, &owner).await?,
        Commands::Purge {
            owner,
            scope,
            tone,
            after,
            before,
            contains,
            yes,
        } => {
            let filter = resolve_filter(tone, after, before, contains)?;
            purge(&config, &owner, scope.as_deref(), filter, yes).await?
        }
    }

    Ok(())
}

/// Initialize tracing on stderr so stdout stays clean for payload output
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_new(&config.log.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if config.log.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }
}

/// Open the fragment store for commands that never call the provider
async fn open_store(config: &Config) -> Result<PgFragmentStore> {
    config.validate_database()?;
    let pool = init_pool(&config.database).await?;
    Ok(PgFragmentStore::new(pool))
}

async fn run_migrate(config: &Config) -> Result<()> {
    config.validate_database()?;

    // The plain pool refuses to start without pgvector; migrations install it.
    let pool = init_pool_for_migrations(&config.database).await?;
    migrations::run(&pool, config.provider.embedding_dimensions).await?;

    println!(
        "Migrations complete (vector width {}).",
        config.provider.embedding_dimensions
    );
    Ok(())
}

async fn show_stats(config: &Config, owner: &str, scope: Option<&str>) -> Result<()> {
    let store = open_store(config).await?;
    let stats = store.stats(owner, scope).await?;

    match scope {
        Some(scope) => println!("Memory stats for owner {} (scope {})", owner, scope),
        None => println!("Memory stats for owner {}", owner),
    }
    println!("  Fragments: {}", stats.total_fragments);
    if let Some(oldest) = stats.oldest_memory {
        println!("  Oldest:    {}", oldest.to_rfc3339());
    }
    if let Some(newest) = stats.newest_memory {
        println!("  Newest:    {}", newest.to_rfc3339());
    }
    Ok(())
}

async fn list_fragments(
    config: &Config,
    owner: &str,
    scope: Option<&str>,
    limit: usize,
    offset: usize,
    order_by: &str,
    asc: bool,
) -> Result<()> {
    let direction = if asc {
        OrderDirection::Asc
    } else {
        OrderDirection::Desc
    };
    let options = ListOptions::default()
        .with_limit(limit)
        .with_offset(offset)
        .with_order(order_by.parse::<OrderBy>()?, direction);

    let store = open_store(config).await?;
    let fragments = store.list(owner, scope, &options, false).await?;

    if fragments.is_empty() {
        println!("No fragments found.");
        return Ok(());
    }

    for fragment in &fragments {
        println!(
            "{}  {}  [{}]  {}",
            fragment.id,
            fragment.created_at.format("%Y-%m-%d %H:%M"),
            fragment.context.emotional_tone,
            preview(&fragment.text, 80)
        );
    }
    println!("\n{} fragment(s).", fragments.len());
    Ok(())
}

async fn recall(
    config: &Config,
    query_text: &str,
    owner: &str,
    scope: Option<&str>,
    threshold: Option<f32>,
    count: Option<usize>,
) -> Result<()> {
    config.validate()?;

    let client = Arc::new(OpenAiClient::new(config.provider.clone())?);
    let pool = init_pool(&config.database).await?;
    let store = Arc::new(PgFragmentStore::new(pool));
    let service = MemoryService::new(client.clone(), client, store);

    let mut query = RetrievalQuery::new(query_text, owner)
        .with_threshold(threshold.unwrap_or(config.memory.similarity_threshold))
        .with_limit(count.unwrap_or(config.memory.match_count));
    if let Some(scope) = scope {
        query = query.with_scope(scope);
    }
    // Retrieval itself degrades to empty on bad input; surface the problem here.
    query.validate()?;

    let matches = service.retrieve_relevant(&query).await;
    if matches.is_empty() {
        println!(
            "No memories at or above threshold {}.",
            query.similarity_threshold
        );
        return Ok(());
    }

    println!("Matches (best first):");
    for ranked in &matches {
        println!(
            "  {:.4}  {}  {}",
            ranked.similarity,
            ranked.fragment.id,
            preview(&ranked.fragment.text, 70)
        );
    }
    println!();
    println!("Chat context block:");
    print!("{}", render_chat_context(&matches));
    Ok(())
}

async fn export(
    config: &Config,
    owner: &str,
    scope: Option<&str>,
    format: &str,
    include_embeddings: bool,
    output: Option<&Path>,
) -> Result<()> {
    let store = Arc::new(open_store(config).await?);
    let exporter = MemoryExporter::new(store);

    let payload = match format {
        "json" => exporter.export_json(owner, scope, include_embeddings).await?,
        "csv" => exporter.export_csv(owner, scope, include_embeddings).await?,
        other => {
            return Err(Error::InvalidInput(format!(
                "Unknown export format: {}. Valid options: json, csv",
                other
            )))
        }
    };

    match output {
        Some(path) => {
            std::fs::write(path, &payload)?;
            println!("Wrote {} bytes to {}", payload.len(), path.display());
        }
        None => {
            print!("{}", payload);
            if !payload.ends_with('\n') {
                println!();
            }
        }
    }
    Ok(())
}

async fn delete_fragment(config: &Config, id: Uuid, owner: &str) -> Result<()> {
    let store = open_store(config).await?;
    if store.delete(id, owner).await? {
        println!("Deleted fragment {}.", id);
        Ok(())
    } else {
        Err(Error::NotFound(format!(
            "fragment {} for owner {}",
            id, owner
        )))
    }
}

async fn purge(
    config: &Config,
    owner: &str,
    scope: Option<&str>,
    filter: DeleteFilter,
    yes: bool,
) -> Result<()> {
    if !yes && !confirm(owner, scope, &filter)? {
        println!("Aborted.");
        return Ok(());
    }

    let store = open_store(config).await?;
    let removed = match &filter {
        DeleteFilter::All => store.delete_all(owner, scope).await?,
        other => store.delete_filtered(owner, scope, other).await?,
    };
    println!("Removed {} fragment(s).", removed);
    Ok(())
}

/// Turn the purge flags into a delete filter; at most one filter at a time
fn resolve_filter(
    tone: Option<String>,
    after: Option<DateTime<Utc>>,
    before: Option<DateTime<Utc>>,
    contains: Option<String>,
) -> Result<DeleteFilter> {
    let mut selected = 0;
    if tone.is_some() {
        selected += 1;
    }
    if after.is_some() || before.is_some() {
        selected += 1;
    }
    if contains.is_some() {
        selected += 1;
    }
    if selected > 1 {
        return Err(Error::InvalidInput(
            "choose one filter: --tone, --after/--before, or --contains".to_string(),
        ));
    }

    if let Some(tone) = tone {
        return Ok(DeleteFilter::Tone(tone.parse()?));
    }
    if after.is_some() || before.is_some() {
        return Ok(DeleteFilter::DateRange {
            from: after,
            to: before,
        });
    }
    if let Some(needle) = contains {
        return Ok(DeleteFilter::TextContains(needle));
    }
    Ok(DeleteFilter::All)
}

fn confirm(owner: &str, scope: Option<&str>, filter: &DeleteFilter) -> Result<bool> {
    let scope_note = scope
        .map(|s| format!(" (scope {})", s))
        .unwrap_or_default();
    println!(
        "About to delete {} for owner {}{}.",
        describe_filter(filter),
        owner,
        scope_note
    );
    print!("Type 'yes' to continue: ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().eq_ignore_ascii_case("yes"))
}

fn describe_filter(filter: &DeleteFilter) -> String {
    match filter {
        DeleteFilter::All => "all fragments".to_string(),
        DeleteFilter::Tone(tone) => format!("fragments with {} tone", tone),
        DeleteFilter::DateRange { from, to } => match (from, to) {
            (Some(from), Some(to)) => format!(
                "fragments created between {} and {}",
                from.to_rfc3339(),
                to.to_rfc3339()
            ),
            (Some(from), None) => {
                format!("fragments created at or after {}", from.to_rfc3339())
            }
            (None, Some(to)) => format!("fragments created at or before {}", to.to_rfc3339()),
            (None, None) => "all fragments".to_string(),
        },
        DeleteFilter::TextContains(needle) => format!("fragments containing {:?}", needle),
    }
}

/// Single-line text preview cut at `max_chars` characters
fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.replace(['\n', '\r'], " ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut)
}
