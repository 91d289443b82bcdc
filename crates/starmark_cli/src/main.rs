//! Starmark command line entry point.
//!
//! # Responsibility
//! - Resolve configuration and logging, then open exactly one backend.
//! - Map subcommands onto the catalog, the filter engine and the facade.

mod render;

use clap::{Args, Parser, Subcommand};
use log::info;
use starmark_core::{
    default_log_level, init_logging, AnnotationFacade, AppConfig, Catalog, Debouncer, FilterPatch,
    FilterState, RepoId, SortKey, StoreError,
};
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "starmark")]
#[command(about = "Browse starred GitHub repositories with personal tags and notes")]
#[command(version)]
struct Cli {
    /// JSON config file; `STARMARK_*` environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Data file written by the sync job.
    #[arg(long, global = true)]
    data: Option<PathBuf>,
    /// Use the table-backed store instead of the local file store.
    #[arg(long, global = true)]
    remote: bool,
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the filtered and sorted repository list
    List {
        #[command(flatten)]
        filters: FilterArgs,
        /// Emit the visible records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Read search text line by line from stdin and re-render after each pause
    Browse {
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Edit the tags of one repository
    Tag {
        #[command(subcommand)]
        action: TagAction,
    },
    /// Read or write the notes of one repository
    Notes {
        #[command(subcommand)]
        action: NotesAction,
    },
    /// List every distinct custom tag
    Tags,
    /// Show language and topic counts across all repositories
    Facets,
    /// Write all annotations as JSON to stdout or into a directory
    Export {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Merge annotations from an export file
    Import { file: PathBuf },
    /// Delete every stored annotation
    Clear {
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum TagAction {
    Add { repo_id: RepoId, tag: String },
    Remove { repo_id: RepoId, tag: String },
    /// Replace the full list; no tags clears it
    Set { repo_id: RepoId, tags: Vec<String> },
}

#[derive(Subcommand)]
enum NotesAction {
    Get { repo_id: RepoId },
    /// Store notes; blank text deletes them
    Set { repo_id: RepoId, text: String },
    /// Type notes on stdin; they are saved after each pause in typing
    Edit { repo_id: RepoId },
}

#[derive(Args)]
struct FilterArgs {
    /// URL-style query, e.g. `search=cli&topic=tui&sort=name-asc`
    #[arg(long)]
    query: Option<String>,
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    language: Option<String>,
    #[arg(long = "topic")]
    topics: Vec<String>,
    #[arg(long = "tag")]
    tags: Vec<String>,
    /// stars-desc, stars-asc, name-asc, name-desc, updated-desc, updated-asc
    #[arg(long)]
    sort: Option<String>,
}

impl FilterArgs {
    /// Query string first, then explicit flags on top of it.
    fn to_state(&self) -> FilterState {
        let mut state = self
            .query
            .as_deref()
            .map(FilterState::from_query)
            .unwrap_or_default();

        let mut patch = FilterPatch::default();
        if let Some(search) = &self.search {
            patch = patch.search(search.as_str());
        }
        if let Some(language) = &self.language {
            patch = patch.language(Some(language.as_str()));
        }
        if !self.topics.is_empty() {
            patch = patch.topics(self.topics.iter().cloned());
        }
        if !self.tags.is_empty() {
            patch = patch.tags(self.tags.iter().cloned());
        }
        if let Some(sort) = &self.sort {
            patch = patch.sort(SortKey::parse_or_default(sort));
        }
        state.merge(patch);
        state
    }
}

#[tokio::main]
async fn main() -> CliResult {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    start_logging(&cli, &config)?;

    let facade = AnnotationFacade::open(&config)?;
    info!(
        "event=cli_command module=cli status=start backend={}",
        facade.mode().as_str()
    );

    match cli.command {
        Commands::List { filters, json } => {
            let catalog = Catalog::load(&config, facade, filters.to_state()).await;
            if json {
                println!("{}", render::visible_json(catalog.engine())?);
            } else {
                print!("{}", render::listing(&catalog));
            }
        }
        Commands::Browse { filters } => {
            let catalog = Catalog::load(&config, facade, filters.to_state()).await;
            browse(catalog, &config).await?;
        }
        Commands::Tag { action } => run_tag_action(&config, facade, action).await?,
        Commands::Notes { action } => match action {
            NotesAction::Get { repo_id } => println!("{}", facade.notes(repo_id).await),
            NotesAction::Set { repo_id, text } => {
                let mut catalog = Catalog::load(&config, facade, FilterState::default()).await;
                let stored = catalog.set_notes(repo_id, &text).await.map_err(explain)?;
                if stored.is_empty() {
                    println!("notes for {repo_id} deleted");
                } else {
                    println!("notes for {repo_id} saved");
                }
            }
            NotesAction::Edit { repo_id } => {
                let catalog = Catalog::load(&config, facade, FilterState::default()).await;
                edit_notes(catalog, &config, repo_id).await?;
            }
        },
        Commands::Tags => {
            for tag in facade.unique_tags().await {
                println!("{tag}");
            }
        }
        Commands::Facets => {
            let catalog = Catalog::load(&config, facade, FilterState::default()).await;
            print!("{}", render::facets(catalog.engine()));
        }
        Commands::Export { dir } => match dir {
            Some(dir) => {
                let path = facade.export_to_dir(&dir).await?;
                println!("exported to {}", path.display());
            }
            None => println!("{}", facade.export_json().await?),
        },
        Commands::Import { file } => {
            let raw = tokio::fs::read_to_string(&file).await?;
            let summary = facade.import_json(&raw).await.map_err(explain)?;
            println!(
                "imported tags for {} repositories and {} notes",
                summary.tagged_repositories, summary.notes
            );
        }
        Commands::Clear { yes } => {
            if !yes {
                return Err("refusing to delete every annotation without --yes".into());
            }
            facade.clear().await?;
            println!("all annotations deleted");
        }
    }
    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<AppConfig, Box<dyn Error>> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(data) = &cli.data {
        config.data_file = data.clone();
    }
    if cli.remote {
        config.remote_store = true;
    }
    if let Some(dir) = &cli.log_dir {
        config.log_dir = Some(dir.clone());
    }
    if let Some(level) = &cli.log_level {
        config.log_level = Some(level.clone());
    }
    Ok(config)
}

fn start_logging(cli: &Cli, config: &AppConfig) -> CliResult {
    let Some(dir) = &config.log_dir else {
        return Ok(());
    };
    let level = config
        .log_level
        .clone()
        .unwrap_or_else(|| default_log_level().to_string());
    init_logging(&level, absolute(dir)?)?;
    info!(
        "event=cli_start module=cli status=ok remote_flag={}",
        cli.remote
    );
    Ok(())
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

async fn run_tag_action(config: &AppConfig, facade: AnnotationFacade, action: TagAction) -> CliResult {
    let mut catalog = Catalog::load(config, facade, FilterState::default()).await;
    let (repo_id, tags) = match action {
        TagAction::Add { repo_id, tag } => (repo_id, catalog.add_tag(repo_id, &tag).await),
        TagAction::Remove { repo_id, tag } => (repo_id, catalog.remove_tag(repo_id, &tag).await),
        TagAction::Set { repo_id, tags } => (repo_id, catalog.set_tags(repo_id, &tags).await),
    };
    let tags = tags.map_err(explain)?;
    if catalog.engine().repository(repo_id).is_none() {
        eprintln!("warning: repository {repo_id} is not in the data file");
    }
    println!("{repo_id}: {}", render::tag_list(&tags));
    Ok(())
}

/// Stdin-driven search: each line restarts the search debounce interval.
async fn browse(mut catalog: Catalog, config: &AppConfig) -> CliResult {
    print!("{}", render::listing(&catalog));
    let (debouncer, mut queries) = Debouncer::new(config.search_debounce());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(text) => debouncer.submit(text),
                None => break,
            },
            Some(query) = queries.recv() => apply_search(&mut catalog, query),
        }
    }

    // Flush the query typed right before end of input.
    drop(debouncer);
    while let Some(query) = queries.recv().await {
        apply_search(&mut catalog, query);
    }
    Ok(())
}

/// Auto-saving notes editor: the whole buffer is saved once typing pauses.
async fn edit_notes(mut catalog: Catalog, config: &AppConfig, repo_id: RepoId) -> CliResult {
    let mut buffer = catalog.facade().notes(repo_id).await;
    if !buffer.is_empty() {
        println!("{buffer}");
    }
    let (debouncer, mut drafts) = Debouncer::new(config.notes_debounce());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(text) => {
                    if !buffer.is_empty() {
                        buffer.push('\n');
                    }
                    buffer.push_str(&text);
                    debouncer.submit(buffer.clone());
                }
                None => break,
            },
            Some(draft) = drafts.recv() => save_draft(&mut catalog, repo_id, &draft).await?,
        }
    }

    drop(debouncer);
    while let Some(draft) = drafts.recv().await {
        save_draft(&mut catalog, repo_id, &draft).await?;
    }
    Ok(())
}

async fn save_draft(catalog: &mut Catalog, repo_id: RepoId, draft: &str) -> CliResult {
    catalog.set_notes(repo_id, draft).await.map_err(explain)?;
    eprintln!("saved notes for {repo_id}");
    Ok(())
}

fn apply_search(catalog: &mut Catalog, query: String) {
    catalog
        .engine_mut()
        .set_filter(FilterPatch::default().search(query));
    print!("{}", render::listing(catalog));
}

/// Rewords capacity failures so the user knows what to do about them.
fn explain(err: StoreError) -> Box<dyn Error> {
    if err.is_quota_exceeded() {
        format!("{err}. Export and clear old annotations to free space.").into()
    } else {
        err.into()
    }
}
