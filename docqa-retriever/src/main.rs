use anyhow::Result;
use clap::{Parser, Subcommand};
use docqa_retriever::{
    config::AppConfig,
    retrieval::{
        knowledge_base::{ResponseStatus, RetrievedChunk},
        scanner::{ensure_documents_dir, seed_demo_document},
        watcher::DocumentWatcher,
    },
    session::{
        AskOutcome, EMPTY_QUESTION_MESSAGE, NOT_READY_MESSAGE, Session, UploadedFile,
        format_outcome,
    },
    status::collect_status,
    storage::{ChunkStore, sqlite_store::SqliteStore},
};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::{StreamExt, wrappers::LinesStream};
use tracing_subscriber::EnvFilter;

/// Ask questions about a folder of .txt, .pdf and .csv documents.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults to docqa.toml in the workspace)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding documents/ and the index files
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rebuild the knowledge base from the documents directory
    Build,
    /// Replace all documents with the given files and rebuild
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Answer a question from the documents
    Ask {
        question: String,
        /// Number of chunks to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show knowledge base status
    Status {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// List stored chunks
    List {
        /// Limit number of results
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Write the demo document into the documents directory
    Seed,
    /// Line-oriented question prompt that follows document changes
    Interactive,
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Full,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "full" => Ok(OutputFormat::Full),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[derive(Serialize)]
struct AskOutput<'a> {
    question: &'a str,
    status: &'a str,
    answer: &'a str,
    score: f32,
    context: &'a str,
    sources: &'a [RetrievedChunk],
}

impl<'a> AskOutput<'a> {
    fn new(question: &'a str, outcome: &'a AskOutcome) -> Self {
        let (status, answer) = match outcome {
            AskOutcome::EmptyQuestion => ("empty_question", EMPTY_QUESTION_MESSAGE),
            AskOutcome::NotReady => ("not_ready", NOT_READY_MESSAGE),
            AskOutcome::Response(r) => {
                return Self {
                    question,
                    status: status_name(&r.status),
                    answer: &r.answer,
                    score: r.score,
                    context: &r.context,
                    sources: &r.sources,
                };
            }
        };
        Self {
            question,
            status,
            answer,
            score: 0.0,
            context: "",
            sources: &[],
        }
    }
}

fn status_name(status: &ResponseStatus) -> &'static str {
    use ResponseStatus::*;
    match status {
        Answered => "answered",
        NotBuilt => "not_built",
        LoadFailed => "load_failed",
        SearchFailed => "search_failed",
        NoContext => "no_context",
        GenerationFailed => "generation_failed",
    }
}

#[derive(Serialize)]
struct ChunkOutput {
    position: usize,
    source: String,
    sequence: usize,
    chars: usize,
    content: String,
}

#[derive(Debug, PartialEq)]
enum ShellCommand {
    Ask(String),
    Upload(Vec<PathBuf>),
    Rebuild,
    Status,
    Help,
    Quit,
    Unknown(String),
    Empty,
}

impl ShellCommand {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(command) = line.strip_prefix(':') else {
            return Self::Ask(line.to_string());
        };
        let mut parts = command.split_whitespace();
        match parts.next().unwrap_or_default() {
            "upload" => Self::Upload(parts.map(PathBuf::from).collect()),
            "rebuild" => Self::Rebuild,
            "status" => Self::Status,
            "help" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => Self::Unknown(other.to_string()),
        }
    }
}

const SHELL_HELP: &str = "Type a question, or one of:
  :upload <files...>  replace the documents and rebuild
  :rebuild            rebuild from the documents directory
  :status             show the knowledge base state
  :quit               leave";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    let lookup_dir = args.workspace.clone().unwrap_or_else(|| PathBuf::from("."));
    let mut config = AppConfig::discover(args.config.as_deref(), &lookup_dir)?;
    if let Some(workspace) = &args.workspace {
        config = config.with_workspace(workspace);
    }
    init_tracing(&config.logging.level, args.verbose);

    match args.command {
        Commands::Build => {
            prepare_documents(&config)?;
            let mut session = Session::from_config(&config).await?;
            let state = session.rebuild_from_disk().await?;
            if state.index_built {
                println!(
                    "Knowledge base built with {} documents.",
                    state.document_count
                );
            } else {
                println!("No documents found. Please upload files.");
            }
            Ok(())
        }
        Commands::Upload { files } => {
            let mut uploads = Vec::with_capacity(files.len());
            for path in &files {
                uploads.push(UploadedFile::from_path(path).await?);
            }
            let mut session = Session::from_config(&config).await?;
            ensure_documents_dir(session.documents_dir())?;
            session.upload(uploads).await?;
            println!("{}", session.status_line());
            Ok(())
        }
        Commands::Ask {
            question,
            top_k,
            format,
        } => {
            if let Some(top_k) = top_k {
                config.retrieval.top_k = top_k;
                config.validate()?;
            }
            prepare_documents(&config)?;
            let mut session = Session::from_config(&config).await?;
            session.resume().await?;
            let outcome = session.ask(&question).await?;

            match format {
                OutputFormat::Json => {
                    let output = AskOutput::new(&question, &outcome);
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Summary => println!("{}", format_outcome(&outcome)),
                OutputFormat::Full => {
                    println!("{}", format_outcome(&outcome));
                    if let Some(response) = outcome.response() {
                        print_sources(&response.sources);
                    }
                }
            }
            Ok(())
        }
        Commands::Status { format } => {
            let store = SqliteStore::open(&config.database_path()).await?;
            let status = collect_status(&config, &store).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
                OutputFormat::Summary => println!("{}", status.summary()),
                OutputFormat::Full => {
                    println!("{}", status.summary());
                    for document in &status.documents {
                        println!(
                            "  {} | {} chunks | {} chars | {}",
                            document.name, document.chunks, document.chars, document.text_hash
                        );
                    }
                }
            }
            Ok(())
        }
        Commands::List { limit, format } => {
            let store = SqliteStore::open(&config.database_path()).await?;
            let chunks: Vec<ChunkOutput> = store
                .list_chunks(limit)
                .await?
                .into_iter()
                .map(|chunk| ChunkOutput {
                    position: chunk.position,
                    source: chunk.source,
                    sequence: chunk.sequence,
                    chars: chunk.content.chars().count(),
                    content: chunk.content,
                })
                .collect();

            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&chunks)?);
                }
                OutputFormat::Summary => {
                    println!("Found {} chunks:", chunks.len());
                    for chunk in chunks {
                        println!(
                            "  #{} | {} [{}] | {} chars | {}",
                            chunk.position,
                            chunk.source,
                            chunk.sequence,
                            chunk.chars,
                            preview(&chunk.content, 60)
                        );
                    }
                }
                OutputFormat::Full => {
                    for chunk in chunks {
                        println!("Chunk #{}", chunk.position);
                        println!("Source: {} (sequence {})", chunk.source, chunk.sequence);
                        println!("Content:\n{}", chunk.content);
                        println!("---");
                    }
                }
            }
            Ok(())
        }
        Commands::Seed => {
            let dir = config.documents_dir();
            if seed_demo_document(&dir)? {
                println!("Created demo document in {}", dir.display());
            } else {
                println!("Demo document already present in {}", dir.display());
            }
            Ok(())
        }
        Commands::Interactive => interactive(&config).await,
    }
}

fn init_tracing(level: &str, verbose: bool) {
    let default_level = if verbose { "debug" } else { level };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn prepare_documents(config: &AppConfig) -> Result<()> {
    let dir = config.documents_dir();
    ensure_documents_dir(&dir)?;
    if config.session.seed_demo {
        seed_demo_document(&dir)?;
    }
    Ok(())
}

fn preview(content: &str, max_chars: usize) -> String {
    let flat = content.replace('\n', " ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        format!("{}...", flat.chars().take(max_chars).collect::<String>())
    }
}

fn print_sources(sources: &[RetrievedChunk]) {
    if sources.is_empty() {
        return;
    }
    println!("\nSources:");
    for source in sources {
        println!(
            "  {} [{}] distance {:.4}",
            source.source, source.sequence, source.distance
        );
    }
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

async fn interactive(config: &AppConfig) -> Result<()> {
    let mut session = Session::from_config(config).await?;
    if let Err(e) = session.startup(config.session.seed_demo).await {
        tracing::error!("Initial build failed: {e:#}");
    }
    println!("{}", session.status_line());
    println!("{SHELL_HELP}");

    let watcher = DocumentWatcher::new(
        session.documents_dir(),
        Duration::from_millis(config.session.watch_debounce_ms),
    )?;
    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());

    prompt();
    loop {
        tokio::select! {
            line = lines.next() => {
                let Some(line) = line else { break };
                match ShellCommand::parse(&line?) {
                    ShellCommand::Quit => break,
                    ShellCommand::Empty => {}
                    ShellCommand::Help => println!("{SHELL_HELP}"),
                    ShellCommand::Unknown(name) => println!("Unknown command :{name}. Type :help."),
                    ShellCommand::Status => println!("{}", session.status_line()),
                    ShellCommand::Rebuild => match session.rebuild_from_disk().await {
                        Ok(_) => println!("{}", session.status_line()),
                        Err(e) => println!("Rebuild failed: {e:#}"),
                    },
                    ShellCommand::Upload(paths) => {
                        if paths.is_empty() {
                            println!("Usage: :upload <files...>");
                        } else {
                            upload_paths(&mut session, &paths).await;
                        }
                    }
                    ShellCommand::Ask(question) => match session.ask(&question).await {
                        Ok(outcome) => println!("{}", format_outcome(&outcome)),
                        Err(e) => println!("Failed to answer: {e:#}"),
                    },
                }
                prompt();
            }
            Some(changed) = watcher.next_change() => {
                tracing::debug!("Changed paths: {:?}", changed);
                watcher.drain();
                match session.sync_with_disk().await {
                    Ok(true) => {
                        println!("\nDocuments changed. {}", session.status_line());
                        prompt();
                    }
                    Ok(false) => {}
                    Err(e) => tracing::error!("Rebuild after change failed: {e:#}"),
                }
            }
        }
    }
    Ok(())
}

async fn upload_paths(session: &mut Session, paths: &[PathBuf]) {
    let mut uploads = Vec::with_capacity(paths.len());
    for path in paths {
        match UploadedFile::from_path(Path::new(path)).await {
            Ok(file) => uploads.push(file),
            Err(e) => println!("Could not read {}: {e}", path.display()),
        }
    }
    if uploads.is_empty() {
        return;
    }
    match session.upload(uploads).await {
        Ok(_) => println!("{}", session.status_line()),
        Err(e) => println!("Upload failed: {e:#}"),
    }
}
