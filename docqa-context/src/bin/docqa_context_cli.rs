use clap::Parser;
use docqa_context::splitter::{
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_SEPARATORS, TextSplitter,
};
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use std::process;

/// A CLI tool to split a text file into overlapping chunks and print them as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input text file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Source name recorded on every chunk. Defaults to the input file name.
    #[arg(short, long)]
    source: Option<String>,

    /// Maximum length for each chunk, in characters.
    #[arg(short = 'c', long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Number of characters shared by consecutive chunks.
    #[arg(short = 'o', long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,

    /// Comma-separated list of separators, most significant first.
    /// Defaults to paragraph, line, space and character boundaries.
    #[arg(short, long, value_delimiter = ',')]
    separators: Option<Vec<String>>,

    /// Treat separators as regular expressions instead of literal strings.
    #[arg(long)]
    regex: bool,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let file_content = if let Some(input_path) = &args.input {
        fs::read_to_string(input_path)?
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    };

    let source = args.source.clone().unwrap_or_else(|| {
        args.input
            .as_deref()
            .and_then(|p| Path::new(p).file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "stdin".to_string())
    });

    let separators: Vec<String> = match args.separators {
        Some(s) => s,
        None => DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
    };

    let splitter =
        TextSplitter::with_separators(args.chunk_size, args.chunk_overlap, &separators, args.regex)?;
    let chunks = splitter.split_document(&source, &file_content);

    println!("{}", serde_json::to_string_pretty(&chunks)?);
    Ok(())
}
