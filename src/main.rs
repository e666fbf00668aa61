//! fa - Command-line front end for the fileaccess engine.
//!
//! Usage:
//!   fa read Cache/a.txt               Print a file
//!   fa write Cache/a.txt hello        Replace a file's content
//!   fa ls Documents --long            List a directory
//!   fa hash Documents/f -a SHA-256    Digest a file
//!   fa fetch URL Cache/file.bin       Download, printing events as JSON lines
//!   fa --help                         Show help

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result, bail, eyre};
use indexmap::IndexMap;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use fileaccess_core::{AccessConfig, Encoding, FileStat, RootTable};
use fileaccess_ops::{ChannelSink, FetchOptions, FileAccess, TransferEvent, TransferHandle};

#[derive(Parser)]
#[command(
    name = "fa",
    version,
    about = "Sandboxed file access with cancellable, progress-reporting transfers",
    long_about = "fa runs file operations against logical paths such as `Cache/a.txt`.\n\n\
                  Every path must resolve inside one of the symbolic roots \
                  (MainBundle, Documents, Cache, Library, Database, External)."
)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Place every root under this directory instead of the platform locations
    #[arg(short, long, global = true)]
    base: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a file's content
    Read {
        path: String,

        /// Print base64 instead of UTF-8 text
        #[arg(long)]
        base64: bool,

        /// Start offset for a partial read
        #[arg(long, requires = "length")]
        offset: Option<u64>,

        /// Number of bytes for a partial read
        #[arg(long)]
        length: Option<usize>,
    },

    /// Replace a file's content
    Write {
        path: String,
        data: String,

        /// Interpret DATA as base64
        #[arg(long)]
        base64: bool,
    },

    /// Append to a file
    Append {
        path: String,
        data: String,

        /// Interpret DATA as base64
        #[arg(long)]
        base64: bool,
    },

    /// List a directory
    Ls {
        path: String,

        /// Show sizes and kinds
        #[arg(short, long)]
        long: bool,
    },

    /// Show metadata as JSON
    Stat { path: String },

    /// Create a directory and its parents
    Mkdir { path: String },

    /// Remove a file or directory
    Rm {
        path: String,

        /// Fail if the path does not exist
        #[arg(long)]
        strict: bool,
    },

    /// Copy a file or directory
    Cp { source: String, destination: String },

    /// Move a file or directory
    Mv {
        source: String,
        destination: String,

        /// Replace an existing destination
        #[arg(short, long)]
        force: bool,
    },

    /// Print a file's hex digest
    Hash {
        path: String,

        /// MD5, SHA-1, SHA-224, SHA-256, SHA-384, SHA-512 or BLAKE3
        #[arg(short, long, default_value = "SHA-256")]
        algorithm: String,
    },

    /// Append one file to another
    Concat { source: String, target: String },

    /// Extract a zip archive
    Unzip { source: String, target: String },

    /// Download a URL, printing transfer events as JSON lines
    Fetch {
        url: String,
        destination: String,

        /// HTTP method
        #[arg(short = 'X', long)]
        method: Option<String>,

        /// Request header as NAME:VALUE (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Keep partial output if the transfer fails
        #[arg(long)]
        keep_partial: bool,
    },

    /// Copy a file chunk by chunk, printing transfer events as JSON lines
    Transfer { source: String, destination: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    set_up_logging();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref(), cli.base.as_ref())?;
    let access = FileAccess::new(&config).context("Failed to initialize file access")?;

    match cli.command {
        Command::Read {
            path,
            base64,
            offset,
            length,
        } => {
            let encoding = encoding(base64);
            let text = match (offset, length) {
                (offset, Some(length)) => {
                    access
                        .read_file_chunk(&path, offset.unwrap_or(0), length, encoding)
                        .await?
                }
                _ => access.read_file(&path, encoding).await?,
            };
            print!("{text}");
            if base64 {
                println!();
            }
        }
        Command::Write { path, data, base64 } => {
            access.write_file(&path, &data, encoding(base64)).await?;
        }
        Command::Append { path, data, base64 } => {
            access.append_file(&path, &data, encoding(base64)).await?;
        }
        Command::Ls { path, long } => {
            if long {
                for stat in access.stat_dir(&path).await? {
                    print_stat_line(&stat);
                }
            } else {
                for name in access.ls(&path).await? {
                    println!("{name}");
                }
            }
        }
        Command::Stat { path } => {
            let stat = access.stat(&path).await?;
            println!("{}", serde_json::to_string_pretty(&stat)?);
        }
        Command::Mkdir { path } => {
            let created = access.mkdir(&path).await?;
            println!("{}", created.display());
        }
        Command::Rm { path, strict } => {
            access
                .executor()
                .delete(&path, strict)
                .with_context(|| format!("Failed to remove {path}"))?;
        }
        Command::Cp {
            source,
            destination,
        } => {
            let bytes = access.cp(&source, &destination).await?;
            eprintln!("Copied {}", format_size(bytes));
        }
        Command::Mv {
            source,
            destination,
            force,
        } => {
            access.mv(&source, &destination, force).await?;
        }
        Command::Hash { path, algorithm } => {
            println!("{}", access.hash(&path, &algorithm).await?);
        }
        Command::Concat { source, target } => {
            let bytes = access.concat_files(&source, &target).await?;
            eprintln!("Appended {}", format_size(bytes));
        }
        Command::Unzip { source, target } => {
            let files = access.unzip(&source, &target).await?;
            eprintln!("Extracted {files} file(s)");
        }
        Command::Fetch {
            url,
            destination,
            method,
            headers,
            keep_partial,
        } => {
            let options = FetchOptions {
                method,
                headers: parse_headers(&headers)?,
                body: None,
                keep_partial: keep_partial.then_some(true),
            };
            run_transfer(&access, |access| {
                access.fetch(&url, &destination, options)
            })
            .await?;
        }
        Command::Transfer {
            source,
            destination,
        } => {
            run_transfer(&access, |access| {
                access.copy_with_progress(&source, &destination)
            })
            .await?;
        }
    }

    Ok(())
}

/// Initialize logging from `$RUST_LOG`; logs go to stderr.
fn set_up_logging() {
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let filter_layer = EnvFilter::builder().from_env_lossy();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}

fn load_config(path: Option<&PathBuf>, base: Option<&PathBuf>) -> Result<AccessConfig> {
    let mut config = match path {
        Some(path) => AccessConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => AccessConfig::default(),
    };

    if let Some(base) = base {
        let base = std::path::absolute(base).context("Invalid base directory")?;
        let table = RootTable::rooted_at(&base)?;
        config
            .roots
            .extend(table.iter().map(|(root, dir)| (root, dir.to_path_buf())));
    }

    Ok(config)
}

/// Start a transfer, stream its events to stdout, and fail if it fails.
async fn run_transfer<F>(access: &FileAccess, start: F) -> Result<()>
where
    F: FnOnce(&FileAccess) -> fileaccess_core::Result<TransferHandle>,
{
    let (sink, mut rx) = ChannelSink::new();
    let listener = access.subscribe(Arc::new(sink));
    let handle = start(access)?;
    tracing::debug!(%handle, "transfer started");

    let mut outcome = Err(eyre!("event stream ended before {handle} finished"));
    while let Some(emitted) = rx.recv().await {
        let Some(event) = emitted.to_transfer_event() else {
            continue;
        };
        if event.handle() != handle {
            continue;
        }
        println!(
            "{}",
            serde_json::json!({ "event": emitted.name, "payload": emitted.payload })
        );

        match event {
            TransferEvent::Progress(_) => continue,
            TransferEvent::Complete(complete) => {
                eprintln!("Wrote {}", format_size(complete.written));
                outcome = Ok(());
            }
            TransferEvent::Error(error) => {
                outcome = Err(eyre!("{}: {}", error.kind, error.message));
            }
        }
        break;
    }

    access.unsubscribe(listener);
    outcome
}

fn parse_headers(raw: &[String]) -> Result<IndexMap<String, String>> {
    raw.iter()
        .map(|header| match header.split_once(':') {
            Some((name, value)) => Ok((name.trim().to_string(), value.trim().to_string())),
            None => bail!("Header must be NAME:VALUE, got '{header}'"),
        })
        .collect()
}

fn encoding(base64: bool) -> Encoding {
    if base64 {
        Encoding::Base64
    } else {
        Encoding::Utf8
    }
}

fn print_stat_line(stat: &FileStat) {
    let kind = if stat.is_directory { "d" } else { "-" };
    println!("{kind} {:>10}  {}", format_size(stat.size), stat.filename);
}

fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
