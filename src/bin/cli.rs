//! layerstore CLI
//!
//! Command-line interface for a local layerstore registry.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use layerstore::{Config, CreateOptions, Digest, Registry, Result, StoreError};
use serde_json::Value;
use tracing_subscriber::{fmt, EnvFilter};

/// layerstore CLI
#[derive(Parser, Debug)]
#[command(name = "layerstore")]
#[command(about = "Local content-addressed model registry")]
#[command(version)]
struct Args {
    /// Registry root directory
    #[arg(short, long, env = "LAYERSTORE_ROOT", default_value = "./layerstore_data")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a file as a blob and print its digest
    Put {
        /// File to store
        file: PathBuf,
    },

    /// Create a model from stored blobs
    Create {
        /// Model name
        name: String,

        /// Weight file as NAME=DIGEST (repeatable)
        #[arg(short, long = "file", value_parser = parse_file)]
        files: Vec<(String, Digest)>,

        /// Base model to inherit from
        #[arg(long)]
        from: Option<String>,

        /// Prompt template
        #[arg(long)]
        template: Option<String>,

        /// System prompt
        #[arg(long)]
        system: Option<String>,

        /// License text (repeatable)
        #[arg(long)]
        license: Vec<String>,

        /// Parameter as KEY=VALUE, VALUE parsed as JSON when possible (repeatable)
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
    },

    /// Delete a model and reclaim unreferenced blobs
    Rm {
        /// Model name
        name: String,
    },

    /// Copy a model to a new name
    Cp {
        /// Source model
        src: String,

        /// Destination model
        dst: String,
    },

    /// List committed models
    Ls {
        /// Name pattern with * and ? wildcards
        #[arg(default_value = "*/*/*:*")]
        pattern: String,
    },

    /// Print a model's manifest as JSON
    Show {
        /// Model name
        name: String,
    },

    /// Write a blob to stdout
    Cat {
        /// Blob digest
        digest: Digest,
    },

    /// Reclaim blobs no manifest references
    Prune,

    /// Report missing, unreadable and corrupt entries
    Check {
        /// Re-hash every blob
        #[arg(long)]
        verify: bool,
    },
}

fn parse_file(s: &str) -> std::result::Result<(String, Digest), String> {
    let (name, digest) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=DIGEST, got {s:?}"))?;
    let digest = digest.parse::<Digest>().map_err(|e| e.to_string())?;
    Ok((name.to_string(), digest))
}

fn parse_param(s: &str) -> std::result::Result<(String, Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,layerstore=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{e}");
        process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    // Blobs from `put` wait unreferenced until a later `create`
    let config = Config::builder()
        .root_dir(&args.root)
        .prune_on_open(false)
        .build();
    let registry = Registry::open(config)?;

    match args.command {
        Commands::Put { file } => {
            let digest = registry.blobs().put(BufReader::new(File::open(file)?))?;
            println!("{digest}");
        }

        Commands::Create {
            name,
            files,
            from,
            template,
            system,
            license,
            params,
        } => {
            let files: BTreeMap<_, _> = files.into_iter().collect();
            let options = CreateOptions {
                from,
                template,
                system,
                license,
                parameters: params.into_iter().collect(),
                ..CreateOptions::default()
            };

            let created = registry.create_model(&name, &files, &options)?;
            println!("{} {}", created.name.display_shortest(), created.digest);
        }

        Commands::Rm { name } => {
            let report = registry.delete_model(&name)?;
            println!("deleted {}", report.name.display_shortest());
            for digest in &report.sweep.removed {
                println!("removed {digest}");
            }
            if let Some(why) = &report.sweep.aborted {
                eprintln!("warning: blob sweep aborted: {why}");
            }
        }

        Commands::Cp { src, dst } => {
            let digest = registry.copy_model(&src, &dst)?;
            println!("{digest}");
        }

        Commands::Ls { pattern } => {
            for name in registry.list_manifests(&pattern)? {
                println!("{}", name.display_shortest());
            }
        }

        Commands::Show { name } => {
            let info = registry.show_model(&name)?;
            println!("{}", serde_json::to_string_pretty(&info.manifest)?);
        }

        Commands::Cat { digest } => {
            let mut blob = registry.resolve_blob(&digest)?;
            io::copy(&mut blob, &mut io::stdout().lock())?;
        }

        Commands::Prune => {
            let report = registry.prune();
            println!(
                "removed {} blobs ({} bytes), {} pinned",
                report.removed.len(),
                report.reclaimed_bytes,
                report.pinned
            );
            if let Some(why) = report.aborted {
                return Err(StoreError::Corruption(why));
            }
        }

        Commands::Check { verify } => {
            let report = registry.check(verify)?;
            println!("{} manifests, {} blobs", report.manifests, report.blobs);
            for (name, digest) in &report.missing {
                println!("missing {digest} (referenced by {name})");
            }
            for (name, why) in &report.unreadable {
                println!("unreadable {name}: {why}");
            }
            for digest in &report.corrupt_blobs {
                println!("corrupt {digest}");
            }
            if !report.is_healthy() {
                return Err(StoreError::Corruption("registry check failed".to_string()));
            }
        }
    }

    Ok(())
}
