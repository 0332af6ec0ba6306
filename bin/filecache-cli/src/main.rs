//! Filecache CLI - Admin Command Line Interface
//!
//! This binary provides operator commands against a cache root directory.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use filecache_store::{CacheConfig, FileCache, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "filecache-cli")]
#[command(about = "Filecache Admin CLI")]
#[command(version)]
struct Args {
    /// Cache root directory
    #[arg(short, long, default_value = "./cache")]
    root: PathBuf,

    /// Hash salt; must match the writing application
    #[arg(long, default_value = "file-cache")]
    salt: String,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read a value
    Get {
        /// Entry key
        key: String,
    },
    /// Store a value
    Set {
        /// Entry key
        key: String,
        /// Value literal; stored as text unless --json or --base64 is given
        value: String,
        /// TTL in seconds (0 = never expires; omitted = configured default)
        #[arg(long)]
        ttl: Option<u64>,
        /// Parse the value literal as JSON
        #[arg(long)]
        json: bool,
        /// Decode the value literal from base64 and store raw bytes
        #[arg(long, conflicts_with = "json")]
        base64: bool,
    },
    /// Remove a value entry
    Delete {
        /// Entry key
        key: String,
    },
    /// Probe for a live entry
    Exists {
        /// Entry key
        key: String,
    },
    /// Fetch a file into the cache and print its path
    Fetch {
        /// Entry key
        key: String,
        /// Local path or URL
        source: String,
        /// Content extension
        #[arg(long)]
        ext: Option<String>,
        /// TTL in seconds (0 = never expires; omitted = configured default)
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Print the cached content path for a key
    FilePath {
        /// Entry key
        key: String,
    },
    /// Sweep expired entries
    Gc {
        /// Deletion budget for this sweep
        #[arg(long, default_value_t = 1000)]
        limit: usize,
    },
    /// Remove every entry under the root
    Clear,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_new(&args.log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CacheConfig {
        salt: args.salt.clone(),
        ..CacheConfig::default()
    };
    let cache = FileCache::open(&args.root, config)
        .with_context(|| format!("opening cache at {}", args.root.display()))?;

    match args.command {
        Commands::Get { key } => match cache.get(key.as_bytes())? {
            Some(value) => println!("{}", render(&value)?),
            None => println!("(miss)"),
        },
        Commands::Set {
            key,
            value,
            ttl,
            json,
            base64,
        } => {
            let value = if json {
                let parsed: serde_json::Value =
                    serde_json::from_str(&value).context("parsing value as JSON")?;
                from_json(parsed)
            } else if base64 {
                Value::Bytes(BASE64.decode(value.as_bytes()).context("decoding base64")?)
            } else {
                Value::Text(value)
            };
            cache.set(key.as_bytes(), &value, ttl.map(Duration::from_secs))?;
        }
        Commands::Delete { key } => cache.delete(key.as_bytes()),
        Commands::Exists { key } => {
            if cache.exists(key.as_bytes()) {
                println!("hit");
            } else {
                println!("miss");
                std::process::exit(1);
            }
        }
        Commands::Fetch {
            key,
            source,
            ext,
            ttl,
        } => {
            let path = cache.remember_file(
                key.as_bytes(),
                ttl.map(Duration::from_secs),
                &source,
                ext.as_deref(),
            )?;
            println!("{}", path.display());
        }
        Commands::FilePath { key } => match cache.file_path(key.as_bytes())? {
            Some(path) => println!("{}", path.display()),
            None => {
                println!("(miss)");
                std::process::exit(1);
            }
        },
        Commands::Gc { limit } => {
            let removed = cache.gc(limit);
            println!("removed {removed} entries");
        }
        Commands::Clear => cache.clear(),
    }

    Ok(())
}

/// Render a cached value as JSON for the terminal; byte strings print as
/// base64
fn render(value: &Value) -> Result<String> {
    Ok(serde_json::to_string_pretty(&to_json(value))?)
}

fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(n) => serde_json::Value::from(*n),
        Value::Float(f) => serde_json::Value::from(*f),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(b) => serde_json::Value::String(BASE64.encode(b)),
        Value::List(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
        Value::Map(entries) => serde_json::Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect(),
        ),
    }
}

fn from_json(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::Text(s),
        serde_json::Value::Array(items) => {
            Value::List(items.into_iter().map(from_json).collect())
        }
        serde_json::Value::Object(entries) => Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k, from_json(v)))
                .collect(),
        ),
    }
}
