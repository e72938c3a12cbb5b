use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;

use feedmirror::config::Config;
use feedmirror::feed::{FeedEntry, FeedMirror, ParseResult};
use feedmirror::util::strip_control_chars;

/// Get the default config file path (~/.config/feedmirror/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("feedmirror")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(
    name = "feedmirror",
    version,
    about = "Fetch a Substack RSS feed and print sanitized entries"
)]
struct Args {
    /// Config file (default: ~/.config/feedmirror/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Feed URL, overriding the config file and SUBSTACK_FEED_URL
    #[arg(long, value_name = "URL")]
    feed_url: Option<String>,

    /// Parse a local RSS document instead of fetching
    #[arg(long, value_name = "FILE", conflicts_with = "feed_url")]
    input: Option<PathBuf>,

    /// Print entries as a JSON array
    #[arg(long)]
    json: bool,

    /// Fetch timeout in milliseconds
    #[arg(long, value_name = "N")]
    timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so --json output stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?
        .with_env_overrides();

    if let Some(url) = args.feed_url {
        config.feed_url = Some(url);
    }
    if let Some(ms) = args.timeout_ms {
        config.fetch_timeout_ms = ms;
    }

    let mirror = FeedMirror::new(config).context("Failed to create HTTP client")?;

    let ParseResult { entries, skipped } = match args.input {
        Some(path) => {
            let xml = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            mirror
                .entries_from_xml(&xml)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        }
        None => mirror
            .try_fetch_entries()
            .await
            .context("Failed to mirror feed")?,
    };

    if skipped > 0 {
        eprintln!("Skipped {} item(s) with neither title nor link", skipped);
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if args.json {
        serde_json::to_writer_pretty(&mut out, &entries).context("Failed to write JSON")?;
        writeln!(out)?;
    } else {
        for entry in &entries {
            write_entry(&mut out, entry)?;
        }
    }

    Ok(())
}

fn write_entry(out: &mut impl Write, entry: &FeedEntry) -> std::io::Result<()> {
    let date = entry
        .published_at
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "----------".to_string());
    let title = if entry.title.is_empty() {
        "(untitled)"
    } else {
        entry.title.as_str()
    };

    writeln!(out, "{}  {}", date, strip_control_chars(title))?;
    if !entry.link.is_empty() {
        writeln!(out, "            {}", strip_control_chars(&entry.link))?;
    }
    if let Some(excerpt) = &entry.excerpt {
        writeln!(out, "            {}", strip_control_chars(excerpt))?;
    }
    writeln!(out)
}
