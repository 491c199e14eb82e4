use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use newsletter_ingest::config::Config;
use newsletter_ingest::feed::Fetcher;
use newsletter_ingest::ingest::{self, ArticleSink, JsonLinesSink};
use newsletter_ingest::registry::{DatabaseError, SqliteRegistry, SubscriptionRegistry};

/// Get the config directory path (~/.config/newsletter-ingest/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    let config_dir = PathBuf::from(home)
        .join(".config")
        .join("newsletter-ingest");
    Ok(config_dir)
}

#[derive(Parser, Debug)]
#[command(
    name = "newsletter-ingest",
    version,
    about = "Poll RSS/Atom subscriptions and emit newly published articles"
)]
struct Args {
    /// Config file (default: ~/.config/newsletter-ingest/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Registry database, overriding the config file
    #[arg(long, value_name = "FILE", global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch and classify a feed, then register it
    Subscribe {
        url: String,
        /// List the subscription in the public directory
        #[arg(long)]
        discoverable: bool,
    },
    /// List all subscriptions
    List,
    /// Resume polling a subscription
    Enable { id: String },
    /// Stop polling a subscription
    Disable { id: String },
    /// Ingest every enabled subscription, writing new articles to stdout as JSON lines
    Poll {
        /// Keep polling on the configured interval until Ctrl-C
        #[arg(long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries article output
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = match &args.database {
        Some(path) => path.clone(),
        None => {
            if config.database_path.is_none() && !config_dir.exists() {
                std::fs::create_dir_all(&config_dir)
                    .context("Failed to create config directory")?;
            }
            config.database_path_or(&config_dir)
        }
    };
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;

    let registry = match SqliteRegistry::open(db_path_str).await {
        Ok(registry) => registry.with_page_size(config.registry_page_size),
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: {}", DatabaseError::InstanceLocked);
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    let fetcher = Fetcher::from_config(&config).context("Failed to build HTTP client")?;

    match args.command {
        Command::Subscribe { url, discoverable } => {
            let subscription = ingest::subscribe(&registry, &fetcher, &url, discoverable).await?;
            println!(
                "{}\t{}\t{}",
                subscription.id, subscription.format, subscription.url
            );
        }
        Command::List => {
            let subscriptions = registry
                .list_subscriptions()
                .await
                .context("Failed to list subscriptions")?;
            for sub in subscriptions {
                let state = if sub.enabled { "enabled" } else { "disabled" };
                println!("{}\t{}\t{}\t{}", sub.id, sub.format, state, sub.url);
            }
        }
        Command::Enable { id } => set_enabled(&registry, &id, true).await?,
        Command::Disable { id } => set_enabled(&registry, &id, false).await?,
        Command::Poll { watch } => {
            let registry: Arc<dyn SubscriptionRegistry> = Arc::new(registry);
            let sink: Arc<dyn ArticleSink> = Arc::new(JsonLinesSink::stdout());
            let concurrency = config.max_concurrent_fetches;

            if watch {
                let interval = Duration::from_secs(config.poll_interval_minutes.max(1) * 60);
                tracing::info!(interval_secs = interval.as_secs(), "Polling until Ctrl-C");
                ingest::run_periodic(registry, fetcher, sink, concurrency, interval, async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                    }
                })
                .await;
            } else {
                let reports = ingest::poll_all(registry, fetcher, sink, concurrency).await?;
                let failed = reports.iter().filter(|r| r.result.is_err()).count();
                if failed > 0 {
                    eprintln!("{} of {} subscriptions failed", failed, reports.len());
                }
            }
        }
    }

    Ok(())
}

async fn set_enabled(registry: &SqliteRegistry, id: &str, enabled: bool) -> Result<()> {
    if !registry.set_enabled(id, enabled).await? {
        anyhow::bail!("No subscription with id {}", id);
    }
    println!("{} {}", if enabled { "Enabled" } else { "Disabled" }, id);
    Ok(())
}
