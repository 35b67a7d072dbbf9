use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use thread_archiver::archive::ArchiveStore;
use thread_archiver::archiver::{resolve_converter, Converter, RunSummary, ThreadArchiver};
use thread_archiver::config::Config;
use thread_archiver::remote::RemoteClient;
use thread_archiver::thread::{ThreadIdentity, ThreadUrl};

#[derive(Parser, Debug)]
#[command(name = "thread-archiver", version)]
#[command(about = "Mirror a thread's posts and media to local storage", long_about = None)]
struct Cli {
    /// URL of the thread to archive
    #[arg(required_unless_present = "update")]
    thread_url: Option<String>,

    /// Output path for the archives
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory containing the converter binary
    #[arg(short, long)]
    binpath: Option<PathBuf>,

    /// Don't convert media files
    #[arg(short = 'n', long)]
    no_convert: bool,

    /// Remove originals once they were converted
    #[arg(short, long)]
    remove_original: bool,

    /// Number of media items processed in parallel
    #[arg(short, long)]
    parallel: Option<usize>,

    /// Update every previously archived thread
    #[arg(short, long, conflicts_with_all = ["thread_url", "post"])]
    update: bool,

    /// Only fetch the media of this post
    #[arg(long)]
    post: Option<u64>,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(output) = &self.output {
            config.output_dir.clone_from(output);
        }
        if let Some(dir) = &self.binpath {
            config.converter_dir = Some(dir.clone());
        }
        if self.no_convert {
            config.convert_media = false;
        }
        if self.remove_original {
            config.remove_original = true;
        }
        if let Some(parallel) = self.parallel {
            config.parallel = parallel;
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing() {
        eprintln!("{e:#}");
        std::process::exit(1);
    }

    tokio::select! {
        result = run(cli) => {
            if let Err(e) = result {
                error!("Fatal error: {e:#}");
                std::process::exit(1);
            }
        }
        () = shutdown_signal() => {
            warn!("Interrupted, stopping");
            std::process::exit(130);
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let mut config = Config::from_env().context("Failed to load configuration")?;
    cli.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let client = RemoteClient::new(&config).context("Failed to initialize HTTP client")?;
    let store = ArchiveStore::new(&config.output_dir);
    let converter = resolve_converter(&config);

    if cli.update {
        return update_all(&config, &client, &store, converter).await;
    }

    let url = cli.thread_url.as_deref().context("No thread url provided")?;
    let ThreadUrl { identity, post_id } =
        ThreadIdentity::parse_url(url).context("Unable to parse the thread url")?;
    let archiver = ThreadArchiver::new(&config, client, &store, identity, converter);

    if let Some(post_id) = cli.post.or(post_id) {
        let outcome = archiver.archive_post(post_id).await?;
        match &outcome.failure {
            None => println!(
                "{}: post {post_id} done ({})",
                archiver.thread(),
                outcome
                    .converted_path
                    .as_ref()
                    .or(outcome.downloaded_path.as_ref())
                    .map_or_else(String::new, |p| p.display().to_string())
            ),
            Some(failure) => println!(
                "{}: post {post_id} failed ({}: {})",
                archiver.thread(),
                failure.kind,
                failure.message
            ),
        }
        return Ok(());
    }

    let summary = archiver.archive().await?;
    print_summary(&summary);
    Ok(())
}

/// Re-run the archiver for every thread found under the output directory.
async fn update_all(
    config: &Config,
    client: &RemoteClient,
    store: &ArchiveStore,
    converter: Option<Arc<dyn Converter>>,
) -> Result<()> {
    info!(root = %store.root().display(), "Running updater");
    let threads = store.archived_threads().await?;
    info!(count = threads.len(), "Found archived threads");

    for thread in threads {
        info!(thread = %thread, "Checking thread");
        let archiver = ThreadArchiver::new(config, client.clone(), store, thread, converter.clone());
        match archiver.archive().await {
            Ok(summary) => print_summary(&summary),
            Err(e) => error!(thread = %archiver.thread(), "Update failed: {e:#}"),
        }
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("{summary}");
    for (post_id, kind, message) in &summary.failed_items {
        println!("  post {post_id}: {kind}: {message}");
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,thread_archiver=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "thread-archiver",
            "https://boards.4chan.org/g/thread/42",
            "-o",
            "/tmp/out",
            "-n",
            "-r",
            "-p",
            "4",
        ])
        .unwrap();

        let mut config = Config {
            convert_media: true,
            ..Config::for_testing()
        };
        cli.apply(&mut config);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert!(!config.convert_media);
        assert!(config.remove_original);
        assert_eq!(config.parallel, 4);
    }

    #[test]
    fn test_update_conflicts_with_thread_url() {
        assert!(Cli::try_parse_from(["thread-archiver", "-u"]).is_ok());
        assert!(Cli::try_parse_from(["thread-archiver"]).is_err());
        assert!(Cli::try_parse_from(["thread-archiver", "-u", "https://x/g/thread/1"]).is_err());
    }
}
