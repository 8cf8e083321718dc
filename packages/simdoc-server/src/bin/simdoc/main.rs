//! `simdoc` -- service entry points: API server, worker, and operator tools.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;

use simdoc_server::config::AppConfig;
use simdoc_server::http::openapi::ApiDoc;
use simdoc_server::queue::build_queue;
use simdoc_server::service::{HealthService, Services};
use simdoc_server::store::build_store;
use simdoc_server::SimilarityWorker;

mod integration;

#[derive(Parser)]
#[command(name = "simdoc", version, about = "Near-duplicate article clustering service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the API server.
    Serve {
        /// Bind host, overriding `HOST`.
        #[arg(long)]
        host: Option<String>,
        /// Bind port, overriding `PORT`.
        #[arg(long)]
        port: Option<u16>,
        /// Accepted for CLI compatibility; hot reload is not supported.
        #[arg(long)]
        reload: bool,
        /// Enable debug logging.
        #[arg(long)]
        debug: bool,
    },
    /// Create the document-store indices.
    Init,
    /// Probe the backends and print component health.
    Health,
    /// Run the re-score worker until interrupted.
    Worker {
        /// Stop after this many completed jobs.
        #[arg(long)]
        count: Option<u64>,
        /// Queue poll timeout in seconds.
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },
    /// Print the resolved configuration.
    Config,
    /// Write the OpenAPI document.
    Openapi {
        /// Output path; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete every stored document, queued job, and pending hint.
    ClearAll {
        /// Skip the confirmation prompt.
        #[arg(long)]
        force: bool,
    },
    /// Drive a running deployment through the clustering scenarios.
    IntegrationTest {
        /// Base URL of the running API server.
        #[arg(long, default_value = "http://127.0.0.1:8000")]
        base_url: String,
        /// Seconds to wait for each article to settle.
        #[arg(long, default_value_t = 30)]
        timeout: u64,
        /// Directory of extra `ArticleCreate` JSON fixtures to submit.
        #[arg(long)]
        assets_dir: Option<PathBuf>,
    },
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::from_env().context("failed to read configuration")?;

    match cli.command {
        Command::Serve {
            host,
            port,
            reload,
            debug,
        } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if debug {
                config.debug = true;
            }
            init_tracing(config.debug);
            if reload {
                warn!("--reload is accepted for compatibility but hot reload is not supported");
            }
            serve(config).await
        }
        Command::Init => {
            init_tracing(config.debug);
            let store = build_store(&config)?;
            store.ensure_indices().await?;
            println!("indices ready");
            Ok(())
        }
        Command::Health => {
            init_tracing(config.debug);
            health(&config).await
        }
        Command::Worker { count, timeout } => {
            init_tracing(config.debug);
            worker(config, count, Duration::from_secs(timeout)).await
        }
        Command::Config => {
            print_config(&config);
            Ok(())
        }
        Command::Openapi { output } => {
            let document = ApiDoc::openapi()
                .to_pretty_json()
                .context("failed to render OpenAPI document")?;
            match output {
                Some(path) => {
                    std::fs::write(&path, document)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("wrote {}", path.display());
                }
                None => println!("{document}"),
            }
            Ok(())
        }
        Command::ClearAll { force } => {
            init_tracing(config.debug);
            clear_all(&config, force).await
        }
        Command::IntegrationTest {
            base_url,
            timeout,
            assets_dir,
        } => {
            init_tracing(config.debug);
            integration::run(&base_url, Duration::from_secs(timeout), assets_dir.as_deref())
                .await
        }
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let store = build_store(&config)?;
    let queue = build_queue(&config).await?;
    store.ensure_indices().await?;
    let services = Services::build(&config, store, queue)?;

    simdoc_server::http::serve(config, services, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    })
    .await
}

async fn health(config: &AppConfig) -> anyhow::Result<()> {
    let store = build_store(config)?;
    let queue = build_queue(config).await?;
    let depth = queue.queue_len().await.unwrap_or(0);
    let report = HealthService::new(store, queue).check().await;

    println!("status: {:?}", report.status);
    println!("  elasticsearch: {:?}", report.components.elasticsearch);
    println!("  redis: {:?}", report.components.redis);
    println!("  worker: {:?} (queue depth {depth})", report.components.worker);
    Ok(())
}

async fn worker(
    config: AppConfig,
    count: Option<u64>,
    timeout: Duration,
) -> anyhow::Result<()> {
    let store = build_store(&config)?;
    // The worker owns its queue connection: a blocking pop must not stall
    // other queue users.
    let queue = build_queue(&config).await?;
    let worker = Arc::new(SimilarityWorker::new(store, queue, &config.similarity));
    let stop = worker.stop_handle();

    let mut run = {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move { worker.run(count, timeout).await })
    };

    tokio::select! {
        processed = &mut run => {
            let processed = processed?;
            info!(processed, "worker finished");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, stopping after the current job");
            stop.stop();
            let processed = run.await?;
            info!(processed, "worker stopped");
        }
    }
    Ok(())
}

fn print_config(config: &AppConfig) {
    println!("app: {} v{}", config.app_name, config.app_version);
    println!("debug: {}", config.debug);
    println!("bind: {}", config.bind_addr());
    println!("api prefix: {}", config.api_v1_prefix);
    println!("cors origins: {}", config.cors_origins.join(", "));
    println!("store backend: {:?}", config.store_backend);
    println!(
        "elasticsearch: {} (indices {} / {})",
        config.elasticsearch.url(),
        config.elasticsearch.articles_index_full(),
        config.elasticsearch.clusters_index_full()
    );
    println!("queue backend: {:?}", config.queue_backend);
    println!(
        "redis: {}:{}/{} (queue {})",
        config.redis.host, config.redis.port, config.redis.db, config.redis.queue_name
    );
    let sim = &config.similarity;
    println!(
        "similarity: simhash {} bits, minhash {} perms as {}x{} bands, shingle {}, threshold {}",
        sim.simhash_bit_size,
        sim.minhash_permutations,
        sim.minhash_bands,
        sim.minhash_rows_per_band,
        sim.shingle_size,
        sim.similarity_threshold
    );
}

async fn clear_all(config: &AppConfig, force: bool) -> anyhow::Result<()> {
    if !force {
        eprint!(
            "This deletes ALL articles, clusters, queued jobs, and hints. Continue? [y/N] "
        );
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
            bail!("aborted");
        }
    }

    let store = build_store(config)?;
    let queue = build_queue(config).await?;
    store.clear_all().await?;
    let stats = queue.clear_all().await?;
    println!(
        "cleared: queue entries {}, jobs {}, hints {}; indices recreated",
        stats.queue_entries_deleted, stats.jobs_deleted, stats.hints_deleted
    );
    Ok(())
}
