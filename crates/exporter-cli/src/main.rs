mod config;
mod scheduler;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use dashmap::DashMap;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{fmt, EnvFilter};

use exporter_api::state::AppState;
use exporter_core::{
    CheckMode, CheckResult, CheckerConfig, HttpConfig, HttpFetcher, MetricsRegistry, RetryFetcher,
    StreamChecker, StreamConfig,
};

use crate::config::AppConfig;
use crate::scheduler::Scheduler;

/// HLS exporter: periodic stream checks exposed as OpenMetrics.
#[derive(Parser)]
#[command(name = "hls-exporter", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll every configured stream and serve metrics.
    Serve {
        /// Path to TOML config file.
        #[arg(short, long)]
        config: PathBuf,

        /// Listen address (e.g. 0.0.0.0:9090). Overrides config file.
        #[arg(short, long)]
        listen: Option<SocketAddr>,
    },
    /// Run a single check against one master playlist and print the outcome.
    Check {
        /// Master playlist URL.
        url: String,

        /// Segment selection: all, first_last or random.
        #[arg(long, default_value_t = CheckMode::All)]
        mode: CheckMode,

        /// Deadline for the whole check in milliseconds.
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,

        /// Download segment bodies and probe their container.
        #[arg(long, default_value_t = false)]
        validate_content: bool,

        /// Print the full result as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, listen } => run_serve(config, listen).await,
        Commands::Check {
            url,
            mode,
            timeout_ms,
            validate_content,
            json,
        } => {
            fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
                )
                .init();
            let ok = run_check(url, mode, Duration::from_millis(timeout_ms), validate_content, json)
                .await;
            if !ok {
                std::process::exit(1);
            }
        }
    }
}

fn build_checker(
    http: &HttpConfig,
    checker_config: CheckerConfig,
    metrics: Arc<MetricsRegistry>,
) -> Result<StreamChecker, String> {
    let fetcher = HttpFetcher::new(http).map_err(|e| format!("Failed to build HTTP client: {}", e))?;
    let fetcher = RetryFetcher::from_config(fetcher, &checker_config);
    Ok(StreamChecker::new(Arc::new(fetcher), metrics, checker_config))
}

async fn run_serve(config_path: PathBuf, listen_override: Option<SocketAddr>) {
    let app_config = match AppConfig::load(&config_path) {
        Ok(c) => {
            init_tracing(&c.server.log_format);
            tracing::info!(path = %config_path.display(), streams = c.streams.len(), "Loaded config file");
            c
        }
        Err(e) => {
            init_tracing("pretty");
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    let listen = listen_override.unwrap_or(app_config.server.listen);
    let metrics = Arc::new(MetricsRegistry::new());
    let results = Arc::new(DashMap::new());

    let checker = match build_checker(
        &app_config.http_client.to_http_config(),
        app_config.checks.to_checker_config(),
        Arc::clone(&metrics),
    ) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };
    checker.start().await;

    let mut scheduler = Scheduler::new(Arc::clone(&checker), Arc::clone(&results));
    for def in &app_config.streams {
        metrics.register_stream(&def.name);
        scheduler.spawn(def.to_stream_config());
    }
    tracing::info!(count = scheduler.len(), "Stream pollers started");

    let state = AppState::new(metrics)
        .with_results(results)
        .with_paths(&app_config.server.metrics_path, &app_config.server.health_path);

    tracing::info!(%listen, "Starting HLS exporter");
    let served = exporter_api::serve_with_state(listen, state, exporter_api::shutdown_signal()).await;

    tracing::info!("Shutting down, stopping pollers...");
    scheduler.shutdown().await;
    checker.stop().await;

    if let Err(e) = served {
        tracing::error!(error = %e, "Server failed");
        std::process::exit(1);
    }
    tracing::info!("Shutdown complete");
}

async fn run_check(
    url: String,
    mode: CheckMode,
    timeout: Duration,
    validate_content: bool,
    json: bool,
) -> bool {
    let mut stream = StreamConfig::new("cli", &url)
        .with_check_mode(mode)
        .with_timeout(timeout);
    stream.validate_content = validate_content;

    let checker = match build_checker(
        &HttpConfig::default(),
        CheckerConfig::default(),
        Arc::new(MetricsRegistry::new()),
    ) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            return false;
        }
    };

    let spinner = ProgressBar::new_spinner();
    if let Ok(s) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(s);
    }
    spinner.set_message(format!("Checking {}", style(&url).bold()));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = match checker.check(timeout, &stream).await {
        Ok(result) => result,
        Err(failure) => failure.into_result(),
    };
    spinner.finish_and_clear();

    if json {
        match serde_json::to_string_pretty(&result) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("{} {}", style("error:").red().bold(), e),
        }
    } else {
        print_report(&url, mode, &result);
    }
    result.success
}

fn print_report(url: &str, mode: CheckMode, result: &CheckResult) {
    println!(
        "{} {}",
        style("hls-exporter").bold(),
        style(env!("CARGO_PKG_VERSION")).dim()
    );
    println!("  {} {}", style("url:     ").dim(), style(url).bold());
    println!("  {} {}", style("mode:    ").dim(), mode);
    println!(
        "  {} {} ({} failed)",
        style("variants:").dim(),
        result.status.variants_count,
        result.status.failed_variants
    );
    println!(
        "  {} {} checked, {} failed, {:.1}s of media",
        style("segments:").dim(),
        result.segments.checked,
        result.segments.failed,
        result.status.total_duration
    );
    println!(
        "  {} {}ms",
        style("duration:").dim(),
        result.duration.as_millis()
    );
    println!();

    for seg in result.segments.details.iter().filter(|s| !s.success) {
        if let Some(err) = &seg.error {
            println!(
                "  {} {:<18} {}  {}",
                style("FAIL").red().bold(),
                style(err.error_type.as_str()).red(),
                seg.url,
                style(&err.message).dim()
            );
        }
    }

    match &result.error {
        None => println!("{}", style("Stream OK").green().bold()),
        Some(err) => println!(
            "{} {}",
            style("Stream DOWN:").red().bold(),
            err
        ),
    }
}

fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_format {
        "json" => {
            fmt().with_env_filter(filter).json().init();
        }
        _ => {
            fmt().with_env_filter(filter).init();
        }
    }
}
