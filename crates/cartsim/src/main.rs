//! cartsim - synthetic shopping-cart telemetry
//!
//! Usage:
//!   cartsim run
//!   cartsim run --exporter otlp,console --cycles 10 --trace-interval 1s
//!   cartsim run --signals metrics --metrics-listen 127.0.0.1:9464
//!   cartsim catalog
//!   cartsim bench --cycles 10000

use cartsim::config::{
    DEFAULT_METRICS_LISTEN, DEFAULT_OTLP_ENDPOINT, DEFAULT_ZIPKIN_ENDPOINT, parse_duration_ms,
};
use cartsim::metrics::{self, MetricsError};
use cartsim::{
    ConsoleFormat, ExporterKind, Exporters, GeneratorConfig, HttpExportConfig, LogGenerator,
    ResourceInfo, RunSummary, Scheduler, ShopMetrics, Signal, init_tracing,
};
use cartsim_core::{
    DurationModel, FinishedSpan, FixedPolicy, RandomPolicy, SimulationEngine, SinkSet, SpanSink,
    catalog,
};
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const EXPORTER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "cartsim")]
#[command(version)]
#[command(about = "Synthetic shopping-cart traces, logs and metrics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate telemetry until interrupted or the cycle budget is spent
    Run(RunArgs),

    /// Print the operation catalog
    Catalog,

    /// Measure engine throughput with zero-delay operations
    Bench {
        /// Number of cycles to run
        #[arg(short, long, default_value = "10000")]
        cycles: u64,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Signals to generate (comma-separated)
    #[arg(long, value_delimiter = ',', default_value = "traces,logs,metrics")]
    signals: Vec<Signal>,

    /// Span exporters (comma-separated)
    #[arg(short, long, value_delimiter = ',', default_value = "console")]
    exporter: Vec<ExporterKind>,

    /// Console span format
    #[arg(long, default_value = "json")]
    console_format: ConsoleFormat,

    /// Interval between trace cycles (e.g. 500ms, 5s, 1m)
    #[arg(long, default_value = "5s", value_parser = parse_duration_ms)]
    trace_interval: u64,

    /// Stop after this many trace cycles
    #[arg(short, long)]
    cycles: Option<u64>,

    /// Interval between log batches
    #[arg(long, default_value = "5s", value_parser = parse_duration_ms)]
    log_interval: u64,

    /// Upper bound (exclusive) of log records per batch
    #[arg(long, default_value = "10")]
    max_logs: u32,

    /// Interval between metric updates
    #[arg(long, default_value = "1s", value_parser = parse_duration_ms)]
    metric_interval: u64,

    #[arg(long, default_value = "cartsim")]
    service_name: String,

    #[arg(long, default_value = "0.0.1")]
    service_version: String,

    #[arg(long, default_value = DEFAULT_OTLP_ENDPOINT)]
    otlp_endpoint: String,

    #[arg(long, default_value = DEFAULT_ZIPKIN_ENDPOINT)]
    zipkin_endpoint: String,

    /// Spans per HTTP export request
    #[arg(long, default_value = "64")]
    batch_size: usize,

    /// Flush partial HTTP batches after this long
    #[arg(long, default_value = "1s", value_parser = parse_duration_ms)]
    flush_interval: u64,

    #[arg(long, default_value = "3")]
    max_retries: u32,

    /// Spans buffered per HTTP exporter before dropping
    #[arg(long, default_value = "10000")]
    queue_capacity: usize,

    /// Metrics endpoint listen address
    #[arg(long, default_value = DEFAULT_METRICS_LISTEN)]
    metrics_listen: String,

    /// Seed for reproducible outcomes, logs and metrics
    #[arg(long)]
    seed: Option<u64>,

    /// Draw durations from a log-normal distribution with this sigma
    #[arg(long)]
    lognormal_sigma: Option<f64>,

    /// Default log filter; RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl RunArgs {
    fn into_config(self) -> GeneratorConfig {
        let defaults = GeneratorConfig::default();
        GeneratorConfig {
            service_name: self.service_name,
            service_version: self.service_version,
            signals: self.signals,
            trace_interval_ms: self.trace_interval,
            cycles: self.cycles,
            log_interval_ms: self.log_interval,
            max_logs_per_tick: self.max_logs,
            metric_interval_ms: self.metric_interval,
            exporters: self.exporter,
            console_format: self.console_format,
            otlp_endpoint: self.otlp_endpoint,
            zipkin_endpoint: self.zipkin_endpoint,
            http: HttpExportConfig {
                batch_size: self.batch_size,
                flush_interval_ms: self.flush_interval,
                max_retries: self.max_retries,
                channel_capacity: self.queue_capacity,
                ..defaults.http
            },
            metrics_listen: self.metrics_listen,
            seed: self.seed,
            duration_model: self
                .lognormal_sigma
                .map(|sigma| DurationModel::LogNormal { sigma })
                .unwrap_or_default(),
            log_level: self.log_level,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_generate(args.into_config()).await,
        Commands::Catalog => {
            run_catalog();
            Ok(())
        }
        Commands::Bench { cycles } => {
            run_bench(cycles).await;
            Ok(())
        }
    }
}

async fn run_generate(config: GeneratorConfig) -> Result<(), BoxError> {
    config.validate()?;
    init_tracing(&config.log_level)?;

    let resource = ResourceInfo::from_config(&config);
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, shutting down");
                cancel.cancel();
            }
        }
    });

    let mut scheduler = Scheduler::new(&config);

    let exporters = if config.enabled(Signal::Traces) {
        let exporters = Exporters::from_config(&config, &resource);
        let policy = match config.seed {
            Some(seed) => RandomPolicy::seeded(seed),
            None => RandomPolicy::new(),
        }
        .with_duration_model(config.duration_model);
        let engine =
            SimulationEngine::new(SinkSet::new(exporters.sinks())).with_policy(Arc::new(policy));
        scheduler = scheduler.with_engine(engine);
        Some(exporters)
    } else {
        None
    };

    if config.enabled(Signal::Logs) {
        scheduler = scheduler.with_logs(Arc::new(LogGenerator::stdout(
            resource.clone(),
            config.max_logs_per_tick,
            config.seed,
        )));
    }

    let server = if config.enabled(Signal::Metrics) {
        let shop = Arc::new(ShopMetrics::new(config.seed)?);
        let addr = config.metrics_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| MetricsError::Bind { addr, source })?;
        scheduler = scheduler.with_metrics(shop.clone());
        Some(tokio::spawn(metrics::serve_on(listener, shop, cancel.clone())))
    } else {
        None
    };

    info!(
        service = %config.service_name,
        signals = ?config.signals,
        exporters = ?config.exporters,
        "cartsim started"
    );

    let summary = scheduler.run(cancel.clone()).await;
    cancel.cancel();

    if let Some(exporters) = exporters {
        let stats = exporters.stats();
        exporters.shutdown(EXPORTER_SHUTDOWN_TIMEOUT).await;
        for (name, stats) in stats {
            info!(
                exporter = %name,
                sent = stats.sent.load(Ordering::Relaxed),
                failed = stats.failed.load(Ordering::Relaxed),
                dropped = stats.dropped.load(Ordering::Relaxed),
                "Exporter totals"
            );
        }
    }

    if let Some(server) = server {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(error = %err, "Metrics endpoint failed"),
            Err(err) => error!(error = %err, "Metrics endpoint task aborted"),
        }
    }

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    eprintln!("\n╔══════════════════════════════════════════════════════════════╗");
    eprintln!("║                     Generation Complete                      ║");
    eprintln!("╠══════════════════════════════════════════════════════════════╣");
    eprintln!("║ Trace cycles: {:46} ║", summary.cycles);
    if let Some(engine) = summary.engine {
        eprintln!("║ Spans exported: {:44} ║", engine.spans_exported);
        eprintln!("║ Spans OK / ERROR: {:>20} / {:<19} ║", engine.spans_ok, engine.spans_error);
    }
    eprintln!("║ Log records: {:47} ║", summary.log_records);
    eprintln!("║ Metric ticks: {:46} ║", summary.metric_ticks);
    eprintln!("╚══════════════════════════════════════════════════════════════╝");
}

fn run_catalog() {
    let catalog = catalog::global();

    println!("\n╔════╦═══════════════════════════════╦══════════╦═════════════╦══════════╗");
    println!("║ Id ║ Operation                     ║ Kind     ║ Reliability ║ Typical  ║");
    println!("╠════╬═══════════════════════════════╬══════════╬═════════════╬══════════╣");
    for op in catalog.operations() {
        println!(
            "║ {:2} ║ {:29} ║ {:8} ║ {:11.2} ║ {:6}ms ║",
            op.id,
            op.name,
            op.kind.as_str(),
            op.reliability,
            op.typical_duration_ms
        );
    }
    println!("╚════╩═══════════════════════════════╩══════════╩═════════════╩══════════╝");
}

#[derive(Default)]
struct CountingSink {
    spans: AtomicU64,
}

impl SpanSink for CountingSink {
    fn name(&self) -> &str {
        "counter"
    }

    fn export(&self, _span: Arc<FinishedSpan>) {
        self.spans.fetch_add(1, Ordering::Relaxed);
    }
}

async fn run_bench(cycles: u64) {
    eprintln!("╔══════════════════════════════════════════════════════════════╗");
    eprintln!("║           CARTSIM Engine Benchmark                           ║");
    eprintln!("╠══════════════════════════════════════════════════════════════╣");
    eprintln!("║ Cycles: {:52} ║", cycles);
    eprintln!("╚══════════════════════════════════════════════════════════════╝");

    let counter = Arc::new(CountingSink::default());
    let engine = SimulationEngine::new(SinkSet::new(vec![counter.clone() as Arc<dyn SpanSink>]))
        .with_policy(Arc::new(FixedPolicy::instant_ok()));

    let start = Instant::now();
    let handles: Vec<_> = (0..cycles).map(|_| engine.run_cycle()).collect();
    let mut failed = 0usize;
    for handle in handles {
        let report = handle.join().await;
        failed += report.failed.len() + report.panicked;
    }
    let elapsed = start.elapsed();

    let spans = counter.spans.load(Ordering::Relaxed);
    let spans_per_sec = spans as f64 / elapsed.as_secs_f64().max(f64::EPSILON);

    eprintln!("\n╔══════════════════════════════════════════════════════════════╗");
    eprintln!("║                    Benchmark Results                         ║");
    eprintln!("╠══════════════════════════════════════════════════════════════╣");
    eprintln!("║ Spans exported: {:44} ║", spans);
    eprintln!("║ Failed tasks: {:46} ║", failed);
    eprintln!("║ Elapsed: {:48.3}s ║", elapsed.as_secs_f64());
    eprintln!("║ Throughput: {:40.0} spans/s ║", spans_per_sec);
    eprintln!("╚══════════════════════════════════════════════════════════════╝");
}
