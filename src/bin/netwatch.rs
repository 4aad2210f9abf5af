use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use netwatch::{
    actors::{MonitorReader, MonitorReport, MonitorService},
    config::{Config, InsightConfig, read_config_file},
    discovery::{SystemNeighbors, SystemResolver},
    insights::{InsightEngine, render_report},
    monitors::SystemProbe,
    storage::{MonitorStore, SqliteStore, TimeWindow},
    util::{get_config_path, get_db_path},
};
use tracing::{debug, error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(about = "Monitor the local network and report usage patterns")]
struct Args {
    /// Config file (defaults to $NETWATCH_CONFIG or ./netwatch.json if present)
    #[arg(short, long)]
    file: Option<String>,

    /// Database file, overrides the config and $NETWATCH_DB
    #[arg(long)]
    db: Option<PathBuf>,

    /// Note stored with the monitoring session
    #[arg(short, long)]
    note: Option<String>,

    /// Print the insight report for the stored history and exit
    #[arg(long)]
    insights_only: bool,

    /// Look-back window of the insight report in hours
    #[arg(long)]
    hours: Option<u32>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = filter::Targets::new()
        .with_targets(vec![("netwatch", level), ("sqlx", LevelFilter::WARN)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.file {
        Some(file) => read_config_file(file)?,
        None => {
            let default_path = get_config_path();
            if Path::new(&default_path).exists() {
                read_config_file(&default_path)?
            } else {
                debug!("no config file at {default_path}, using defaults");
                Config::default()
            }
        }
    };

    if let Some(path) = args.db.clone().or_else(get_db_path) {
        config.database.path = path;
    }
    config
        .insights
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid insights configuration: {e}"))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let config = load_config(&args)?;
    let window = TimeWindow::last_hours(args.hours.unwrap_or(config.insights.window_hours));

    let store = SqliteStore::open(&config.database.path)
        .await
        .with_context(|| format!("could not open {}", config.database.path.display()))?;
    let store: Arc<dyn MonitorStore> = Arc::new(store);

    if args.insights_only {
        print_insights(store.clone(), config.insights.clone(), window).await;
        store.close().await?;
        return Ok(());
    }

    let insight_config = config.insights.clone();
    let display_every = config.monitor.tick_interval;
    let probe = Arc::new(SystemProbe::new(config.monitor.interface.clone()));
    let resolve_hostnames = config.discovery.resolve_hostnames;

    let mut service = MonitorService::new(config, store.clone(), probe, Arc::new(SystemNeighbors));
    if let Some(note) = args.note {
        service = service.with_note(note);
    }
    if resolve_hostnames {
        service = service.with_resolver(Arc::new(SystemResolver));
    }

    let handle = service.start().await?;
    info!("monitoring, press Ctrl-C to stop");

    let display = tokio::spawn(display_loop(handle.reader(), display_every));

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("could not listen for Ctrl-C: {e}");
    }
    display.abort();

    let report = handle.shutdown().await?;
    print_session(&report);

    print_insights(store.clone(), insight_config, window).await;
    store.close().await?;

    Ok(())
}

/// One status line per tick, read from a copy of the current snapshot.
async fn display_loop(reader: MonitorReader, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;

        let Some(snapshot) = reader.current_snapshot().await else {
            continue;
        };
        let latency = snapshot
            .avg_latency_ms
            .map(|l| format!("{l:.1} ms"))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "[{}] up {:>8.3} Mbps  down {:>8.3} Mbps  {:>3} devices  latency {:>9}  {}",
            snapshot.timestamp.format("%H:%M:%S"),
            snapshot.upload_mbps,
            snapshot.download_mbps,
            snapshot.active_devices,
            latency,
            snapshot.quality,
        );
    }
}

fn print_session(report: &MonitorReport) {
    let session = &report.session;
    let stats = &report.stats;

    println!();
    println!("Session #{} ({:.0?})", session.id, report.uptime);
    println!("  snapshots:        {}", session.total_snapshots);
    if let Some(devices) = session.avg_device_count {
        println!("  avg devices:      {devices:.1}");
    }
    if let Some(bandwidth) = session.avg_bandwidth_mbps {
        println!("  avg bandwidth:    {bandwidth:.3} Mbps");
    }
    if let Some(latency) = session.avg_latency_ms {
        println!("  avg latency:      {latency:.1} ms");
    }
    println!(
        "  probes:           {} ({} failed)",
        stats.probes, stats.probe_failures
    );
    if session.degraded {
        println!(
            "  degraded:         {} failed flushes, {} snapshots lost",
            stats.flush_failures,
            stats.snapshots_dropped + report.unflushed_snapshots as u64
        );
    }
}

async fn print_insights(store: Arc<dyn MonitorStore>, config: InsightConfig, window: TimeWindow) {
    let engine = InsightEngine::new(store, config);
    match engine.generate_insights(window).await {
        Ok(insights) => println!("{}", render_report(&insights, window)),
        Err(e) => error!("could not generate insights: {e}"),
    }
}
