use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use broker_gateway::{BrokerGateway, SimGateway};
use chrono::Utc;
use clap::{Parser, Subcommand};
use market_core::{SymbolCategory, SymbolInfo};
use oracle_client::{DashboardSnapshot, OracleClient, TradingStats};
use tokio::signal::unix::SignalKind;
use tokio::time;
use trade_pilot::config::AgentConfig;
use trade_pilot::metrics::AgentMetrics;
use trade_pilot::notifier::WebhookNotifier;
use trade_pilot::peak_store::PeakStore;
use trade_pilot::pipeline::{prioritized_symbols, SymbolOutcome, TradePipeline};
use trade_pilot::submitter::SubmitOutcome;
use trade_pilot::supervisor::{PositionSupervisor, SupervisorSettings};

const LOOP_ERROR_BACKOFF: Duration = Duration::from_secs(30);
const METRICS_LOG_INTERVAL_CYCLES: u64 = 10;

#[derive(Parser)]
#[command(
    name = "trade-pilot",
    about = "Automated signal and execution agent for a broker terminal",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the scheduler loop
    Run,
    /// Run a single pipeline pass for one symbol, then exit
    Once { symbol: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    let cli = Cli::parse();

    tracing::info!("Starting Trade Pilot");

    let config = match AgentConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e:#}");
            std::process::exit(2);
        }
    };
    tracing::info!("Configuration loaded and validated");
    tracing::info!("  Watchlist: {} symbols", config.symbols.len());
    tracing::info!("  Timeframe: {} x {} bars", config.timeframe, config.bars_window);
    tracing::info!("  Check interval: {}s", config.check_interval_secs);
    tracing::info!("  Min confidence: {:.0}%", config.min_confidence * 100.0);
    tracing::info!("  Max positions: {}", config.max_positions);

    let notifier = WebhookNotifier::new(config.notify_webhook_url.clone());

    let gateway: Arc<dyn BrokerGateway> = if config.paper_trading {
        tracing::info!("Paper trading mode (simulated gateway)");
        Arc::new(paper_gateway(&config))
    } else {
        tracing::error!(
            "No broker terminal binding is configured for live mode. \
             Set PAPER_TRADING=true to run against the simulated gateway."
        );
        notifier
            .send_message("**Fatal**: broker terminal binding unavailable, agent not started")
            .await;
        std::process::exit(3);
    };

    if let Err(e) = gateway.connect().await {
        tracing::error!("Broker connect failed: {e}");
        notifier
            .send_message(&format!("**Fatal**: broker connect failed: {e}"))
            .await;
        std::process::exit(3);
    }
    tracing::info!("Startup check: broker OK");

    // Oracle probe is warn-only; the pipeline degrades to technical-only
    match reqwest::Client::new()
        .get(format!("{}/health", config.oracle_url))
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => {
            tracing::info!("Startup check: prediction oracle OK");
        }
        Ok(resp) => {
            tracing::warn!(
                "Startup check: prediction oracle returned {}, running technical-only",
                resp.status()
            );
        }
        Err(e) => {
            tracing::warn!(
                "Startup check: prediction oracle unreachable ({}), running technical-only",
                e
            );
        }
    }

    let dashboard = OracleClient::new(
        config
            .dashboard_url
            .clone()
            .unwrap_or_else(|| config.oracle_url.clone()),
        Duration::from_secs(10),
    );

    let peaks = PeakStore::load(&config.peak_store_path);
    let mut supervisor = PositionSupervisor::new(SupervisorSettings::from(&config), peaks);
    let mut pipeline = TradePipeline::new(config.clone());
    let mut metrics = AgentMetrics::new(METRICS_LOG_INTERVAL_CYCLES);

    match cli.command {
        Command::Once { symbol } => {
            let report = supervisor.tick(gateway.as_ref()).await?;
            tracing::info!(
                "Supervision: {} open, {} closed, {} modified",
                report.open,
                report.closed.len(),
                report.modified
            );
            let outcome = pipeline.process_symbol(gateway.as_ref(), &symbol).await?;
            tracing::info!("{}: {:?}", symbol, outcome);
            gateway.shutdown().await.ok();
            return Ok(());
        }
        Command::Run => {}
    }

    notifier
        .send_message(&format!(
            "**Trade Pilot started**\n\
             Watchlist: {} symbols | Interval: {}s | Min confidence: {:.0}% | Max positions: {}",
            config.symbols.len(),
            config.check_interval_secs,
            config.min_confidence * 100.0,
            config.max_positions
        ))
        .await;

    tracing::info!(
        "Agent is running. Checking every {}s. Press Ctrl+C to stop.",
        config.check_interval_secs
    );

    let mut interval = time::interval(Duration::from_secs(config.check_interval_secs));
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let shutdown = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
    };
    tokio::pin!(shutdown);

    let mut last_upload = Instant::now();
    let mut last_retrain = Instant::now();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = run_cycle(
                    gateway.as_ref(),
                    &mut pipeline,
                    &mut supervisor,
                    &mut metrics,
                    &notifier,
                    &dashboard,
                )
                .await
                {
                    tracing::error!("Cycle failed: {e:#}, backing off {:?}", LOOP_ERROR_BACKOFF);
                    notifier
                        .send_message(&format!(
                            "**Cycle error** (cycle #{}): {e:#}\n_Agent is still running._",
                            metrics.cycles_run + 1
                        ))
                        .await;
                    time::sleep(LOOP_ERROR_BACKOFF).await;
                }

                if last_upload.elapsed() >= Duration::from_secs(pipeline.config().upload_interval_secs) {
                    pipeline.upload_training_data(gateway.as_ref()).await;
                    last_upload = Instant::now();
                }
                if last_retrain.elapsed() >= Duration::from_secs(pipeline.config().retrain_interval_secs) {
                    pipeline.trigger_retraining().await;
                    last_retrain = Instant::now();
                }

                let heartbeat = pipeline.config().heartbeat_interval_cycles;
                if heartbeat > 0 && metrics.cycles_run > 0 && metrics.cycles_run % heartbeat == 0 {
                    let open = gateway
                        .positions_open()
                        .await
                        .map(|p| p.len())
                        .unwrap_or(0);
                    notifier
                        .send_message(&format!(
                            "**Heartbeat** | Cycle #{} | {} submitted, {} filled, {} open | Last cycle: {}ms",
                            metrics.cycles_run,
                            metrics.orders_submitted,
                            metrics.orders_filled,
                            open,
                            metrics.last_cycle_duration_ms,
                        ))
                        .await;
                }
            }
            _ = &mut shutdown => {
                break;
            }
        }
    }

    tracing::info!("Shutting down after {} cycles", metrics.cycles_run);
    notifier
        .send_message(&format!(
            "**Trade Pilot stopped** after {} cycles (pnl {:.2})",
            metrics.cycles_run, metrics.total_pnl
        ))
        .await;
    gateway.shutdown().await.ok();
    Ok(())
}

/// One scheduler tick: supervise open positions first so entry caps see
/// fresh state, then walk the watchlist in category priority order.
async fn run_cycle(
    gateway: &dyn BrokerGateway,
    pipeline: &mut TradePipeline,
    supervisor: &mut PositionSupervisor,
    metrics: &mut AgentMetrics,
    notifier: &WebhookNotifier,
    dashboard: &OracleClient,
) -> Result<()> {
    let timer = AgentMetrics::start_timer();

    let report = supervisor.tick(gateway).await?;
    metrics.supervision_errors += report.errors;
    for closed in &report.closed {
        metrics.record_close(closed.reason, closed.profit);
        notifier
            .send_message(&format!(
                "**Closed** #{} {}: {} (profit {:.2})",
                closed.ticket,
                closed.symbol,
                closed.reason.label(),
                closed.profit
            ))
            .await;
    }

    for symbol in prioritized_symbols(&pipeline.config().symbols.clone()) {
        // Each symbol is its own failure domain
        match pipeline.process_symbol(gateway, &symbol).await {
            Ok(SymbolOutcome::Submitted(outcome)) => {
                metrics.signals_generated += 1;
                metrics.orders_submitted += 1;
                match outcome {
                    SubmitOutcome::Filled { ticket, price, fill_mode } => {
                        metrics.orders_filled += 1;
                        notifier
                            .send_message(&format!(
                                "**Filled** {} @ {} (ticket #{ticket}, {fill_mode})",
                                symbol, price
                            ))
                            .await;
                    }
                    SubmitOutcome::Rejected { .. } => {
                        metrics.orders_rejected += 1;
                    }
                }
            }
            Ok(SymbolOutcome::Rejected(_)) => {
                metrics.plans_rejected += 1;
            }
            Ok(SymbolOutcome::NoSignal) => {
                metrics.signals_gated += 1;
            }
            Ok(SymbolOutcome::PositionOpen) => {}
            Err(e) => {
                tracing::warn!("{}: skipped this tick ({e:#})", symbol);
            }
        }
    }

    let snapshot = DashboardSnapshot {
        positions: gateway.positions_open().await.map(|p| p.len()).unwrap_or(0),
        signals: metrics.signals_generated,
        trading_stats: TradingStats {
            cycles: metrics.cycles_run,
            orders_filled: metrics.orders_filled,
            total_pnl: metrics.total_pnl,
        },
        timestamp: Utc::now(),
    };
    if let Err(e) = dashboard.sync_dashboard(&snapshot).await {
        tracing::debug!("Dashboard sync failed: {}", e);
    }

    metrics.record_cycle(timer);
    Ok(())
}

/// Simulated gateway seeded with a deterministic random walk per symbol.
fn paper_gateway(config: &AgentConfig) -> SimGateway {
    let gateway = SimGateway::new();
    for symbol in &config.symbols {
        let (info, start_price) = paper_symbol(symbol);
        let mut hasher = DefaultHasher::new();
        symbol.hash(&mut hasher);
        gateway.seed_random_walk(info, config.bars_window + 50, start_price, hasher.finish());
    }
    gateway
}

fn paper_symbol(symbol: &str) -> (SymbolInfo, f64) {
    let category = SymbolCategory::classify(symbol);
    let lot = category.defaults().lot;
    let (digits, point, start_price) = match category {
        SymbolCategory::BoomCrash => {
            if symbol.to_ascii_uppercase().contains("BOOM") {
                (2, 0.01, 1000.0)
            } else {
                (2, 0.01, 5000.0)
            }
        }
        SymbolCategory::SyntheticVolatility => (2, 0.01, 2000.0),
        SymbolCategory::Metals => (2, 0.01, 2400.0),
        SymbolCategory::Fx => (5, 0.00001, 1.10),
        SymbolCategory::Crypto => (2, 0.01, 30000.0),
        SymbolCategory::Other => (2, 0.01, 100.0),
    };
    let info = SymbolInfo {
        name: symbol.to_string(),
        digits,
        point,
        min_volume: lot,
        max_volume: 100.0,
        volume_step: lot,
        fill_mode_bitmask: 0b111,
        stops_level_points: 10,
    };
    (info, start_price)
}
