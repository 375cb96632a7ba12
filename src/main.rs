use anyhow::Context;
use api_client::{DerivClient, MarketProvider, TradingProvider};
use clap::{ArgAction, Args, Parser, Subcommand};
use configuration::{Config, load_config};
use core_types::{Shutdown, ShutdownTrigger};
use engine::{ExecutionEngine, RunEnd, Strategy};
use signals::{MarketSignals, SignalError, SignalService, SubscriptionRegistry};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::Instrument;

mod logging;

/// How long closing a leftover position on exit may take. Shutdown has
/// already fired at that point, so nothing else bounds the call.
const CLOSE_ON_EXIT_TIMEOUT: Duration = Duration::from_secs(30);

/// The main entry point for the Deriv trading bot.
#[tokio::main]
async fn main() -> ExitCode {
    // Secrets such as the API token may come from a .env file; it is optional.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    if let Err(e) = logging::init_logger(&cli.log_level, cli.log_text) {
        eprintln!("Error: {e:#}");
        return ExitCode::FAILURE;
    }

    let span = logging::root_span(env!("CARGO_PKG_VERSION"));
    match run(cli).instrument(span).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Bot stopped with an error.");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Runs trading bots and streams market data from the Deriv API.
#[derive(Parser)]
#[command(name = "deriv-bot", author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log in text format, otherwise JSON.
    #[arg(long, global = true, default_value_t = true, action = ArgAction::Set)]
    log_text: bool,

    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot.
    #[command(subcommand)]
    Run(RunCommand),
}

#[derive(Subcommand)]
enum RunCommand {
    /// Stream ticks for a symbol and log them.
    Ticks(TicksArgs),
    /// Run the strategy from the `[strategy]` section of the configuration.
    Strategy,
}

#[derive(Args)]
struct TicksArgs {
    /// The market symbol to stream (e.g., "R_100").
    #[arg(long, default_value = "R_100")]
    symbol: String,
}

// ==============================================================================
// Command Logic
// ==============================================================================

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref()).context("failed to load config")?;

    let trigger = ShutdownTrigger::new();
    let shutdown = trigger.subscribe();
    let signal_watch = tokio::spawn(watch_signals(trigger.clone()));

    let client = DerivClient::connect(&config.deriv)
        .await
        .context("failed to connect to the Deriv API")?;

    let result = match cli.command {
        Commands::Run(RunCommand::Ticks(args)) => stream_ticks(&client, &args.symbol, shutdown).await,
        Commands::Run(RunCommand::Strategy) => run_strategy(&client, &config, shutdown).await,
    };

    client.close().await;
    signal_watch.abort();
    result
}

/// Fires `trigger` on SIGINT or SIGTERM.
async fn watch_signals(trigger: ShutdownTrigger) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM.");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        interrupted = signal::ctrl_c() => {
            if let Err(e) = interrupted {
                tracing::warn!(error = %e, "Failed to listen for Ctrl+C.");
                return;
            }
            tracing::info!("Interrupt received, shutting down.");
        }
        _ = terminate => tracing::info!("Terminate signal received, shutting down."),
    }
    trigger.trigger();
}

fn signal_service(client: &DerivClient) -> SignalService {
    let provider: Arc<dyn MarketProvider> = Arc::new(client.clone());
    SignalService::new(provider, Arc::new(SubscriptionRegistry::new()))
}

/// Logs every tick of `symbol` until the stream ends or the bot is stopped.
async fn stream_ticks(client: &DerivClient, symbol: &str, mut shutdown: Shutdown) -> anyhow::Result<()> {
    let signals = signal_service(client);
    let stream = match signals.subscribe_on_market(symbol, &mut shutdown).await {
        Ok(stream) => stream,
        Err(SignalError::Cancelled { .. }) => return Ok(()),
        Err(e) => return Err(e).context("failed to subscribe to ticks"),
    };

    let mut ticks = stream.subscribe();
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            tick = ticks.recv() => match tick {
                Some(tick) => tracing::info!(
                    symbol,
                    time = %tick.time,
                    quote = %tick.quote,
                    ask = %tick.ask,
                    bid = %tick.bid,
                    "Received tick."
                ),
                None => {
                    tracing::info!(symbol, "Tick stream ended.");
                    break;
                }
            },
        }
    }
    Ok(())
}

/// Executes the configured strategy, closing a leftover position on request.
async fn run_strategy(client: &DerivClient, config: &Config, mut shutdown: Shutdown) -> anyhow::Result<()> {
    let strategy_config = config
        .strategy
        .as_ref()
        .context("`run strategy` needs a [strategy] section in the configuration")?;
    let strategy = Strategy::from_config(strategy_config)?;
    tracing::info!(?strategy, "Strategy loaded.");

    let signals: Arc<dyn MarketSignals> = Arc::new(signal_service(client));
    let trading: Arc<dyn TradingProvider> = Arc::new(client.clone());
    let engine = ExecutionEngine::new(signals, Arc::clone(&trading));

    let outcome = engine
        .execute_strategy(&strategy, &mut shutdown)
        .await
        .context("strategy execution failed")?;
    if outcome.end == RunEnd::Cancelled {
        tracing::info!("Strategy run cancelled.");
    }

    if let Some(contract_id) = outcome.open_contract {
        if strategy_config.close_on_exit {
            tokio::time::timeout(CLOSE_ON_EXIT_TIMEOUT, trading.close_position(contract_id))
                .await
                .map_err(|_| anyhow::anyhow!("timed out after {CLOSE_ON_EXIT_TIMEOUT:?}"))
                .and_then(|closed| closed.map_err(anyhow::Error::from))
                .with_context(|| format!("failed to close contract {contract_id} on exit"))?;
            tracing::info!(%contract_id, "Closed the open position on exit.");
        } else {
            tracing::warn!(
                %contract_id,
                "Position left open. Set strategy.close_on_exit to close it when the bot stops."
            );
        }
    }
    Ok(())
}
