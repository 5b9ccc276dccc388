//! `clap`-derived CLI surface, `spec.md` §6: `run`, `auth`, `status`,
//! `signals`, `positions`, `stop`.

use crate::app::Application;
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use optrade_core::Symbol;
use optrade_store::Store;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "optrade-bot", version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML config file. Overrides `OPTRADE_CONFIG` and the
    /// `config/default.toml` fallback.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the Orchestrator: connect, authenticate, warm caches, and
    /// run every supervised loop until shutdown.
    Run,
    /// Validate broker credentials without starting any supervised loop.
    Auth,
    /// Report per-loop health, open-position count, and any positions
    /// flagged with `warning_flag`.
    Status,
    /// List signals for one strategy/symbol generated at or after `since`
    /// (RFC3339; defaults to the start of today).
    Signals {
        #[arg(long)]
        strategy: String,
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        since: Option<String>,
    },
    /// List currently open positions.
    Positions,
    /// Request a running instance to shut down gracefully. This process
    /// has no IPC control plane (cross-process distribution is out of
    /// scope); send SIGINT/SIGTERM to the `run` process instead.
    Stop,
}

pub async fn dispatch(cli: Cli) -> AppResult<()> {
    match cli.command {
        Commands::Run => {
            let config = AppConfig::load(cli.config.as_deref())?;
            let app = Application::new(config).await?;
            app.run().await
        }
        Commands::Auth => {
            let config = AppConfig::load(cli.config.as_deref())?;
            let app = Application::new(config).await?;
            app.broker()
                .authenticate()
                .await
                .map_err(|err| AppError::AuthRequired(err.to_string()))?;
            info!("broker authentication succeeded");
            Ok(())
        }
        Commands::Status => {
            let config = AppConfig::load(cli.config.as_deref())?;
            let app = Application::new(config).await?;
            let positions = app.store().get_open_positions().await?;
            let warning_count = positions.iter().filter(|p| p.warning_flag).count();
            println!("open positions: {}", positions.len());
            println!("positions with warning_flag set: {warning_count}");
            for position in &positions {
                if position.warning_flag {
                    println!(
                        "  WARNING position={} symbol={} reason={:?}",
                        position.id, position.symbol, position.warning_reason
                    );
                }
            }
            Ok(())
        }
        Commands::Signals {
            strategy,
            symbol,
            since,
        } => {
            let config = AppConfig::load(cli.config.as_deref())?;
            let app = Application::new(config).await?;
            let since: DateTime<Utc> = match since {
                Some(s) => s
                    .parse()
                    .map_err(|e| AppError::Config(format!("invalid --since timestamp: {e}")))?,
                None => Utc::now()
                    .date_naive()
                    .and_hms_opt(0, 0, 0)
                    .expect("midnight is always a valid time")
                    .and_utc(),
            };
            let signals = app
                .store()
                .signals_since(&strategy, &Symbol::new(symbol.as_str()), since)
                .await?;
            println!("{} signal(s) since {since}", signals.len());
            for signal in signals {
                println!(
                    "  {} {:?} {:?} status={:?} generated_at={}",
                    signal.id, signal.action, signal.strength, signal.status, signal.generated_at
                );
            }
            Ok(())
        }
        Commands::Positions => {
            let config = AppConfig::load(cli.config.as_deref())?;
            let app = Application::new(config).await?;
            let positions = app.store().get_open_positions().await?;
            println!("{} open position(s)", positions.len());
            for position in positions {
                println!(
                    "  {} {} mode={:?} entry={} qty={} warning_flag={}",
                    position.id,
                    position.symbol,
                    position.mode,
                    position.entry_price,
                    position.quantity,
                    position.warning_flag
                );
            }
            Ok(())
        }
        Commands::Stop => {
            println!(
                "this binary has no out-of-process control plane; send SIGINT/SIGTERM to the running `run` process for a graceful shutdown"
            );
            Ok(())
        }
    }
}
