//! copydesk: copy-trade execution engine for prediction markets.
//!
//! Mirrors trades by monitored traders onto follower accounts through
//! custodial smart-contract wallets, signing with per-follower derived
//! operator keys.

mod api;
mod chain;
mod config;
mod db;
mod engine;
mod errors;
mod feed;
mod funding;
mod models;
mod signing;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::ClobClient;
use crate::chain::RpcClient;
use crate::config::EngineConfig;
use crate::db::Database;
use crate::engine::Orchestrator;
use crate::funding::FundingVerifier;
use crate::models::{ClobCredentials, CopySettings, Follower, SizingStrategy};
use crate::signing::SigningService;

/// Copy execution engine CLI.
#[derive(Parser)]
#[command(name = "copydesk")]
#[command(about = "Copy trades from monitored traders onto follower accounts", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume NDJSON trade events from stdin and copy them
    Run,

    /// Print the derived operator address for a follower wallet
    Operator {
        /// Follower's primary wallet address
        wallet: String,
    },

    /// Verify a follower's funding split against live balances
    VerifyFunding {
        /// Follower's primary wallet address
        wallet: String,

        /// Follower's custodial wallet address
        custodial: String,

        /// Total deposit the split is checked against
        #[arg(short, long)]
        deposit: Decimal,
    },

    /// Register a follower and their exchange credentials
    Enroll {
        /// Follower identifier
        id: String,

        /// Follower's primary wallet address
        wallet: String,

        #[arg(long, env = "COPYDESK_API_KEY")]
        api_key: String,

        #[arg(long, env = "COPYDESK_API_SECRET")]
        api_secret: String,

        #[arg(long, env = "COPYDESK_API_PASSPHRASE")]
        api_passphrase: String,

        /// Custodial wallet funding the follower's orders
        #[arg(long)]
        custodial: String,
    },

    /// Create or update copy settings for a follower
    Subscribe {
        /// Follower identifier
        follower: String,

        /// Trader address; omit for the follower's global record
        #[arg(long)]
        trader: Option<String>,

        /// Sizing strategy: FIXED, PERCENTAGE, or PROPORTIONAL
        #[arg(long, default_value = "FIXED")]
        strategy: String,

        /// Strategy value: shares, percent, or follower budget
        #[arg(long)]
        value: Decimal,

        #[arg(long)]
        max_position: Option<Decimal>,

        #[arg(long)]
        max_exposure: Option<Decimal>,

        #[arg(long)]
        min_size: Option<Decimal>,

        #[arg(long)]
        max_size: Option<Decimal>,

        #[arg(long)]
        min_odds: Option<Decimal>,

        #[arg(long)]
        max_odds: Option<Decimal>,
    },

    /// Record a trader's bankroll estimate for proportional sizing
    Bankroll {
        /// Trader address
        trader: String,

        /// Estimated bankroll in collateral units
        value: Decimal,
    },

    /// Show the active configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = EngineConfig::from_env()?;

    match cli.command {
        Commands::Run => run(&config).await?,

        Commands::Operator { wallet } => {
            let signing = SigningService::new(config.master_secret.clone(), config.chain_id);
            let operator = signing.operator_address(&wallet)?;
            println!("{:?}", operator);
        }

        Commands::VerifyFunding {
            wallet,
            custodial,
            deposit,
        } => {
            let signing = SigningService::new(config.master_secret.clone(), config.chain_id);
            let operator = format!("{:?}", signing.operator_address(&wallet)?);
            let chain = RpcClient::new(
                config.rpc_url.clone(),
                config.usdc_bridged.clone(),
                config.usdc_native.clone(),
                config.safe_module.clone(),
            )?;

            let verifier = FundingVerifier::new(config.funding.clone());
            let (expected_gas, expected_collateral) = verifier.expected_legs(deposit);
            let result = verifier
                .verify_onchain(&chain, &operator, &custodial, expected_gas, expected_collateral)
                .await?;

            println!("Operator:   {}", operator);
            println!("Custodial:  {}", custodial);
            println!(
                "Observed:   {} gas / {} collateral",
                result.observed.operator_gas, result.observed.custodial_collateral
            );
            println!(
                "Expected:   {} gas / {} collateral",
                expected_gas, expected_collateral
            );
            println!("Valid:      {}", result.is_valid);
            for err in &result.errors {
                println!("  error: {}", err);
            }
            for warning in &result.warnings {
                println!("  warning: {}", warning);
            }
        }

        Commands::Enroll {
            id,
            wallet,
            api_key,
            api_secret,
            api_passphrase,
            custodial,
        } => {
            let db = Database::new(&config.database_url).await?;
            db.save_follower(&Follower {
                id: id.clone(),
                wallet_address: wallet.to_lowercase(),
            })
            .await?;
            db.save_credentials(
                &id,
                &ClobCredentials {
                    api_key,
                    api_secret,
                    api_passphrase,
                    custodial_wallet: custodial.to_lowercase(),
                },
            )
            .await?;
            println!("Enrolled follower: {}", id);
        }

        Commands::Subscribe {
            follower,
            trader,
            strategy,
            value,
            max_position,
            max_exposure,
            min_size,
            max_size,
            min_odds,
            max_odds,
        } => {
            let strategy = SizingStrategy::parse(&strategy)
                .ok_or_else(|| anyhow::anyhow!("unknown sizing strategy: {}", strategy))?;

            let db = Database::new(&config.database_url).await?;
            let settings = CopySettings {
                follower_id: follower.clone(),
                trader_address: trader.map(|t| t.to_lowercase()),
                is_active: true,
                strategy,
                strategy_value: value,
                max_position_size: max_position,
                max_total_exposure: max_exposure,
                min_trade_size: min_size,
                max_trade_size: max_size,
                min_odds,
                max_odds,
            };
            db.save_settings(&settings).await?;

            match &settings.trader_address {
                Some(trader) => println!("Subscribed {} to {}", follower, trader),
                None => println!("Updated global settings for {}", follower),
            }
        }

        Commands::Bankroll { trader, value } => {
            let db = Database::new(&config.database_url).await?;
            db.set_trader_bankroll(&trader.to_lowercase(), Some(value))
                .await?;
            println!("Bankroll for {}: {}", trader, value);
        }

        Commands::Config => {
            println!("\n=== Engine Configuration ===\n");
            println!("Chain ID:            {}", config.chain_id);
            println!("CLOB URL:            {}", config.clob_url);
            println!("RPC URL:             {}", config.rpc_url);
            println!("Bridged USDC:        {}", config.usdc_bridged);
            println!("Native USDC:         {}", config.usdc_native);
            println!(
                "Safe module:         {}",
                config.safe_module.as_deref().unwrap_or("(not configured)")
            );
            println!("Database:            {}", config.database_url);

            println!("\nBalance sync:");
            println!("  Tolerance:         {}", config.sync.balance_tolerance);
            println!("  Poll interval:     {:?}", config.sync.poll_interval);
            println!("  Poll timeout:      {:?}", config.sync.poll_timeout);

            println!("\nOrders:");
            println!("  Slippage:          {}", config.order.slippage_tolerance);
            println!("  Expiration:        {}s", config.order.expiration_secs);
            println!("  Fee rate:          {} bps", config.order.fee_rate_bps);

            println!("\nFunding split:");
            println!("  Operator leg:      {} bps", config.funding.operator_bps);
            println!("  Custodial leg:     {} bps", config.funding.custodial_bps);
            println!("  Gas slippage:      {}", config.funding.gas_slippage);
            println!("  Stable slippage:   {}", config.funding.stable_slippage);
        }
    }

    Ok(())
}

/// Consume trade events from stdin and drive the orchestrator. Ctrl-C
/// stops intake; the in-flight trade finishes before shutdown.
async fn run(config: &EngineConfig) -> Result<()> {
    let db = Arc::new(Database::new(&config.database_url).await?);
    let exchange = Arc::new(ClobClient::new(config.clob_url.clone())?);
    let chain = Arc::new(RpcClient::new(
        config.rpc_url.clone(),
        config.usdc_bridged.clone(),
        config.usdc_native.clone(),
        config.safe_module.clone(),
    )?);
    let signing = Arc::new(SigningService::new(
        config.master_secret.clone(),
        config.chain_id,
    ));

    let orchestrator = Orchestrator::new(db, exchange, chain, signing, config);

    info!(
        chain_id = config.chain_id,
        clob = %config.clob_url,
        "engine started, reading trade events from stdin"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            info!("event stream closed");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match feed::parse_event(&line) {
            Ok(trade) => {
                if let Err(err) = orchestrator.handle_trade(&trade).await {
                    error!(error = %err, "failed to process trade");
                }
            }
            Err(err) => warn!(error = %err, "dropping malformed event"),
        }
    }

    info!("engine stopped");
    Ok(())
}
