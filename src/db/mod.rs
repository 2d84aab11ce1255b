//! Persistence: follower registry, copy settings, positions, credentials,
//! and the execution ledger that backs pipeline idempotency.
//!
//! Decimal columns are stored as TEXT and parsed on read; SQLite REAL
//! would silently round collateral amounts.

use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::errors::EngineError;
use crate::models::{
    ClobCredentials, CopySettings, Follower, Position, PositionStatus, SizingStrategy, TradeSide,
};

/// Terminal states in the execution ledger. A replayed (transaction,
/// follower) pair in any of these states is a no-op.
pub const TERMINAL_STATES: [&str; 3] = ["CONFIRMED", "FAILED", "SKIPPED"];

/// One row of the execution ledger: the outcome of one (trade, follower)
/// pipeline run.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub tx_hash: String,
    pub follower_id: String,
    pub trader_address: String,
    pub market_id: String,
    /// Terminal pipeline state: CONFIRMED, FAILED, or SKIPPED
    pub state: String,
    /// Skip or failure reason, when applicable
    pub reason: Option<String>,
    pub order_id: Option<String>,
    pub copy_size: Option<Decimal>,
    pub price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

/// Store lookups the engine depends on; a trait for test doubles.
pub trait EngineStore {
    /// Followers subscribed to a trader, directly (trader-specific
    /// settings) or globally (an active global settings record).
    fn followers_of(
        &self,
        trader: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Follower>, EngineError>> + Send;

    fn global_settings(
        &self,
        follower_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<CopySettings>, EngineError>> + Send;

    fn trader_settings(
        &self,
        follower_id: &str,
        trader: &str,
    ) -> impl std::future::Future<Output = Result<Option<CopySettings>, EngineError>> + Send;

    fn open_positions(
        &self,
        follower_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Position>, EngineError>> + Send;

    fn credentials(
        &self,
        follower_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<ClobCredentials>, EngineError>> + Send;

    /// Operator-maintained bankroll estimate for a trader, feeding
    /// proportional sizing. None when no estimate exists.
    fn trader_bankroll(
        &self,
        trader: &str,
    ) -> impl std::future::Future<Output = Result<Option<Decimal>, EngineError>> + Send;

    /// Whether this (transaction, follower) pair already reached a
    /// terminal state.
    fn execution_is_terminal(
        &self,
        tx_hash: &str,
        follower_id: &str,
    ) -> impl std::future::Future<Output = Result<bool, EngineError>> + Send;

    fn record_execution(
        &self,
        record: &ExecutionRecord,
    ) -> impl std::future::Future<Output = Result<(), EngineError>> + Send;

    fn save_position(
        &self,
        position: &Position,
    ) -> impl std::future::Future<Output = Result<(), EngineError>> + Send;
}

/// SQLite-backed store.
pub struct Database {
    pool: SqlitePool,
}

fn db_err(err: sqlx::Error) -> EngineError {
    EngineError::Transient(format!("database error: {}", err))
}

fn parse_decimal(value: &str, column: &str) -> Result<Decimal, EngineError> {
    Decimal::from_str(value)
        .map_err(|e| EngineError::Validation(format!("bad decimal in {}: {}", column, e)))
}

fn parse_opt_decimal(value: &Option<String>, column: &str) -> Result<Option<Decimal>, EngineError> {
    value
        .as_deref()
        .map(|v| parse_decimal(v, column))
        .transpose()
}

#[derive(sqlx::FromRow)]
struct SettingsRow {
    follower_id: String,
    trader_address: Option<String>,
    is_active: bool,
    strategy: String,
    strategy_value: String,
    max_position_size: Option<String>,
    max_total_exposure: Option<String>,
    min_trade_size: Option<String>,
    max_trade_size: Option<String>,
    min_odds: Option<String>,
    max_odds: Option<String>,
}

impl SettingsRow {
    fn into_model(self) -> Result<CopySettings, EngineError> {
        let strategy = SizingStrategy::parse(&self.strategy).ok_or_else(|| {
            EngineError::Validation(format!("unknown sizing strategy: {}", self.strategy))
        })?;

        Ok(CopySettings {
            follower_id: self.follower_id,
            trader_address: self.trader_address,
            is_active: self.is_active,
            strategy,
            strategy_value: parse_decimal(&self.strategy_value, "strategy_value")?,
            max_position_size: parse_opt_decimal(&self.max_position_size, "max_position_size")?,
            max_total_exposure: parse_opt_decimal(&self.max_total_exposure, "max_total_exposure")?,
            min_trade_size: parse_opt_decimal(&self.min_trade_size, "min_trade_size")?,
            max_trade_size: parse_opt_decimal(&self.max_trade_size, "max_trade_size")?,
            min_odds: parse_opt_decimal(&self.min_odds, "min_odds")?,
            max_odds: parse_opt_decimal(&self.max_odds, "max_odds")?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PositionRow {
    follower_id: String,
    market_id: String,
    outcome: String,
    side: String,
    size: String,
    entry_price: String,
    current_value: String,
    status: String,
    source_trader: Option<String>,
    opened_at: String,
}

impl PositionRow {
    fn into_model(self) -> Result<Position, EngineError> {
        let side = match self.side.as_str() {
            "BUY" => TradeSide::Buy,
            "SELL" => TradeSide::Sell,
            other => {
                return Err(EngineError::Validation(format!(
                    "unknown position side: {}",
                    other
                )))
            }
        };
        let status = match self.status.as_str() {
            "OPEN" => PositionStatus::Open,
            "CLOSED" => PositionStatus::Closed,
            other => {
                return Err(EngineError::Validation(format!(
                    "unknown position status: {}",
                    other
                )))
            }
        };

        Ok(Position {
            follower_id: self.follower_id,
            market_id: self.market_id,
            outcome: self.outcome,
            side,
            size: parse_decimal(&self.size, "size")?,
            entry_price: parse_decimal(&self.entry_price, "entry_price")?,
            current_value: parse_decimal(&self.current_value, "current_value")?,
            status,
            source_trader: self.source_trader,
            opened_at: DateTime::parse_from_rfc3339(&self.opened_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|err| {
                    EngineError::Validation(format!("invalid opened_at timestamp: {}", err))
                })?,
        })
    }
}

impl Database {
    /// Connect and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS followers (
                id TEXT PRIMARY KEY,
                wallet_address TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS copy_settings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                follower_id TEXT NOT NULL,
                trader_address TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                strategy TEXT NOT NULL,
                strategy_value TEXT NOT NULL,
                max_position_size TEXT,
                max_total_exposure TEXT,
                min_trade_size TEXT,
                max_trade_size TEXT,
                min_odds TEXT,
                max_odds TEXT,
                UNIQUE(follower_id, trader_address)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS positions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                follower_id TEXT NOT NULL,
                market_id TEXT NOT NULL,
                outcome TEXT NOT NULL,
                side TEXT NOT NULL,
                size TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                current_value TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'OPEN',
                source_trader TEXT,
                opened_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS clob_credentials (
                follower_id TEXT PRIMARY KEY,
                api_key TEXT NOT NULL,
                api_secret TEXT NOT NULL,
                api_passphrase TEXT NOT NULL,
                custodial_wallet TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS traders (
                address TEXT PRIMARY KEY,
                display_name TEXT NOT NULL DEFAULT '',
                bankroll TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS executions (
                tx_hash TEXT NOT NULL,
                follower_id TEXT NOT NULL,
                trader_address TEXT NOT NULL,
                market_id TEXT NOT NULL,
                state TEXT NOT NULL,
                reason TEXT,
                order_id TEXT,
                copy_size TEXT,
                price TEXT,
                created_at TEXT NOT NULL,
                PRIMARY KEY (tx_hash, follower_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Register or update a follower.
    pub async fn save_follower(&self, follower: &Follower) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO followers (id, wallet_address) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET wallet_address = excluded.wallet_address",
        )
        .bind(&follower.id)
        .bind(&follower.wallet_address)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Create or replace a settings record (global when `trader_address`
    /// is None).
    pub async fn save_settings(&self, settings: &CopySettings) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            INSERT INTO copy_settings (
                follower_id, trader_address, is_active, strategy, strategy_value,
                max_position_size, max_total_exposure, min_trade_size,
                max_trade_size, min_odds, max_odds
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(follower_id, trader_address) DO UPDATE SET
                is_active = excluded.is_active,
                strategy = excluded.strategy,
                strategy_value = excluded.strategy_value,
                max_position_size = excluded.max_position_size,
                max_total_exposure = excluded.max_total_exposure,
                min_trade_size = excluded.min_trade_size,
                max_trade_size = excluded.max_trade_size,
                min_odds = excluded.min_odds,
                max_odds = excluded.max_odds
            "#,
        )
        .bind(&settings.follower_id)
        .bind(&settings.trader_address)
        .bind(settings.is_active)
        .bind(settings.strategy.as_str())
        .bind(settings.strategy_value.to_string())
        .bind(settings.max_position_size.map(|d| d.to_string()))
        .bind(settings.max_total_exposure.map(|d| d.to_string()))
        .bind(settings.min_trade_size.map(|d| d.to_string()))
        .bind(settings.max_trade_size.map(|d| d.to_string()))
        .bind(settings.min_odds.map(|d| d.to_string()))
        .bind(settings.max_odds.map(|d| d.to_string()))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn save_credentials(
        &self,
        follower_id: &str,
        creds: &ClobCredentials,
    ) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            INSERT INTO clob_credentials (
                follower_id, api_key, api_secret, api_passphrase, custodial_wallet
            ) VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(follower_id) DO UPDATE SET
                api_key = excluded.api_key,
                api_secret = excluded.api_secret,
                api_passphrase = excluded.api_passphrase,
                custodial_wallet = excluded.custodial_wallet
            "#,
        )
        .bind(follower_id)
        .bind(&creds.api_key)
        .bind(&creds.api_secret)
        .bind(&creds.api_passphrase)
        .bind(&creds.custodial_wallet)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn set_trader_bankroll(
        &self,
        trader: &str,
        bankroll: Option<Decimal>,
    ) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO traders (address, bankroll) VALUES (?, ?)
             ON CONFLICT(address) DO UPDATE SET bankroll = excluded.bankroll",
        )
        .bind(trader)
        .bind(bankroll.map(|d| d.to_string()))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

impl EngineStore for Database {
    async fn followers_of(&self, trader: &str) -> Result<Vec<Follower>, EngineError> {
        let rows: Vec<Follower> = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT DISTINCT f.id, f.wallet_address
            FROM followers f
            JOIN copy_settings s ON s.follower_id = f.id
            WHERE s.is_active = 1
              AND (s.trader_address IS NULL OR s.trader_address = ?)
            ORDER BY f.id
            "#,
        )
        .bind(trader)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?
        .into_iter()
        .map(|(id, wallet_address)| Follower { id, wallet_address })
        .collect();

        Ok(rows)
    }

    async fn global_settings(&self, follower_id: &str) -> Result<Option<CopySettings>, EngineError> {
        let row: Option<SettingsRow> = sqlx::query_as(
            "SELECT follower_id, trader_address, is_active, strategy, strategy_value,
                    max_position_size, max_total_exposure, min_trade_size,
                    max_trade_size, min_odds, max_odds
             FROM copy_settings
             WHERE follower_id = ? AND trader_address IS NULL",
        )
        .bind(follower_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(SettingsRow::into_model).transpose()
    }

    async fn trader_settings(
        &self,
        follower_id: &str,
        trader: &str,
    ) -> Result<Option<CopySettings>, EngineError> {
        let row: Option<SettingsRow> = sqlx::query_as(
            "SELECT follower_id, trader_address, is_active, strategy, strategy_value,
                    max_position_size, max_total_exposure, min_trade_size,
                    max_trade_size, min_odds, max_odds
             FROM copy_settings
             WHERE follower_id = ? AND trader_address = ?",
        )
        .bind(follower_id)
        .bind(trader)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(SettingsRow::into_model).transpose()
    }

    async fn open_positions(&self, follower_id: &str) -> Result<Vec<Position>, EngineError> {
        let rows: Vec<PositionRow> = sqlx::query_as(
            "SELECT follower_id, market_id, outcome, side, size, entry_price,
                    current_value, status, source_trader, opened_at
             FROM positions
             WHERE follower_id = ? AND status = 'OPEN'",
        )
        .bind(follower_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(PositionRow::into_model).collect()
    }

    async fn credentials(&self, follower_id: &str) -> Result<Option<ClobCredentials>, EngineError> {
        let row: Option<(String, String, String, String)> = sqlx::query_as(
            "SELECT api_key, api_secret, api_passphrase, custodial_wallet
             FROM clob_credentials WHERE follower_id = ?",
        )
        .bind(follower_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(
            |(api_key, api_secret, api_passphrase, custodial_wallet)| ClobCredentials {
                api_key,
                api_secret,
                api_passphrase,
                custodial_wallet,
            },
        ))
    }

    async fn trader_bankroll(&self, trader: &str) -> Result<Option<Decimal>, EngineError> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT bankroll FROM traders WHERE address = ?")
                .bind(trader)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        match row.and_then(|(b,)| b) {
            Some(raw) => Ok(Some(parse_decimal(&raw, "bankroll")?)),
            None => Ok(None),
        }
    }

    async fn execution_is_terminal(
        &self,
        tx_hash: &str,
        follower_id: &str,
    ) -> Result<bool, EngineError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT state FROM executions WHERE tx_hash = ? AND follower_id = ?",
        )
        .bind(tx_hash)
        .bind(follower_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row
            .map(|(state,)| TERMINAL_STATES.contains(&state.as_str()))
            .unwrap_or(false))
    }

    async fn record_execution(&self, record: &ExecutionRecord) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            INSERT INTO executions (
                tx_hash, follower_id, trader_address, market_id, state,
                reason, order_id, copy_size, price, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(tx_hash, follower_id) DO UPDATE SET
                state = excluded.state,
                reason = excluded.reason,
                order_id = excluded.order_id,
                copy_size = excluded.copy_size,
                price = excluded.price
            "#,
        )
        .bind(&record.tx_hash)
        .bind(&record.follower_id)
        .bind(&record.trader_address)
        .bind(&record.market_id)
        .bind(&record.state)
        .bind(&record.reason)
        .bind(&record.order_id)
        .bind(record.copy_size.map(|d| d.to_string()))
        .bind(record.price.map(|d| d.to_string()))
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn save_position(&self, position: &Position) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            INSERT INTO positions (
                follower_id, market_id, outcome, side, size, entry_price,
                current_value, status, source_trader, opened_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&position.follower_id)
        .bind(&position.market_id)
        .bind(&position.outcome)
        .bind(position.side.as_str())
        .bind(position.size.to_string())
        .bind(position.entry_price.to_string())
        .bind(position.current_value.to_string())
        .bind(position.status.as_str())
        .bind(&position.source_trader)
        .bind(position.opened_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}
