//! Fan-out orchestration of one source trade across its followers.
//!
//! Each (trade, follower) pair runs the full pipeline under that
//! follower's lock and lands in exactly one terminal state. Failures are
//! contained per follower; the execution ledger makes replays no-ops.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::api::Exchange;
use crate::chain::Chain;
use crate::config::{EngineConfig, RetryConfig};
use crate::db::{EngineStore, ExecutionRecord};
use crate::errors::{EngineError, SkipReason};
use crate::models::{Follower, Position, PositionStatus, SizingStrategy, SourceTrade};
use crate::signing::SigningService;

use super::gate::check_filters;
use super::locks::FollowerLocks;
use super::resolver::resolve_settings;
use super::retry::with_retries;
use super::sizer::compute_copy_size;
use super::submitter::OrderSubmitter;
use super::sync::BalanceSynchronizer;

/// Terminal outcome of one follower's pipeline.
#[derive(Debug)]
pub enum FollowerOutcome {
    Confirmed { order_id: Option<String> },
    Skipped(SkipReason),
    Failed(String),
}

/// Per-trade summary across all eligible followers.
#[derive(Debug)]
pub struct TradeReport {
    pub transaction_hash: String,
    pub outcomes: Vec<(String, FollowerOutcome)>,
}

impl TradeReport {
    pub fn confirmed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, FollowerOutcome::Confirmed { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, FollowerOutcome::Failed(_)))
            .count()
    }
}

enum PipelineEnd {
    Confirmed {
        order_id: Option<String>,
        copy_size: Decimal,
    },
    Skipped(SkipReason),
}

pub struct Orchestrator<S, X, C> {
    store: Arc<S>,
    exchange: Arc<X>,
    chain: Arc<C>,
    signing: Arc<SigningService>,
    synchronizer: BalanceSynchronizer,
    submitter: OrderSubmitter,
    locks: FollowerLocks,
    retry: RetryConfig,
}

impl<S, X, C> Orchestrator<S, X, C>
where
    S: EngineStore + Send + Sync,
    X: Exchange + Send + Sync,
    C: Chain + Send + Sync,
{
    pub fn new(
        store: Arc<S>,
        exchange: Arc<X>,
        chain: Arc<C>,
        signing: Arc<SigningService>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            synchronizer: BalanceSynchronizer::new(
                signing.clone(),
                config.sync.clone(),
                config.retry.clone(),
            ),
            submitter: OrderSubmitter::new(
                signing.clone(),
                config.order.clone(),
                config.retry.clone(),
            ),
            locks: FollowerLocks::new(),
            retry: config.retry.clone(),
            store,
            exchange,
            chain,
            signing,
        }
    }

    /// Fan one source trade out to every subscribed follower. Follower
    /// pipelines run concurrently; one follower's failure never blocks
    /// the others.
    pub async fn handle_trade(&self, trade: &SourceTrade) -> Result<TradeReport, EngineError> {
        let followers = self.store.followers_of(&trade.trader_address).await?;
        info!(
            trader = %trade.trader_address,
            tx = %trade.transaction_hash,
            side = trade.side.as_str(),
            size = %trade.size,
            price = %trade.price,
            followers = followers.len(),
            "processing source trade"
        );

        let outcomes = join_all(
            followers
                .iter()
                .map(|follower| self.copy_for_follower(trade, follower)),
        )
        .await;

        let report = TradeReport {
            transaction_hash: trade.transaction_hash.clone(),
            outcomes: followers
                .into_iter()
                .map(|f| f.id)
                .zip(outcomes)
                .collect(),
        };
        info!(
            tx = %report.transaction_hash,
            confirmed = report.confirmed(),
            failed = report.failed(),
            "trade processed"
        );
        Ok(report)
    }

    async fn copy_for_follower(
        &self,
        trade: &SourceTrade,
        follower: &Follower,
    ) -> FollowerOutcome {
        // A replay must not touch the existing ledger entry.
        match self
            .store
            .execution_is_terminal(&trade.transaction_hash, &follower.id)
            .await
        {
            Ok(true) => {
                debug!(follower = %follower.id, tx = %trade.transaction_hash, "already processed");
                return FollowerOutcome::Skipped(SkipReason::AlreadyProcessed);
            }
            Ok(false) => {}
            Err(err) => return self.fail(trade, follower, err).await,
        }

        // Held until the terminal record is persisted, so a concurrent
        // duplicate waiting here sees it in the re-check below.
        let _guard = self.locks.acquire(&follower.id).await;

        match self
            .store
            .execution_is_terminal(&trade.transaction_hash, &follower.id)
            .await
        {
            Ok(true) => {
                debug!(follower = %follower.id, tx = %trade.transaction_hash, "already processed");
                return FollowerOutcome::Skipped(SkipReason::AlreadyProcessed);
            }
            Ok(false) => {}
            Err(err) => return self.fail(trade, follower, err).await,
        }

        match self.run_pipeline(trade, follower).await {
            Ok(PipelineEnd::Confirmed {
                order_id,
                copy_size,
            }) => {
                self.record(trade, follower, "CONFIRMED", None, order_id.clone(), Some(copy_size))
                    .await;
                self.open_position(trade, follower, copy_size).await;
                FollowerOutcome::Confirmed { order_id }
            }
            Ok(PipelineEnd::Skipped(reason)) => {
                info!(follower = %follower.id, tx = %trade.transaction_hash, reason = %reason, "skipped");
                self.record(trade, follower, "SKIPPED", Some(reason.to_string()), None, None)
                    .await;
                FollowerOutcome::Skipped(reason)
            }
            Err(err) => self.fail(trade, follower, err).await,
        }
    }

    async fn fail(
        &self,
        trade: &SourceTrade,
        follower: &Follower,
        err: EngineError,
    ) -> FollowerOutcome {
        error!(
            follower = %follower.id,
            tx = %trade.transaction_hash,
            error = %err,
            "copy pipeline failed"
        );
        self.record(trade, follower, "FAILED", Some(err.to_string()), None, None)
            .await;
        FollowerOutcome::Failed(err.to_string())
    }

    async fn run_pipeline(
        &self,
        trade: &SourceTrade,
        follower: &Follower,
    ) -> Result<PipelineEnd, EngineError> {
        debug!(follower = %follower.id, state = "RECEIVED");

        let settings =
            match resolve_settings(self.store.as_ref(), &follower.id, &trade.trader_address)
                .await?
            {
                Some(settings) => settings,
                None => return Ok(PipelineEnd::Skipped(SkipReason::NoEffectiveSettings)),
            };
        debug!(follower = %follower.id, state = "RESOLVED", strategy = settings.strategy.as_str());

        let creds = self
            .store
            .credentials(&follower.id)
            .await?
            .ok_or_else(|| {
                EngineError::Validation(format!("no CLOB credentials for follower {}", follower.id))
            })?;

        let bankroll = if settings.strategy == SizingStrategy::Proportional {
            self.store.trader_bankroll(&trade.trader_address).await?
        } else {
            None
        };

        let copy_size = match compute_copy_size(&settings, trade.size, bankroll) {
            Ok(size) => size,
            Err(EngineError::Sizing(_)) => {
                return Ok(PipelineEnd::Skipped(SkipReason::NonPositiveSize))
            }
            Err(other) => return Err(other),
        };
        debug!(follower = %follower.id, state = "SIZED", copy_size = %copy_size);

        // Trader-specific settings cap exposure to that trader's positions;
        // a global record caps across all of the follower's positions.
        let copy_value = copy_size * trade.price;
        let positions = self.store.open_positions(&follower.id).await?;
        let exposure: Decimal = positions
            .iter()
            .filter(|p| {
                settings.trader_address.is_none()
                    || p.source_trader.as_deref() == Some(trade.trader_address.as_str())
            })
            .map(Position::exposure)
            .sum();

        if let Err(reason) = check_filters(trade, &settings, exposure, copy_value) {
            return Ok(PipelineEnd::Skipped(SkipReason::Filtered(reason)));
        }
        debug!(follower = %follower.id, state = "GATE_PASSED", exposure = %exposure);

        let operator = format!("{:?}", self.signing.operator_address(&follower.wallet_address)?);
        let authorized = with_retries(&self.retry, "authorization_check", || {
            self.chain.is_authorized(&creds.custodial_wallet, &operator)
        })
        .await?;
        if !authorized {
            // Configuration defect: the derived key is not the one the
            // custodial wallet recognizes. Never retried.
            return Err(EngineError::Signature(format!(
                "operator {} is not authorized for custodial wallet {}",
                operator, creds.custodial_wallet
            )));
        }

        let balance = self
            .synchronizer
            .sync(
                self.exchange.as_ref(),
                self.chain.as_ref(),
                &follower.wallet_address,
                &creds,
            )
            .await?;
        debug!(follower = %follower.id, state = "BALANCE_SYNCED", balance = %balance);

        let response = match self
            .submitter
            .submit(
                self.exchange.as_ref(),
                &follower.wallet_address,
                &creds,
                trade,
                copy_size,
            )
            .await
        {
            Ok(response) => response,
            Err(EngineError::Submission {
                message,
                insufficient_balance: true,
            }) => {
                // One balance repair per order, then give up.
                warn!(
                    follower = %follower.id,
                    error = %message,
                    "order rejected for insufficient balance, repairing once"
                );
                self.synchronizer
                    .sync(
                        self.exchange.as_ref(),
                        self.chain.as_ref(),
                        &follower.wallet_address,
                        &creds,
                    )
                    .await?;
                self.submitter
                    .submit(
                        self.exchange.as_ref(),
                        &follower.wallet_address,
                        &creds,
                        trade,
                        copy_size,
                    )
                    .await?
            }
            Err(err) => return Err(err),
        };
        debug!(follower = %follower.id, state = "SUBMITTED", order_id = ?response.order_id);

        Ok(PipelineEnd::Confirmed {
            order_id: response.order_id,
            copy_size,
        })
    }

    async fn record(
        &self,
        trade: &SourceTrade,
        follower: &Follower,
        state: &str,
        reason: Option<String>,
        order_id: Option<String>,
        copy_size: Option<Decimal>,
    ) {
        let record = ExecutionRecord {
            tx_hash: trade.transaction_hash.clone(),
            follower_id: follower.id.clone(),
            trader_address: trade.trader_address.clone(),
            market_id: trade.market_id.clone(),
            state: state.to_string(),
            reason,
            order_id,
            copy_size,
            price: Some(trade.price),
            created_at: Utc::now(),
        };
        if let Err(err) = self.store.record_execution(&record).await {
            warn!(
                follower = %follower.id,
                tx = %trade.transaction_hash,
                error = %err,
                "failed to record execution status"
            );
        }
    }

    async fn open_position(&self, trade: &SourceTrade, follower: &Follower, copy_size: Decimal) {
        let position = Position {
            follower_id: follower.id.clone(),
            market_id: trade.market_id.clone(),
            outcome: trade.outcome.clone(),
            side: trade.side,
            size: copy_size,
            entry_price: trade.price,
            current_value: copy_size * trade.price,
            status: PositionStatus::Open,
            source_trader: Some(trade.trader_address.clone()),
            opened_at: Utc::now(),
        };
        if let Err(err) = self.store.save_position(&position).await {
            warn!(
                follower = %follower.id,
                market = %trade.market_id,
                error = %err,
                "failed to persist copied position"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OrderConfig, SyncConfig};
    use crate::engine::testutil::{MemStore, MockChain, MockExchange};
    use crate::errors::FilterReason;
    use crate::models::{CopySettings, TradeSide};
    use rust_decimal_macros::dec;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const TRADER: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const ALICE_WALLET: &str = "0x1111111111111111111111111111111111111111";
    const BOB_WALLET: &str = "0x2222222222222222222222222222222222222222";

    fn test_config() -> EngineConfig {
        EngineConfig {
            master_secret: "test-master-secret".to_string(),
            chain_id: 137,
            clob_url: String::new(),
            rpc_url: String::new(),
            usdc_bridged: String::new(),
            usdc_native: String::new(),
            safe_module: None,
            database_url: String::new(),
            retry: RetryConfig {
                initial_interval: Duration::from_millis(1),
                max_elapsed: Duration::from_millis(50),
            },
            sync: SyncConfig {
                balance_tolerance: dec!(0.01),
                poll_interval: Duration::from_millis(1),
                poll_timeout: Duration::from_millis(50),
            },
            order: OrderConfig::default(),
            funding: Default::default(),
        }
    }

    fn trade(size: Decimal, price: Decimal) -> SourceTrade {
        SourceTrade {
            trader_address: TRADER.to_string(),
            market_id: "0xcond".to_string(),
            market_slug: "will-it-happen".to_string(),
            outcome: "Yes".to_string(),
            outcome_index: 0,
            asset: Some("7000".to_string()),
            side: TradeSide::Buy,
            price,
            size,
            transaction_hash: "0xtx1".to_string(),
            timestamp: Utc::now(),
            title: String::new(),
            trader_name: String::new(),
        }
    }

    fn orchestrator(
        store: MemStore,
        exchange: MockExchange,
        chain: MockChain,
    ) -> Orchestrator<MemStore, MockExchange, MockChain> {
        let config = test_config();
        let signing = Arc::new(SigningService::new(&config.master_secret, config.chain_id));
        Orchestrator::new(
            Arc::new(store),
            Arc::new(exchange),
            Arc::new(chain),
            signing,
            &config,
        )
    }

    #[tokio::test]
    async fn confirmed_copy_records_ledger_and_position() {
        let mut store = MemStore::default();
        store.add_follower("alice", ALICE_WALLET);
        store.set_global(CopySettings::global("alice", SizingStrategy::Fixed, dec!(25)));

        let orch = orchestrator(store, MockExchange::with_balance(dec!(100)), MockChain::new(dec!(2), dec!(100)));
        let report = orch.handle_trade(&trade(dec!(1000), dec!(0.40))).await.unwrap();

        assert_eq!(report.confirmed(), 1);
        assert!(matches!(
            report.outcomes[0].1,
            FollowerOutcome::Confirmed { .. }
        ));
        assert_eq!(orch.exchange.submit_calls.load(Ordering::SeqCst), 1);
        assert_eq!(orch.store.recorded_states("alice"), vec!["CONFIRMED"]);

        let positions = orch.store.saved_positions.lock().unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].size, dec!(25));
        assert_eq!(positions[0].entry_price, dec!(0.40));
        assert_eq!(positions[0].source_trader.as_deref(), Some(TRADER));
    }

    #[tokio::test]
    async fn replayed_trade_is_a_noop() {
        let mut store = MemStore::default();
        store.add_follower("alice", ALICE_WALLET);
        store.set_global(CopySettings::global("alice", SizingStrategy::Fixed, dec!(25)));

        let orch = orchestrator(store, MockExchange::with_balance(dec!(100)), MockChain::new(dec!(2), dec!(100)));
        let t = trade(dec!(1000), dec!(0.40));

        orch.handle_trade(&t).await.unwrap();
        let replay = orch.handle_trade(&t).await.unwrap();

        assert!(matches!(
            replay.outcomes[0].1,
            FollowerOutcome::Skipped(SkipReason::AlreadyProcessed)
        ));
        assert_eq!(orch.exchange.submit_calls.load(Ordering::SeqCst), 1);
        // The original CONFIRMED entry is untouched.
        assert_eq!(orch.store.recorded_states("alice"), vec!["CONFIRMED"]);
    }

    #[tokio::test]
    async fn concurrent_duplicates_submit_exactly_once() {
        let mut store = MemStore::default();
        store.add_follower("alice", ALICE_WALLET);
        store.set_global(CopySettings::global("alice", SizingStrategy::Fixed, dec!(25)));
        // Suspend inside the ledger write so the duplicate can reach the
        // follower lock before the CONFIRMED row lands.
        store.record_yields = true;

        let orch = orchestrator(store, MockExchange::with_balance(dec!(100)), MockChain::new(dec!(2), dec!(100)));
        let t = trade(dec!(1000), dec!(0.40));

        let (first, second) = tokio::join!(orch.handle_trade(&t), orch.handle_trade(&t));
        let confirmed = first.unwrap().confirmed() + second.unwrap().confirmed();

        assert_eq!(confirmed, 1);
        assert_eq!(orch.exchange.submit_calls.load(Ordering::SeqCst), 1);
        assert_eq!(orch.store.recorded_states("alice"), vec!["CONFIRMED"]);
    }

    #[tokio::test]
    async fn trader_specific_settings_override_global() {
        let mut store = MemStore::default();
        store.add_follower("alice", ALICE_WALLET);
        store.set_global(CopySettings::global("alice", SizingStrategy::Fixed, dec!(10)));
        store.set_trader(CopySettings::for_trader(
            "alice",
            TRADER,
            SizingStrategy::Percentage,
            dec!(50),
        ));

        let orch = orchestrator(store, MockExchange::with_balance(dec!(100)), MockChain::new(dec!(2), dec!(100)));
        orch.handle_trade(&trade(dec!(100), dec!(0.40))).await.unwrap();

        // 50% of 100 shares, not the global fixed 10.
        let submitted = orch.exchange.submitted.lock().unwrap();
        assert_eq!(submitted[0].order.taker_amount, "50000000");
    }

    #[tokio::test]
    async fn one_follower_failure_does_not_block_others() {
        let mut store = MemStore::default();
        store.add_follower("alice", ALICE_WALLET);
        store.add_follower("bob", BOB_WALLET);
        store.set_global(CopySettings::global("alice", SizingStrategy::Fixed, dec!(25)));
        store.set_global(CopySettings::global("bob", SizingStrategy::Fixed, dec!(25)));
        store.creds.remove("bob");

        let orch = orchestrator(store, MockExchange::with_balance(dec!(100)), MockChain::new(dec!(2), dec!(100)));
        let report = orch.handle_trade(&trade(dec!(1000), dec!(0.40))).await.unwrap();

        assert_eq!(report.confirmed(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(orch.store.recorded_states("alice"), vec!["CONFIRMED"]);
        assert_eq!(orch.store.recorded_states("bob"), vec!["FAILED"]);
    }

    #[tokio::test]
    async fn filtered_trade_is_skipped_with_reason() {
        let mut store = MemStore::default();
        store.add_follower("alice", ALICE_WALLET);
        let mut settings = CopySettings::global("alice", SizingStrategy::Fixed, dec!(25));
        settings.max_odds = Some(dec!(0.95));
        store.set_global(settings);

        let orch = orchestrator(store, MockExchange::with_balance(dec!(100)), MockChain::new(dec!(2), dec!(100)));
        let report = orch.handle_trade(&trade(dec!(1000), dec!(0.97))).await.unwrap();

        assert!(matches!(
            report.outcomes[0].1,
            FollowerOutcome::Skipped(SkipReason::Filtered(FilterReason::OddsAboveMax { .. }))
        ));
        assert_eq!(orch.exchange.submit_calls.load(Ordering::SeqCst), 0);
        assert_eq!(orch.store.recorded_states("alice"), vec!["SKIPPED"]);
    }

    #[tokio::test]
    async fn zero_size_resolves_to_a_skip() {
        let mut store = MemStore::default();
        store.add_follower("alice", ALICE_WALLET);
        store.set_global(CopySettings::global("alice", SizingStrategy::Fixed, dec!(0)));

        let orch = orchestrator(store, MockExchange::with_balance(dec!(100)), MockChain::new(dec!(2), dec!(100)));
        let report = orch.handle_trade(&trade(dec!(1000), dec!(0.40))).await.unwrap();

        assert!(matches!(
            report.outcomes[0].1,
            FollowerOutcome::Skipped(SkipReason::NonPositiveSize)
        ));
    }

    #[tokio::test]
    async fn unauthorized_operator_fails_before_submission() {
        let mut store = MemStore::default();
        store.add_follower("alice", ALICE_WALLET);
        store.set_global(CopySettings::global("alice", SizingStrategy::Fixed, dec!(25)));

        let orch = orchestrator(
            store,
            MockExchange::with_balance(dec!(100)),
            MockChain::new(dec!(2), dec!(100)).unauthorized(),
        );
        let report = orch.handle_trade(&trade(dec!(1000), dec!(0.40))).await.unwrap();

        assert_eq!(report.failed(), 1);
        assert_eq!(orch.exchange.submit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn insufficient_balance_is_repaired_once_then_resubmitted() {
        let mut store = MemStore::default();
        store.add_follower("alice", ALICE_WALLET);
        store.set_global(CopySettings::global("alice", SizingStrategy::Fixed, dec!(25)));

        let exchange = MockExchange::with_balance(dec!(100));
        exchange.queue_submit_failure(EngineError::Submission {
            message: "not enough balance".to_string(),
            insufficient_balance: true,
        });

        let orch = orchestrator(store, exchange, MockChain::new(dec!(2), dec!(100)));
        let report = orch.handle_trade(&trade(dec!(1000), dec!(0.40))).await.unwrap();

        assert_eq!(report.confirmed(), 1);
        assert_eq!(orch.exchange.submit_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn persistent_insufficient_balance_fails_after_one_repair() {
        let mut store = MemStore::default();
        store.add_follower("alice", ALICE_WALLET);
        store.set_global(CopySettings::global("alice", SizingStrategy::Fixed, dec!(25)));

        let exchange = MockExchange::with_balance(dec!(100));
        for _ in 0..2 {
            exchange.queue_submit_failure(EngineError::Submission {
                message: "not enough balance".to_string(),
                insufficient_balance: true,
            });
        }

        let orch = orchestrator(store, exchange, MockChain::new(dec!(2), dec!(100)));
        let report = orch.handle_trade(&trade(dec!(1000), dec!(0.40))).await.unwrap();

        assert_eq!(report.failed(), 1);
        assert_eq!(orch.exchange.submit_calls.load(Ordering::SeqCst), 2);
        assert_eq!(orch.store.recorded_states("alice"), vec!["FAILED"]);
    }

    #[tokio::test]
    async fn exposure_cap_counts_existing_open_positions() {
        let mut store = MemStore::default();
        store.add_follower("alice", ALICE_WALLET);
        let mut settings = CopySettings::global("alice", SizingStrategy::Fixed, dec!(300));
        settings.max_total_exposure = Some(dec!(1000));
        store.set_global(settings);
        store.positions.insert(
            "alice".to_string(),
            vec![Position {
                follower_id: "alice".to_string(),
                market_id: "0xother".to_string(),
                outcome: "No".to_string(),
                side: TradeSide::Buy,
                size: dec!(1800),
                entry_price: dec!(0.5),
                current_value: dec!(900),
                status: PositionStatus::Open,
                source_trader: Some(TRADER.to_string()),
                opened_at: Utc::now(),
            }],
        );

        let orch = orchestrator(store, MockExchange::with_balance(dec!(5000)), MockChain::new(dec!(2), dec!(5000)));
        // 300 shares at 0.5 = 150 new value; 900 + 150 > 1000.
        let report = orch.handle_trade(&trade(dec!(1000), dec!(0.5))).await.unwrap();

        assert!(matches!(
            report.outcomes[0].1,
            FollowerOutcome::Skipped(SkipReason::Filtered(FilterReason::ExposureCapExceeded {
                ..
            }))
        ));
    }
}
