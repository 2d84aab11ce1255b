//! In-memory doubles for pipeline tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::AtomicU32;
use std::sync::Mutex;

use rust_decimal::Decimal;

use crate::api::{ApiAuth, BalanceAttestation, Exchange, OrderPayload, OrderResponse};
use crate::chain::Chain;
use crate::db::{EngineStore, ExecutionRecord, TERMINAL_STATES};
use crate::errors::EngineError;
use crate::models::{ClobCredentials, CopySettings, Follower, Position};

#[derive(Default)]
pub struct MemStore {
    pub followers: Vec<Follower>,
    pub global: HashMap<String, CopySettings>,
    pub trader: HashMap<(String, String), CopySettings>,
    pub positions: HashMap<String, Vec<Position>>,
    pub creds: HashMap<String, ClobCredentials>,
    pub bankrolls: HashMap<String, Decimal>,
    pub ledger: Mutex<HashMap<(String, String), String>>,
    pub recorded: Mutex<Vec<ExecutionRecord>>,
    pub saved_positions: Mutex<Vec<Position>>,
    /// Suspend once before the ledger write lands, like a real database
    /// call would; lets tests interleave a concurrent duplicate there.
    pub record_yields: bool,
}

impl MemStore {
    pub fn add_follower(&mut self, id: &str, wallet: &str) {
        let custodial = format!("0x{:040x}", 0x1000 + self.followers.len());
        self.followers.push(Follower {
            id: id.to_string(),
            wallet_address: wallet.to_string(),
        });
        self.creds.insert(
            id.to_string(),
            ClobCredentials {
                api_key: format!("{}-key", id),
                api_secret: format!("{}-secret", id),
                api_passphrase: format!("{}-pass", id),
                custodial_wallet: custodial,
            },
        );
    }

    pub fn set_global(&mut self, settings: CopySettings) {
        self.global.insert(settings.follower_id.clone(), settings);
    }

    pub fn set_trader(&mut self, settings: CopySettings) {
        let trader = settings
            .trader_address
            .clone()
            .unwrap_or_default();
        self.trader
            .insert((settings.follower_id.clone(), trader), settings);
    }

    pub fn recorded_states(&self, follower_id: &str) -> Vec<String> {
        self.recorded
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.follower_id == follower_id)
            .map(|r| r.state.clone())
            .collect()
    }
}

impl EngineStore for MemStore {
    async fn followers_of(&self, trader: &str) -> Result<Vec<Follower>, EngineError> {
        let subscribed: Vec<Follower> = self
            .followers
            .iter()
            .filter(|f| {
                let direct = self
                    .trader
                    .get(&(f.id.clone(), trader.to_string()))
                    .map(|s| s.is_active)
                    .unwrap_or(false);
                let global = self.global.get(&f.id).map(|s| s.is_active).unwrap_or(false);
                direct || global
            })
            .cloned()
            .collect();
        Ok(subscribed)
    }

    async fn global_settings(&self, follower_id: &str) -> Result<Option<CopySettings>, EngineError> {
        Ok(self.global.get(follower_id).cloned())
    }

    async fn trader_settings(
        &self,
        follower_id: &str,
        trader: &str,
    ) -> Result<Option<CopySettings>, EngineError> {
        Ok(self
            .trader
            .get(&(follower_id.to_string(), trader.to_string()))
            .cloned())
    }

    async fn open_positions(&self, follower_id: &str) -> Result<Vec<Position>, EngineError> {
        Ok(self.positions.get(follower_id).cloned().unwrap_or_default())
    }

    async fn credentials(&self, follower_id: &str) -> Result<Option<ClobCredentials>, EngineError> {
        Ok(self.creds.get(follower_id).cloned())
    }

    async fn trader_bankroll(&self, trader: &str) -> Result<Option<Decimal>, EngineError> {
        Ok(self.bankrolls.get(trader).copied())
    }

    async fn execution_is_terminal(
        &self,
        tx_hash: &str,
        follower_id: &str,
    ) -> Result<bool, EngineError> {
        Ok(self
            .ledger
            .lock()
            .unwrap()
            .get(&(tx_hash.to_string(), follower_id.to_string()))
            .map(|state| TERMINAL_STATES.contains(&state.as_str()))
            .unwrap_or(false))
    }

    async fn record_execution(&self, record: &ExecutionRecord) -> Result<(), EngineError> {
        if self.record_yields {
            tokio::task::yield_now().await;
        }
        self.ledger.lock().unwrap().insert(
            (record.tx_hash.clone(), record.follower_id.clone()),
            record.state.clone(),
        );
        self.recorded.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn save_position(&self, position: &Position) -> Result<(), EngineError> {
        self.saved_positions.lock().unwrap().push(position.clone());
        Ok(())
    }
}

/// Scriptable exchange double. Submissions succeed unless failures are
/// queued; a balance update settles the recorded balance when configured.
pub struct MockExchange {
    pub balance: Mutex<Decimal>,
    pub settled_balance: Option<Decimal>,
    pub update_calls: AtomicU32,
    pub submit_calls: AtomicU32,
    pub submitted: Mutex<Vec<OrderPayload>>,
    pub submit_failures: Mutex<VecDeque<EngineError>>,
}

impl MockExchange {
    pub fn with_balance(balance: Decimal) -> Self {
        Self {
            balance: Mutex::new(balance),
            settled_balance: None,
            update_calls: AtomicU32::new(0),
            submit_calls: AtomicU32::new(0),
            submitted: Mutex::new(Vec::new()),
            submit_failures: Mutex::new(VecDeque::new()),
        }
    }

    pub fn settling_to(mut self, balance: Decimal) -> Self {
        self.settled_balance = Some(balance);
        self
    }

    pub fn queue_submit_failure(&self, err: EngineError) {
        self.submit_failures.lock().unwrap().push_back(err);
    }
}

impl Exchange for MockExchange {
    async fn update_balance_allowance(
        &self,
        _auth: &ApiAuth,
        _attestation: &BalanceAttestation,
    ) -> Result<(), EngineError> {
        self.update_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(settled) = self.settled_balance {
            *self.balance.lock().unwrap() = settled;
        }
        Ok(())
    }

    async fn collateral_balance(
        &self,
        _auth: &ApiAuth,
        _custodial_wallet: &str,
    ) -> Result<Decimal, EngineError> {
        Ok(*self.balance.lock().unwrap())
    }

    async fn submit_order(
        &self,
        _auth: &ApiAuth,
        payload: &OrderPayload,
    ) -> Result<OrderResponse, EngineError> {
        self.submit_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.submitted.lock().unwrap().push(payload.clone());

        if let Some(err) = self.submit_failures.lock().unwrap().pop_front() {
            return Err(err);
        }

        let n = self.submitted.lock().unwrap().len();
        Ok(OrderResponse {
            order_id: Some(format!("order-{}", n)),
            success: true,
            error_msg: String::new(),
            status: Some("matched".to_string()),
            transaction_hash: None,
        })
    }
}

/// Fixed-balance chain double.
pub struct MockChain {
    pub native: Decimal,
    pub collateral: Decimal,
    pub authorized: bool,
}

impl MockChain {
    pub fn new(native: Decimal, collateral: Decimal) -> Self {
        Self {
            native,
            collateral,
            authorized: true,
        }
    }

    pub fn unauthorized(mut self) -> Self {
        self.authorized = false;
        self
    }
}

impl Chain for MockChain {
    async fn native_balance(&self, _address: &str) -> Result<Decimal, EngineError> {
        Ok(self.native)
    }

    async fn collateral_balance(&self, _wallet: &str) -> Result<Decimal, EngineError> {
        Ok(self.collateral)
    }

    async fn is_authorized(&self, _custodial: &str, _operator: &str) -> Result<bool, EngineError> {
        Ok(self.authorized)
    }
}
