// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory ledger and enclave doubles shared by unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;

use crate::chain::{
    AssetId, AssetRecord, ChainClient, ChainError, LedgerConfig, LedgerConnector, LedgerSession,
    LedgerSigner, NodeIdentity, PollPolicy, QueryError, RetryPolicy, TxInclusion,
};
use crate::checker::{AssetIdStrategy, BalanceCheck, CheckSettings, ConsistencyChecker, Settlement};
use crate::enclave::{EnclaveExecutor, EnclaveRequest, EnclaveResponse, ExecutionError};

pub const MOCK_CHAIN_ID: u64 = 31337;
pub const MOCK_REGISTRY: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

struct PendingTx {
    probes_left: u32,
    inclusion: TxInclusion,
}

#[derive(Default)]
struct LedgerState {
    connects: u32,
    failing_connects: u32,
    balances: HashMap<Address, u128>,
    assets: Vec<AssetRecord>,
    txs: HashMap<String, PendingTx>,
    submissions: u64,
    inclusion_delay: u32,
    inclusion_probes: u32,
    revert: bool,
    suppress_events: bool,
    head: u64,
    finality_lag: u64,
    stall_finality: bool,
}

/// Ledger double: sequential asset ids from 0, one block per submission.
#[derive(Clone, Default)]
pub struct MockLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap()
    }

    pub fn config(&self) -> LedgerConfig {
        LedgerConfig {
            rpc_url: "ws://mock-ledger:9944".to_string(),
            registry_address: MOCK_REGISTRY.to_string(),
            ..LedgerConfig::default()
        }
    }

    pub fn connector(&self) -> Arc<dyn LedgerConnector> {
        Arc::new(self.clone())
    }

    pub fn connect_count(&self) -> u32 {
        self.state().connects
    }

    pub fn inclusion_probes(&self) -> u32 {
        self.state().inclusion_probes
    }

    /// Make the next `n` connection attempts fail.
    pub fn fail_connects(&self, n: u32) {
        self.state().failing_connects = n;
    }

    pub fn set_balance(&self, address: Address, raw: u128) {
        self.state().balances.insert(address, raw);
    }

    pub fn balance(&self, address: Address) -> u128 {
        self.state().balances.get(&address).copied().unwrap_or(0)
    }

    pub fn record(&self, id: AssetId) -> Option<AssetRecord> {
        self.state().assets.get(id as usize).cloned()
    }

    /// Number of pending probes before a submission shows as included.
    pub fn set_inclusion_delay(&self, probes: u32) {
        self.state().inclusion_delay = probes;
    }

    pub fn revert_creations(&self, revert: bool) {
        self.state().revert = revert;
    }

    pub fn suppress_creation_events(&self, suppress: bool) {
        self.state().suppress_events = suppress;
    }

    /// Blocks the finalized head trails the head by; shrinks by one per probe.
    pub fn set_finality_lag(&self, blocks: u64) {
        self.state().finality_lag = blocks;
    }

    /// Keep the finalized head at genesis forever.
    pub fn stall_finality(&self, stall: bool) {
        self.state().stall_finality = stall;
    }
}

#[async_trait]
impl LedgerConnector for MockLedger {
    async fn connect(&self, _config: &LedgerConfig) -> Result<Arc<dyn LedgerSession>, ChainError> {
        let mut state = self.state();
        state.connects += 1;
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(ChainError::Connection("connection refused".to_string()));
        }
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl LedgerSession for MockLedger {
    async fn identity(&self) -> Result<NodeIdentity, ChainError> {
        Ok(NodeIdentity {
            chain_id: MOCK_CHAIN_ID,
            client_version: "mock-ledger/v0.1.0".to_string(),
            head_block: self.state().head,
        })
    }

    async fn free_balance(&self, address: Address) -> Result<u128, ChainError> {
        Ok(self.balance(address))
    }

    async fn asset_record(&self, id: AssetId) -> Result<Option<AssetRecord>, ChainError> {
        Ok(self.record(id))
    }

    async fn submit_create_asset(
        &self,
        payload: &str,
        signer: &LedgerSigner,
    ) -> Result<String, ChainError> {
        let mut state = self.state();
        state.submissions += 1;
        state.head += 1;
        let tx_hash = format!("0x{:064x}", state.submissions);

        let created_asset = if state.revert {
            None
        } else {
            let id = state.assets.len() as AssetId;
            state.assets.push(AssetRecord {
                id,
                owner: signer.address().to_string(),
                payload: payload.to_string(),
            });
            (!state.suppress_events).then_some(id)
        };

        let pending = PendingTx {
            probes_left: state.inclusion_delay,
            inclusion: TxInclusion {
                block_number: state.head,
                success: !state.revert,
                created_asset,
            },
        };
        state.txs.insert(tx_hash.clone(), pending);
        Ok(tx_hash)
    }

    async fn inclusion(&self, tx_hash: &str) -> Result<Option<TxInclusion>, ChainError> {
        let mut state = self.state();
        state.inclusion_probes += 1;
        let pending = state
            .txs
            .get_mut(tx_hash)
            .ok_or_else(|| QueryError::NotFound(format!("transaction {tx_hash}")))?;

        if pending.probes_left > 0 {
            pending.probes_left -= 1;
            return Ok(None);
        }
        Ok(Some(pending.inclusion.clone()))
    }

    async fn head_block(&self) -> Result<u64, ChainError> {
        Ok(self.state().head)
    }

    async fn finalized_block(&self) -> Result<u64, ChainError> {
        let mut state = self.state();
        if state.stall_finality {
            return Ok(0);
        }
        let finalized = state.head.saturating_sub(state.finality_lag);
        state.finality_lag = state.finality_lag.saturating_sub(1);
        Ok(finalized)
    }
}

#[derive(Default)]
struct EnclaveState {
    secrets: HashMap<AssetId, String>,
    calls: Vec<EnclaveRequest>,
    balance_offset: i128,
    store_override: Option<EnclaveResponse>,
    retrieve_override: Option<EnclaveResponse>,
    data_uri_override: Option<String>,
    fail_data: bool,
    crash: bool,
}

/// Enclave double reading balances and asset data from a [`MockLedger`].
#[derive(Clone)]
pub struct MockEnclave {
    ledger: MockLedger,
    state: Arc<Mutex<EnclaveState>>,
}

impl MockEnclave {
    pub fn new(ledger: &MockLedger) -> Self {
        Self {
            ledger: ledger.clone(),
            state: Arc::new(Mutex::new(EnclaveState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, EnclaveState> {
        self.state.lock().unwrap()
    }

    /// Report balances shifted by `offset` smallest units.
    pub fn set_balance_offset(&self, offset: i128) {
        self.state().balance_offset = offset;
    }

    pub fn force_store_response(&self, response: EnclaveResponse) {
        self.state().store_override = Some(response);
    }

    pub fn force_retrieve_response(&self, response: EnclaveResponse) {
        self.state().retrieve_override = Some(response);
    }

    /// Report `uri` as the offchain URI of every asset.
    pub fn override_data_uri(&self, uri: &str) {
        self.state().data_uri_override = Some(uri.to_string());
    }

    pub fn fail_data_queries(&self, fail: bool) {
        self.state().fail_data = fail;
    }

    /// Make every invocation fail as if the process crashed.
    pub fn crash(&self, crash: bool) {
        self.state().crash = crash;
    }

    pub fn calls(&self) -> Vec<EnclaveRequest> {
        self.state().calls.clone()
    }

    pub fn secret(&self, asset_id: AssetId) -> Option<String> {
        self.state().secrets.get(&asset_id).cloned()
    }
}

#[async_trait]
impl EnclaveExecutor for MockEnclave {
    async fn invoke(&self, request: &EnclaveRequest) -> Result<EnclaveResponse, ExecutionError> {
        let mut state = self.state();
        state.calls.push(request.clone());

        if state.crash {
            return Err(ExecutionError::Exit {
                program: "mock-enclave".to_string(),
                status: "signal: 9 (SIGKILL)".to_string(),
                stderr: String::new(),
            });
        }

        let response = match request {
            EnclaveRequest::Balance { account } => {
                let signer = LedgerSigner::from_uri(account)
                    .map_err(|e| ExecutionError::Parse(e.to_string()))?;
                let raw = self.ledger.balance(signer.address()) as i128 + state.balance_offset;
                EnclaveResponse::ok(raw.to_string())
            }
            EnclaveRequest::StoreSecret {
                asset_id, secret, ..
            } => match state.store_override.clone() {
                Some(forced) => forced,
                None => {
                    state.secrets.insert(*asset_id, secret.clone());
                    EnclaveResponse::ok("")
                }
            },
            EnclaveRequest::RetrieveSecret { asset_id, .. } => {
                match state.retrieve_override.clone() {
                    Some(forced) => forced,
                    None => match state.secrets.get(asset_id) {
                        Some(secret) => EnclaveResponse::ok(secret.clone()),
                        None => EnclaveResponse::failed("Secret not found"),
                    },
                }
            }
            EnclaveRequest::AssetData { asset_id } => {
                if state.fail_data {
                    EnclaveResponse::failed("Failed to get NFT data")
                } else {
                    match self.ledger.record(*asset_id) {
                        Some(record) => {
                            let uri = state
                                .data_uri_override
                                .clone()
                                .unwrap_or(record.payload);
                            let data = serde_json::json!({
                                "owner": record.owner,
                                "details": { "offchain_uri": uri.into_bytes() },
                            });
                            EnclaveResponse::ok(data.to_string())
                        }
                        None => EnclaveResponse::failed("NFT not found"),
                    }
                }
            }
        };

        Ok(response)
    }
}

/// Poll policy fast enough for unit tests.
pub fn fast_poll() -> PollPolicy {
    PollPolicy {
        initial_interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(2),
        timeout: Duration::from_millis(200),
    }
}

/// `//Alice` storing `top_secret` for an asset with payload `test`.
pub fn default_settings() -> CheckSettings {
    CheckSettings {
        signer: LedgerSigner::from_uri("//Alice").unwrap(),
        asset_payload: "test".to_string(),
        secret: "top_secret".to_string(),
        balance_check: BalanceCheck::default(),
        settlement: Settlement::Finality(fast_poll()),
        asset_ids: AssetIdStrategy::Captured,
    }
}

/// Checker wired to the doubles, connecting with a single attempt.
pub fn mock_checker(
    ledger: &MockLedger,
    enclave: &MockEnclave,
    settings: CheckSettings,
) -> ConsistencyChecker {
    let chain = ChainClient::new(ledger.config(), ledger.connector())
        .with_connect_retry(RetryPolicy {
            max_attempts: 1,
            backoff: Duration::from_millis(1),
        })
        .with_inclusion_poll(fast_poll());
    ConsistencyChecker::new(Arc::new(chain), Arc::new(enclave.clone()), settings)
}
