// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Connection-cached ledger client.
//!
//! The node is reached through the [`LedgerConnector`] / [`LedgerSession`]
//! seam. [`ChainClient`] establishes one session on first use, guarded by a
//! single-initialization cell, and reuses it for every later call.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use tokio::sync::OnceCell;

use super::polling::{poll_until, with_retries, PollPolicy, RetryPolicy};
use super::signing::LedgerSigner;
use super::types::*;

/// Opens sessions against a ledger node.
#[async_trait]
pub trait LedgerConnector: Send + Sync {
    async fn connect(&self, config: &LedgerConfig) -> Result<Arc<dyn LedgerSession>, ChainError>;
}

/// An established session with a ledger node.
#[async_trait]
pub trait LedgerSession: Send + Sync {
    /// Chain/node identity, used as the readiness handshake.
    async fn identity(&self) -> Result<NodeIdentity, ChainError>;

    /// Free balance of `address` in smallest units.
    async fn free_balance(&self, address: Address) -> Result<u128, ChainError>;

    /// Asset record for `id`, or `None` when the ledger has no such asset.
    async fn asset_record(&self, id: AssetId) -> Result<Option<AssetRecord>, ChainError>;

    /// Sign and submit an asset-creation transaction; returns its hash.
    async fn submit_create_asset(
        &self,
        payload: &str,
        signer: &LedgerSigner,
    ) -> Result<String, ChainError>;

    /// Inclusion status of a submitted transaction, `None` while pending.
    async fn inclusion(&self, tx_hash: &str) -> Result<Option<TxInclusion>, ChainError>;

    /// Latest block number.
    async fn head_block(&self) -> Result<u64, ChainError>;

    /// Latest finalized block number.
    async fn finalized_block(&self) -> Result<u64, ChainError>;
}

struct Connected {
    session: Arc<dyn LedgerSession>,
    identity: NodeIdentity,
}

/// Ledger client holding at most one live session.
pub struct ChainClient {
    config: LedgerConfig,
    connector: Arc<dyn LedgerConnector>,
    connected: OnceCell<Connected>,
    connect_retry: RetryPolicy,
    inclusion_poll: PollPolicy,
}

impl ChainClient {
    /// Create an unconnected client; nothing is dialed until first use.
    pub fn new(config: LedgerConfig, connector: Arc<dyn LedgerConnector>) -> Self {
        Self {
            config,
            connector,
            connected: OnceCell::new(),
            connect_retry: RetryPolicy::default(),
            inclusion_poll: PollPolicy::default(),
        }
    }

    /// Override the retry policy applied to session establishment.
    pub fn with_connect_retry(mut self, policy: RetryPolicy) -> Self {
        self.connect_retry = policy;
        self
    }

    /// Override the polling policy used while waiting for inclusion.
    pub fn with_inclusion_poll(mut self, policy: PollPolicy) -> Self {
        self.inclusion_poll = policy;
        self
    }

    /// Get the ledger configuration.
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Whether a session has been established.
    pub fn is_connected(&self) -> bool {
        self.connected.initialized()
    }

    /// Identity captured during the handshake, once connected.
    pub fn identity(&self) -> Option<&NodeIdentity> {
        self.connected.get().map(|c| &c.identity)
    }

    /// Return the cached session, establishing it on first use.
    ///
    /// Concurrent first callers share a single establishment.
    pub async fn connect(&self) -> Result<Arc<dyn LedgerSession>, ChainError> {
        let connected = self
            .connected
            .get_or_try_init(|| async {
                with_retries(&self.connect_retry, "connect", || self.establish()).await
            })
            .await?;
        Ok(Arc::clone(&connected.session))
    }

    async fn establish(&self) -> Result<Connected, ChainError> {
        let session = self.connector.connect(&self.config).await?;
        let identity = session.identity().await.map_err(|e| match e {
            ChainError::Connection(_) => e,
            other => ChainError::Connection(format!("Handshake failed: {other}")),
        })?;

        tracing::info!(
            rpc_url = %self.config.rpc_url,
            chain_id = identity.chain_id,
            client_version = %identity.client_version,
            head_block = identity.head_block,
            "Connected to ledger node"
        );

        Ok(Connected { session, identity })
    }

    /// Get the free balance of an account.
    pub async fn query_balance(&self, account: &str) -> Result<AccountBalance, ChainError> {
        let address = Address::from_str(account)
            .map_err(|e| ChainError::InvalidAddress(e.to_string()))?;
        let session = self.connect().await?;
        let raw = session.free_balance(address).await?;

        Ok(AccountBalance {
            address: address.to_string(),
            raw,
            display: scale_balance(raw, self.config.balance_scale),
        })
    }

    /// Get the asset record for `id`; `Ok(None)` if the ledger has no such id.
    pub async fn query_asset_record(&self, id: AssetId) -> Result<Option<AssetRecord>, ChainError> {
        let session = self.connect().await?;
        session.asset_record(id).await
    }

    /// Submit an asset-creation transaction and wait until it is in a block.
    ///
    /// Inclusion is not finality; see [`ChainClient::await_finality`].
    pub async fn create_asset(
        &self,
        payload: &str,
        signer: &LedgerSigner,
    ) -> Result<AssetCreation, ChainError> {
        let session = self.connect().await?;
        let tx_hash = session.submit_create_asset(payload, signer).await?;

        tracing::info!(
            tx_hash = %tx_hash,
            signer = %signer.address(),
            "Asset creation transaction sent"
        );

        let waiting_for = format!("inclusion of {tx_hash}");
        let inclusion = poll_until(&self.inclusion_poll, &waiting_for, || {
            session.inclusion(&tx_hash)
        })
        .await?;

        if !inclusion.success {
            return Err(ChainError::Submission(format!(
                "Transaction {tx_hash} reverted in block {}",
                inclusion.block_number
            )));
        }

        let asset_id = inclusion
            .created_asset
            .ok_or_else(|| QueryError::MissingCreationEvent(tx_hash.clone()))?;

        Ok(AssetCreation {
            tx_hash,
            block_number: inclusion.block_number,
            asset_id,
        })
    }

    /// Get the current head block number.
    pub async fn head_block(&self) -> Result<u64, ChainError> {
        let session = self.connect().await?;
        session.head_block().await
    }

    /// Wait until the finalized head reaches `block`.
    ///
    /// Returns the finalized head observed when the condition held.
    pub async fn await_finality(&self, block: u64, policy: &PollPolicy) -> Result<u64, ChainError> {
        let session = self.connect().await?;
        let waiting_for = format!("finality of block {block}");
        let finalized = poll_until(policy, &waiting_for, || {
            let session = Arc::clone(&session);
            async move {
                let finalized = session.finalized_block().await?;
                Ok((finalized >= block).then_some(finalized))
            }
        })
        .await?;

        tracing::debug!(block, finalized, "Block finalized");
        Ok(finalized)
    }
}

/// Errors raised by ledger queries.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("No creation event in receipt of {0}")]
    MissingCreationEvent(String),

    #[error("Asset id mismatch: expected {expected}, ledger assigned {captured}")]
    AssetIdMismatch { expected: AssetId, captured: AssetId },
}

/// Errors that can occur during ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid signer: {0}")]
    InvalidSigner(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Submission error: {0}")]
    Submission(String),

    #[error("Timed out after {waited:?} waiting for {waiting_for}")]
    FinalityTimeout {
        waiting_for: String,
        waited: Duration,
    },
}

impl ChainError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Connection(_))
    }
}
