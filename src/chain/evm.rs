// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! EVM JSON-RPC implementation of the ledger seam.

use std::str::FromStr;
use std::sync::Arc;

use alloy::{
    eips::BlockNumberOrTag,
    network::TransactionBuilder,
    primitives::{Address, TxHash},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
};
use async_trait::async_trait;

use super::client::{ChainError, LedgerConnector, LedgerSession, QueryError};
use super::registry::{create_calldata, created_asset_from_logs, AssetRegistry};
use super::signing::LedgerSigner;
use super::types::*;

/// Base fee assumed when the latest block does not report one (25 gwei).
const FALLBACK_BASE_FEE: u128 = 25_000_000_000;

/// Priority fee offered on submissions (1.5 gwei).
const PRIORITY_FEE: u128 = 1_500_000_000;

/// Dials EVM nodes over WebSocket or HTTP.
#[derive(Debug, Clone, Default)]
pub struct EvmConnector;

#[async_trait]
impl LedgerConnector for EvmConnector {
    async fn connect(&self, config: &LedgerConfig) -> Result<Arc<dyn LedgerSession>, ChainError> {
        let url: url::Url = config
            .rpc_url
            .parse()
            .map_err(|e: url::ParseError| ChainError::InvalidRpcUrl(e.to_string()))?;
        if !matches!(url.scheme(), "ws" | "wss" | "http" | "https") {
            return Err(ChainError::InvalidRpcUrl(format!(
                "Unsupported scheme: {}",
                url.scheme()
            )));
        }
        let registry_address = super::registry::parse_registry_address(&config.registry_address)?;

        let provider = ProviderBuilder::new()
            .connect(url.as_str())
            .await
            .map_err(|e| ChainError::Connection(format!("{}: {}", config.rpc_url, e)))?
            .erased();

        let registry = AssetRegistry::new(&provider, &registry_address.to_string())?;

        Ok(Arc::new(EvmSession { provider, registry }))
    }
}

/// Live session with an EVM node.
pub struct EvmSession {
    provider: DynProvider,
    registry: AssetRegistry<DynProvider>,
}

impl EvmSession {
    /// Get current gas prices for EIP-1559 transactions.
    async fn gas_prices(&self) -> Result<(u128, u128), ChainError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await
            .map_err(|e| ChainError::Submission(format!("Failed to get block: {}", e)))?
            .ok_or_else(|| ChainError::Submission("No latest block".to_string()))?;

        let base_fee: u128 = block
            .header
            .base_fee_per_gas
            .map(|f| f as u128)
            .unwrap_or(FALLBACK_BASE_FEE);

        // Max fee = 2 * base_fee + priority_fee
        let max_fee = base_fee.saturating_mul(2).saturating_add(PRIORITY_FEE);

        Ok((max_fee, PRIORITY_FEE))
    }
}

fn rpc_error(e: impl std::fmt::Display) -> ChainError {
    QueryError::Rpc(e.to_string()).into()
}

#[async_trait]
impl LedgerSession for EvmSession {
    async fn identity(&self) -> Result<NodeIdentity, ChainError> {
        let (chain_id, client_version, head_block) = tokio::try_join!(
            async { self.provider.get_chain_id().await },
            async { self.provider.get_client_version().await },
            async { self.provider.get_block_number().await },
        )
        .map_err(|e| ChainError::Connection(format!("Handshake failed: {}", e)))?;

        Ok(NodeIdentity {
            chain_id,
            client_version,
            head_block,
        })
    }

    async fn free_balance(&self, address: Address) -> Result<u128, ChainError> {
        let balance = self.provider.get_balance(address).await.map_err(rpc_error)?;

        u128::try_from(balance).map_err(|_| {
            QueryError::Decode(format!("Balance of {address} exceeds 128 bits")).into()
        })
    }

    async fn asset_record(&self, id: AssetId) -> Result<Option<AssetRecord>, ChainError> {
        self.registry.record(id).await
    }

    async fn submit_create_asset(
        &self,
        payload: &str,
        signer: &LedgerSigner,
    ) -> Result<String, ChainError> {
        let from = signer.address();

        let nonce = self
            .provider
            .get_transaction_count(from)
            .await
            .map_err(|e| ChainError::Submission(format!("Failed to get nonce: {}", e)))?;
        let chain_id = self
            .provider
            .get_chain_id()
            .await
            .map_err(|e| ChainError::Submission(format!("Failed to get chain id: {}", e)))?;
        let (max_fee_per_gas, priority_fee) = self.gas_prices().await?;

        let mut tx = TransactionRequest::default()
            .with_from(from)
            .with_to(self.registry.address())
            .with_input(create_calldata(payload))
            .with_nonce(nonce)
            .with_chain_id(chain_id)
            .with_max_fee_per_gas(max_fee_per_gas)
            .with_max_priority_fee_per_gas(priority_fee);

        let gas_limit = self
            .provider
            .estimate_gas(tx.clone())
            .await
            .map_err(|e| ChainError::Submission(format!("Gas estimation failed: {}", e)))?;
        tx.set_gas_limit(gas_limit);

        let envelope = tx
            .build(&signer.wallet())
            .await
            .map_err(|e| ChainError::Submission(format!("Failed to sign: {}", e)))?;

        let pending = self
            .provider
            .send_tx_envelope(envelope)
            .await
            .map_err(|e| ChainError::Submission(format!("Failed to send: {}", e)))?;

        Ok(format!("{:#x}", pending.tx_hash()))
    }

    async fn inclusion(&self, tx_hash: &str) -> Result<Option<TxInclusion>, ChainError> {
        let hash = TxHash::from_str(tx_hash)
            .map_err(|e| QueryError::Decode(format!("Invalid tx hash: {}", e)))?;

        let Some(receipt) = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(rpc_error)?
        else {
            return Ok(None);
        };
        let Some(block_number) = receipt.block_number else {
            return Ok(None);
        };

        let success = receipt.status();
        let created_asset = if success {
            created_asset_from_logs(receipt.inner.logs(), self.registry.address())?
        } else {
            None
        };

        Ok(Some(TxInclusion {
            block_number,
            success,
            created_asset,
        }))
    }

    async fn head_block(&self) -> Result<u64, ChainError> {
        self.provider.get_block_number().await.map_err(rpc_error)
    }

    async fn finalized_block(&self) -> Result<u64, ChainError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Finalized)
            .await
            .map_err(rpc_error)?;

        Ok(block.map(|b| b.header.number).unwrap_or(0))
    }
}
