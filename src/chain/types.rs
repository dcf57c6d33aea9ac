// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger types and constants.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Ledger-assigned identifier of an asset record.
pub type AssetId = u64;

/// Default ledger endpoint (local development node).
pub const DEFAULT_LEDGER_URL: &str = "ws://127.0.0.1:9944";

/// Default smallest-unit to display-unit divisor applied to balances.
pub const DEFAULT_BALANCE_SCALE: u128 = 1_000_000;

/// Ledger connection configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// RPC endpoint URL (`ws://`, `wss://`, `http://` or `https://`)
    pub rpc_url: String,
    /// Address of the asset registry contract
    pub registry_address: String,
    /// Divisor converting smallest units into display units
    pub balance_scale: u128,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_LEDGER_URL.to_string(),
            registry_address: String::new(),
            balance_scale: DEFAULT_BALANCE_SCALE,
        }
    }
}

/// Identity reported by the node during the readiness handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NodeIdentity {
    /// Chain ID
    pub chain_id: u64,
    /// Node client name and version
    pub client_version: String,
    /// Head block at handshake time
    pub head_block: u64,
}

/// Observed free balance of an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AccountBalance {
    /// Account address
    pub address: String,
    /// Balance in smallest units
    pub raw: u128,
    /// Balance divided by the configured scale
    pub display: f64,
}

/// On-ledger asset entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AssetRecord {
    /// Asset ID
    pub id: AssetId,
    /// Owner address
    pub owner: String,
    /// Opaque payload (content locator)
    pub payload: String,
}

/// Outcome of an included asset-creation transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AssetCreation {
    /// Transaction hash
    pub tx_hash: String,
    /// Block in which the transaction was included
    pub block_number: u64,
    /// Asset ID emitted by the creation event
    pub asset_id: AssetId,
}

/// Inclusion status of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInclusion {
    /// Block in which the transaction was included
    pub block_number: u64,
    /// Whether execution succeeded
    pub success: bool,
    /// Asset ID from the creation event, if one was emitted
    pub created_asset: Option<AssetId>,
}

/// Convert a smallest-unit amount into display units.
pub fn scale_balance(raw: u128, scale: u128) -> f64 {
    if scale == 0 {
        return raw as f64;
    }
    raw as f64 / scale as f64
}

/// Render a smallest-unit amount in display units without rounding.
///
/// Scales that are not a power of ten fall back to [`scale_balance`].
pub fn format_balance(raw: u128, scale: u128) -> String {
    if scale <= 1 {
        return raw.to_string();
    }
    let digits = scale.ilog10();
    if 10u128.pow(digits) != scale {
        return scale_balance(raw, scale).to_string();
    }

    let whole = raw / scale;
    let fraction = raw % scale;
    if fraction == 0 {
        return whole.to_string();
    }
    let fraction = format!("{fraction:0width$}", width = digits as usize);
    format!("{whole}.{}", fraction.trim_end_matches('0'))
}
