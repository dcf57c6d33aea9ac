// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Asset registry contract interactions.

use std::str::FromStr;

use alloy::{
    primitives::{Address, Bytes, U256},
    providers::Provider,
    rpc::types::Log,
    sol,
    sol_types::SolCall,
};

use super::client::{ChainError, QueryError};
use super::types::{AssetId, AssetRecord};

sol! {
    #[sol(rpc)]
    interface IAssetRegistry {
        event Created(uint256 indexed id, address indexed owner, string offchainUri);

        function create(string calldata offchainUri, bytes calldata metadata) external returns (uint256 id);
        function data(uint256 id) external view returns (address owner, string memory offchainUri);
    }
}

/// Asset registry contract wrapper.
pub struct AssetRegistry<P> {
    contract: IAssetRegistry::IAssetRegistryInstance<P>,
    address: Address,
}

impl<P: Provider + Clone> AssetRegistry<P> {
    pub fn new(provider: &P, contract_address: &str) -> Result<Self, ChainError> {
        let address = parse_registry_address(contract_address)?;
        let contract = IAssetRegistry::new(address, provider.clone());

        Ok(Self { contract, address })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Read the record stored for `id`.
    ///
    /// Unknown ids revert or come back with a zero owner; both read as `None`.
    pub async fn record(&self, id: AssetId) -> Result<Option<AssetRecord>, ChainError> {
        let data = match self.contract.data(U256::from(id)).call().await {
            Ok(data) => data,
            Err(e) if e.as_revert_data().is_some() => return Ok(None),
            Err(e) => return Err(QueryError::Rpc(e.to_string()).into()),
        };

        if data.owner == Address::ZERO {
            return Ok(None);
        }

        Ok(Some(AssetRecord {
            id,
            owner: data.owner.to_string(),
            payload: data.offchainUri,
        }))
    }
}

/// Parse the configured registry address.
pub fn parse_registry_address(contract_address: &str) -> Result<Address, ChainError> {
    Address::from_str(contract_address.trim())
        .map_err(|e| ChainError::InvalidAddress(format!("Invalid registry address: {}", e)))
}

/// Encode a `create(payload, "")` call.
pub fn create_calldata(payload: &str) -> Bytes {
    IAssetRegistry::createCall {
        offchainUri: payload.to_string(),
        metadata: Bytes::new(),
    }
    .abi_encode()
    .into()
}

/// Asset id announced by the registry's `Created` event among `logs`.
///
/// Logs emitted by other contracts are ignored.
pub fn created_asset_from_logs(
    logs: &[Log],
    registry: Address,
) -> Result<Option<AssetId>, ChainError> {
    for log in logs.iter().filter(|log| log.address() == registry) {
        if let Ok(created) = log.log_decode::<IAssetRegistry::Created>() {
            let id = created.inner.data.id;
            let id = AssetId::try_from(id)
                .map_err(|_| QueryError::Decode(format!("Asset id {id} exceeds 64 bits")))?;
            return Ok(Some(id));
        }
    }
    Ok(None)
}
