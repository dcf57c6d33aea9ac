// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signer identities for ledger submissions.
//!
//! A signer is resolved from a derivation string:
//! - well-known development identities (`//Alice`, `//Bob`, ...) which map to
//!   account indices of the public development mnemonic
//! - explicit BIP-32 paths on the development mnemonic (`m/44'/60'/0'/0/7`)
//! - raw hex private keys (`0x` prefix optional)
//!
//! PEM-encoded keys (PKCS#8 or SEC1) are loaded through [`LedgerSigner::from_pem`].
//! None of these are production credential paths.

use alloy::{
    network::EthereumWallet,
    primitives::Address,
    signers::local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner},
};
use k256::SecretKey;

use super::client::ChainError;

/// Public development mnemonic shared by local EVM development nodes.
pub const DEV_PHRASE: &str = "test test test test test test test test test test test junk";

/// Development identity names in account-index order.
const DEV_IDENTITIES: [&str; 6] = ["alice", "bob", "charlie", "dave", "eve", "ferdie"];

/// A signing identity together with the derivation string it came from.
#[derive(Debug, Clone)]
pub struct LedgerSigner {
    uri: String,
    inner: PrivateKeySigner,
}

impl LedgerSigner {
    /// Resolve a signer from a derivation string.
    pub fn from_uri(uri: &str) -> Result<Self, ChainError> {
        let trimmed = uri.trim();

        let inner = if let Some(name) = trimmed.strip_prefix("//") {
            let index = dev_identity_index(name).ok_or_else(|| {
                ChainError::InvalidSigner(format!("Unknown development identity: {trimmed}"))
            })?;
            MnemonicBuilder::<English>::default()
                .phrase(DEV_PHRASE)
                .index(index)
                .and_then(|builder| builder.build())
                .map_err(|e| ChainError::InvalidSigner(e.to_string()))?
        } else if trimmed.starts_with("m/") {
            MnemonicBuilder::<English>::default()
                .phrase(DEV_PHRASE)
                .derivation_path(trimmed)
                .and_then(|builder| builder.build())
                .map_err(|e| ChainError::InvalidSigner(e.to_string()))?
        } else {
            signer_from_hex(trimmed)?
        };

        Ok(Self {
            uri: trimmed.to_string(),
            inner,
        })
    }

    /// Load a signer from PEM-encoded private key bytes.
    ///
    /// `label` is what the enclave CLI is given as the account argument.
    pub fn from_pem(pem_bytes: &[u8], label: impl Into<String>) -> Result<Self, ChainError> {
        let hex_key = pem_to_hex(pem_bytes)?;
        Ok(Self {
            uri: label.into(),
            inner: signer_from_hex(&hex_key)?,
        })
    }

    /// The derivation string (or label) this signer was created from.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The ledger address controlled by this signer.
    pub fn address(&self) -> Address {
        self.inner.address()
    }

    /// Wallet used to sign transaction envelopes.
    pub fn wallet(&self) -> EthereumWallet {
        EthereumWallet::from(self.inner.clone())
    }
}

fn dev_identity_index(name: &str) -> Option<u32> {
    let lowered = name.to_ascii_lowercase();
    DEV_IDENTITIES
        .iter()
        .position(|candidate| *candidate == lowered)
        .map(|index| index as u32)
}

/// Create a signer from a hex private key (with or without `0x`).
fn signer_from_hex(private_key_hex: &str) -> Result<PrivateKeySigner, ChainError> {
    let key_bytes = alloy::hex::decode(private_key_hex)
        .map_err(|e| ChainError::InvalidSigner(e.to_string()))?;

    PrivateKeySigner::from_slice(&key_bytes).map_err(|e| ChainError::InvalidSigner(e.to_string()))
}

/// Parse a private key from PEM format to hex string.
///
/// Accepts SEC1 and PKCS#8 encodings of a secp256k1 key.
pub fn pem_to_hex(pem_bytes: &[u8]) -> Result<String, ChainError> {
    let pem_str = std::str::from_utf8(pem_bytes)
        .map_err(|e| ChainError::InvalidSigner(format!("Invalid UTF-8: {}", e)))?;

    let pem = pem::parse(pem_str)
        .map_err(|e| ChainError::InvalidSigner(format!("Invalid PEM: {}", e)))?;

    let secret_key = SecretKey::from_sec1_der(pem.contents())
        .or_else(|_| parse_pkcs8_to_secret_key(pem.contents()))
        .map_err(|e| ChainError::InvalidSigner(format!("Invalid key format: {}", e)))?;

    Ok(alloy::hex::encode(secret_key.to_bytes()))
}

fn parse_pkcs8_to_secret_key(der: &[u8]) -> Result<SecretKey, String> {
    use k256::pkcs8::DecodePrivateKey;
    SecretKey::from_pkcs8_der(der).map_err(|e| e.to_string())
}
