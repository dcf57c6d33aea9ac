// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! NFT Consistency Check - Ledger / Enclave Cross-System Verification
//!
//! This crate drives an asset through a ledger node and an enclave secret
//! store and asserts that both systems agree on balances, asset identifiers
//! and secret payloads.
//!
//! ## Modules
//!
//! - `chain` - Ledger client (EVM JSON-RPC via alloy)
//! - `enclave` - Enclave command-line adapter
//! - `checker` - Verification state machine and run reports
//! - `journal` - JSONL run journal
//! - `api` - HTTP trigger and health probes (Axum)

pub mod api;
pub mod chain;
pub mod checker;
pub mod config;
pub mod enclave;
pub mod error;
pub mod journal;
pub mod logging;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;
