// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ledger access.
//!
//! This module provides:
//! - A connection-cached client with bounded connection retries
//! - Balance and asset record queries
//! - Signed asset creation with inclusion tracking
//! - Finality polling

pub mod client;
pub mod evm;
pub mod polling;
pub mod registry;
pub mod signing;
pub mod types;

pub use client::{ChainClient, ChainError, LedgerConnector, LedgerSession, QueryError};
pub use evm::EvmConnector;
pub use polling::{PollPolicy, RetryPolicy};
pub use signing::LedgerSigner;
pub use types::*;
