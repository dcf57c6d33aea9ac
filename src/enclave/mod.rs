// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Enclave access through its external command interface.
//!
//! The enclave is never linked in-process. Operations are expressed as
//! [`EnclaveRequest`]s and executed by an [`EnclaveExecutor`]; the shipped
//! executor spawns the enclave CLI and parses the JSON object it prints.

use std::time::Duration;

use async_trait::async_trait;

pub mod cli;
pub mod protocol;

pub use cli::CliExecutor;
pub use protocol::{EnclaveRequest, EnclaveResponse, PROTOCOL_VERSION};

/// Executes enclave requests.
#[async_trait]
pub trait EnclaveExecutor: Send + Sync {
    async fn invoke(&self, request: &EnclaveRequest) -> Result<EnclaveResponse, ExecutionError>;
}

/// Adapter-level failures: the invocation itself did not produce a response.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("I/O error while running {program}: {reason}")]
    Io { program: String, reason: String },

    #[error("{program} exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{program} did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("Unparseable output: {0}")]
    Parse(String),
}
