// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::report::{RunReport, Step};
use crate::chain::{ChainError, QueryError};
use crate::enclave::ExecutionError;

/// Cross-system values disagreed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AssertionFailure {
    pub step: Step,
    /// What was expected to hold
    pub expectation: String,
    /// Value reported by the ledger, if the assertion involved one
    pub chain_observed: Option<String>,
    /// Value reported by the enclave, if the assertion involved one
    pub enclave_observed: Option<String>,
}

impl AssertionFailure {
    pub fn new(
        step: Step,
        expectation: impl Into<String>,
        chain_observed: Option<String>,
        enclave_observed: Option<String>,
    ) -> Self {
        Self {
            step,
            expectation: expectation.into(),
            chain_observed,
            enclave_observed,
        }
    }
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] expected {}", self.step, self.expectation)?;
        if let Some(chain) = &self.chain_observed {
            write!(f, "; ledger observed {chain}")?;
        }
        if let Some(enclave) = &self.enclave_observed {
            write!(f, "; enclave observed {enclave}")?;
        }
        Ok(())
    }
}

/// Errors aborting a verification run.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Assertion failed: {0}")]
    Assertion(AssertionFailure),

    #[error("Run cancelled")]
    Cancelled,
}

impl From<QueryError> for CheckError {
    fn from(e: QueryError) -> Self {
        CheckError::Chain(ChainError::Query(e))
    }
}

/// Taxonomy tier of a [`CheckError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTier {
    Connection,
    Query,
    Submission,
    FinalityTimeout,
    Execution,
    Assertion,
    Cancelled,
}

impl ErrorTier {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorTier::Connection => "connection",
            ErrorTier::Query => "query",
            ErrorTier::Submission => "submission",
            ErrorTier::FinalityTimeout => "finality_timeout",
            ErrorTier::Execution => "execution",
            ErrorTier::Assertion => "assertion",
            ErrorTier::Cancelled => "cancelled",
        }
    }

    /// Process exit code of the tier. Assertions add the step ordinal.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorTier::Connection => 2,
            ErrorTier::Query => 3,
            ErrorTier::Submission => 4,
            ErrorTier::FinalityTimeout => 5,
            ErrorTier::Execution => 6,
            ErrorTier::Cancelled => 7,
            ErrorTier::Assertion => 10,
        }
    }
}

impl fmt::Display for ErrorTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CheckError {
    pub fn tier(&self) -> ErrorTier {
        match self {
            CheckError::Chain(e) => match e {
                ChainError::InvalidRpcUrl(_) | ChainError::Connection(_) => ErrorTier::Connection,
                ChainError::InvalidAddress(_) | ChainError::Query(_) => ErrorTier::Query,
                ChainError::InvalidSigner(_) | ChainError::Submission(_) => ErrorTier::Submission,
                ChainError::FinalityTimeout { .. } => ErrorTier::FinalityTimeout,
            },
            CheckError::Execution(_) => ErrorTier::Execution,
            CheckError::Assertion(_) => ErrorTier::Assertion,
            CheckError::Cancelled => ErrorTier::Cancelled,
        }
    }

    /// Process exit code identifying the failure.
    ///
    /// Assertion failures map to `10 + step ordinal`.
    pub fn exit_code(&self) -> i32 {
        match self {
            CheckError::Assertion(failure) => {
                ErrorTier::Assertion.exit_code() + failure.step.ordinal()
            }
            other => other.tier().exit_code(),
        }
    }
}

/// A run that stopped before reaching its terminal step.
#[derive(Debug, thiserror::Error)]
#[error("verification run {} failed: {source}", .report.run_id)]
pub struct RunError {
    /// Report up to and including the failure
    pub report: Box<RunReport>,
    pub source: CheckError,
}
