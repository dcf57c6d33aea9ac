// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Run report: what each step observed and how the run ended.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::error::{AssertionFailure, CheckError};
use crate::chain::{AssetCreation, NodeIdentity};

/// States reached by a verification run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Connected,
    BalanceVerified,
    AssetCreated,
    SecretStored,
    SecretRetrieved,
    DataVerified,
}

impl Step {
    pub const ALL: [Step; 6] = [
        Step::Connected,
        Step::BalanceVerified,
        Step::AssetCreated,
        Step::SecretStored,
        Step::SecretRetrieved,
        Step::DataVerified,
    ];

    /// 1-based position in the run.
    pub fn ordinal(self) -> i32 {
        match self {
            Step::Connected => 1,
            Step::BalanceVerified => 2,
            Step::AssetCreated => 3,
            Step::SecretStored => 4,
            Step::SecretRetrieved => 5,
            Step::DataVerified => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Step::Connected => "connected",
            Step::BalanceVerified => "balance_verified",
            Step::AssetCreated => "asset_created",
            Step::SecretStored => "secret_stored",
            Step::SecretRetrieved => "secret_retrieved",
            Step::DataVerified => "data_verified",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed step and the values it observed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StepRecord {
    pub step: Step,
    pub completed_at: DateTime<Utc>,
    #[schema(value_type = Object)]
    pub observed: serde_json::Value,
}

/// Why a run stopped.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RunFailure {
    /// Step that was being attempted
    pub step: Step,
    /// Error tier (`connection`, `query`, `submission`, ...)
    pub tier: String,
    pub message: String,
    /// Process exit code the failure maps to
    pub exit_code: i32,
    /// Expected vs. observed values when the failure is an assertion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion: Option<AssertionFailure>,
}

impl RunFailure {
    pub fn new(step: Step, error: &CheckError) -> Self {
        Self {
            step,
            tier: error.tier().to_string(),
            message: error.to_string(),
            exit_code: error.exit_code(),
            assertion: match error {
                CheckError::Assertion(failure) => Some(failure.clone()),
                _ => None,
            },
        }
    }
}

/// Summary of one verification run.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub passed: bool,
    /// Node identity captured at connection time
    pub node: Option<NodeIdentity>,
    /// Asset created during the run
    pub asset: Option<AssetCreation>,
    pub steps: Vec<StepRecord>,
    pub failure: Option<RunFailure>,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            passed: false,
            node: None,
            asset: None,
            steps: Vec::new(),
            failure: None,
        }
    }

    /// Last step the run reached, if any.
    pub fn last_step(&self) -> Option<Step> {
        self.steps.last().map(|record| record.step)
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}
