// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Cross-system consistency checker.
//!
//! A run walks a fixed sequence of steps:
//!
//! ```text
//! Idle -> Connected -> BalanceVerified -> AssetCreated
//!      -> SecretStored -> SecretRetrieved -> DataVerified
//! ```
//!
//! Ledger writes are followed by a settlement wait before the enclave is
//! asked to observe them. Any failure aborts the rest of the run; nothing is
//! rolled back.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::chain::{
    format_balance, AssetCreation, AssetId, ChainClient, ChainError, LedgerSigner, NodeIdentity,
    PollPolicy, QueryError,
};
use crate::enclave::{EnclaveExecutor, EnclaveRequest};
use crate::journal::{RunEvent, RunEventType, RunJournal};

pub mod error;
pub mod report;

pub use error::{AssertionFailure, CheckError, ErrorTier, RunError};
pub use report::{RunFailure, RunReport, Step, StepRecord};

/// How long to wait after a ledger write before relying on it.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// Sleep for a fixed duration.
    Fixed(Duration),
    /// Poll until the finalized head reaches the anchor block.
    Finality(PollPolicy),
}

impl Default for Settlement {
    fn default() -> Self {
        Settlement::Finality(PollPolicy::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BalanceMode {
    /// A mismatch fails the run.
    #[default]
    Strict,
    /// A mismatch is logged and the run continues.
    Advisory,
}

/// Balance comparison between ledger and enclave.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BalanceCheck {
    pub mode: BalanceMode,
    /// Allowed absolute difference in display units
    pub tolerance: f64,
}

/// How the asset id used by the enclave steps is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssetIdStrategy {
    /// Use the id from the creation event.
    #[default]
    Captured,
    /// Expect `baseline + assets created so far` and require the captured id
    /// to match it.
    Sequential { baseline: AssetId },
}

/// Inputs of a verification run.
#[derive(Debug, Clone)]
pub struct CheckSettings {
    pub signer: LedgerSigner,
    /// Payload (content locator) of the created asset
    pub asset_payload: String,
    /// Secret stored in and retrieved from the enclave
    pub secret: String,
    pub balance_check: BalanceCheck,
    pub settlement: Settlement,
    pub asset_ids: AssetIdStrategy,
}

/// Drives verification runs against one ledger client and one enclave.
pub struct ConsistencyChecker {
    chain: Arc<ChainClient>,
    enclave: Arc<dyn EnclaveExecutor>,
    settings: CheckSettings,
    /// Assets created by this checker across runs
    created_assets: AtomicU64,
    journal: Option<RunJournal>,
}

impl ConsistencyChecker {
    pub fn new(
        chain: Arc<ChainClient>,
        enclave: Arc<dyn EnclaveExecutor>,
        settings: CheckSettings,
    ) -> Self {
        Self {
            chain,
            enclave,
            settings,
            created_assets: AtomicU64::new(0),
            journal: None,
        }
    }

    /// Append run and step events to `journal`.
    pub fn with_journal(mut self, journal: RunJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn chain(&self) -> &Arc<ChainClient> {
        &self.chain
    }

    pub fn settings(&self) -> &CheckSettings {
        &self.settings
    }

    /// Execute one verification run.
    ///
    /// On failure the returned error carries the report up to the failing
    /// step. Cancelling `cancel` aborts the step in progress.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunReport, RunError> {
        let mut report = RunReport::new();
        info!(
            run_id = %report.run_id,
            signer = %self.settings.signer.address(),
            rpc_url = %self.chain.config().rpc_url,
            "Starting verification run"
        );
        self.journal_event(RunEvent::new(report.run_id, RunEventType::RunStarted));

        let outcome = self.drive(&mut report, cancel).await;
        report.finished_at = Some(Utc::now());

        match outcome {
            Ok(()) => {
                report.passed = true;
                info!(
                    run_id = %report.run_id,
                    asset_id = ?report.asset.as_ref().map(|a| a.asset_id),
                    "Verification run passed"
                );
                self.journal_event(RunEvent::new(report.run_id, RunEventType::RunPassed));
                Ok(report)
            }
            Err((step, source)) => {
                let failure = RunFailure::new(step, &source);
                error!(
                    run_id = %report.run_id,
                    step = %step,
                    tier = %failure.tier,
                    exit_code = failure.exit_code,
                    error = %source,
                    "Verification run failed"
                );
                self.journal_event(
                    RunEvent::new(report.run_id, RunEventType::RunFailed)
                        .with_step(step)
                        .failed(source.to_string()),
                );
                report.failure = Some(failure);
                Err(RunError {
                    report: Box::new(report),
                    source,
                })
            }
        }
    }

    async fn drive(
        &self,
        report: &mut RunReport,
        cancel: &CancellationToken,
    ) -> Result<(), (Step, CheckError)> {
        let identity = attempt(Step::Connected, cancel, self.connect()).await?;
        let observed = json!(identity);
        report.node = Some(identity);
        self.complete(report, Step::Connected, observed);

        let observed = attempt(Step::BalanceVerified, cancel, self.verify_balance()).await?;
        self.complete(report, Step::BalanceVerified, observed);

        let (creation, observed) = attempt(Step::AssetCreated, cancel, self.create_asset()).await?;
        let asset_id = creation.asset_id;
        report.asset = Some(creation);
        self.complete(report, Step::AssetCreated, observed);

        let observed = attempt(Step::SecretStored, cancel, self.store_secret(asset_id)).await?;
        self.complete(report, Step::SecretStored, observed);

        let observed =
            attempt(Step::SecretRetrieved, cancel, self.retrieve_secret(asset_id)).await?;
        self.complete(report, Step::SecretRetrieved, observed);

        let observed = attempt(Step::DataVerified, cancel, self.verify_data(asset_id)).await?;
        self.complete(report, Step::DataVerified, observed);

        Ok(())
    }

    fn complete(&self, report: &mut RunReport, step: Step, observed: Value) {
        info!(run_id = %report.run_id, step = %step, observed = %observed, "Step completed");
        self.journal_event(
            RunEvent::new(report.run_id, RunEventType::StepCompleted)
                .with_step(step)
                .with_details(observed.clone()),
        );
        report.steps.push(StepRecord {
            step,
            completed_at: Utc::now(),
            observed,
        });
    }

    fn journal_event(&self, event: RunEvent) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.log(&event) {
                warn!(error = %e, "Failed to write run journal");
            }
        }
    }

    async fn connect(&self) -> Result<NodeIdentity, CheckError> {
        self.chain.connect().await?;
        let identity = self.chain.identity().cloned().ok_or_else(|| {
            ChainError::Connection("Session established without handshake identity".to_string())
        })?;
        Ok(identity)
    }

    async fn verify_balance(&self) -> Result<Value, CheckError> {
        let signer = &self.settings.signer;
        let check = &self.settings.balance_check;

        let scale = self.chain.config().balance_scale;
        let chain = self.chain.query_balance(&signer.address().to_string()).await?;
        let chain_display = format_balance(chain.raw, scale);
        if chain.raw == 0 {
            return Err(assertion(
                Step::BalanceVerified,
                "signer account is funded on the ledger",
                Some(chain_display),
                None,
            ));
        }

        let response = self
            .enclave
            .invoke(&EnclaveRequest::Balance {
                account: signer.uri().to_string(),
            })
            .await?;
        if !response.status {
            return Err(assertion(
                Step::BalanceVerified,
                "enclave balance query succeeds",
                Some(chain_display),
                Some(response.result),
            ));
        }

        let enclave = parse_enclave_balance(&response.result, scale).ok_or_else(|| {
            assertion(
                Step::BalanceVerified,
                "enclave balance is numeric",
                Some(chain_display.clone()),
                Some(response.result.clone()),
            )
        })?;

        let (agree, enclave_display, difference) = match enclave {
            EnclaveBalance::Raw(raw) => {
                let difference = chain.raw.abs_diff(raw);
                (
                    difference <= tolerance_units(check.tolerance, scale),
                    format_balance(raw, scale),
                    format_balance(difference, scale),
                )
            }
            EnclaveBalance::Display(value) => {
                let difference = (chain.display - value).abs();
                (
                    difference <= check.tolerance,
                    value.to_string(),
                    difference.to_string(),
                )
            }
        };

        if !agree {
            let failure = AssertionFailure::new(
                Step::BalanceVerified,
                format!("balances agree within {}", check.tolerance),
                Some(chain_display.clone()),
                Some(enclave_display.clone()),
            );
            match check.mode {
                BalanceMode::Strict => return Err(CheckError::Assertion(failure)),
                BalanceMode::Advisory => warn!(%failure, "Balance mismatch ignored in advisory mode"),
            }
        }

        Ok(json!({
            "address": chain.address,
            "chain_raw": chain.raw.to_string(),
            "chain_display": chain_display,
            "enclave_display": enclave_display,
            "difference": difference,
            "agree": agree,
        }))
    }

    async fn create_asset(&self) -> Result<(AssetCreation, Value), CheckError> {
        let creation = self
            .chain
            .create_asset(&self.settings.asset_payload, &self.settings.signer)
            .await?;
        let created_before = self.created_assets.fetch_add(1, Ordering::SeqCst);

        if let AssetIdStrategy::Sequential { baseline } = self.settings.asset_ids {
            let expected = baseline + created_before;
            if creation.asset_id != expected {
                return Err(QueryError::AssetIdMismatch {
                    expected,
                    captured: creation.asset_id,
                }
                .into());
            }
        }

        info!(
            tx_hash = %creation.tx_hash,
            block_number = creation.block_number,
            asset_id = creation.asset_id,
            "Asset included"
        );

        let settlement = self.settle(creation.block_number).await?;
        let observed = json!({
            "tx_hash": creation.tx_hash,
            "block_number": creation.block_number,
            "asset_id": creation.asset_id,
            "payload": self.settings.asset_payload,
            "settlement": settlement,
        });
        Ok((creation, observed))
    }

    async fn store_secret(&self, asset_id: AssetId) -> Result<Value, CheckError> {
        let response = self
            .enclave
            .invoke(&EnclaveRequest::StoreSecret {
                account: self.settings.signer.uri().to_string(),
                asset_id,
                secret: self.settings.secret.clone(),
            })
            .await?;

        if !response.status || !response.result.is_empty() {
            return Err(assertion(
                Step::SecretStored,
                "store returns status true with an empty result",
                None,
                Some(format!("status={} result={:?}", response.status, response.result)),
            ));
        }

        // The enclave observes ledger state, so settle on the head seen now.
        let anchor = self.chain.head_block().await?;
        let settlement = self.settle(anchor).await?;

        Ok(json!({
            "asset_id": asset_id,
            "status": response.status,
            "settlement": settlement,
        }))
    }

    async fn retrieve_secret(&self, asset_id: AssetId) -> Result<Value, CheckError> {
        let response = self
            .enclave
            .invoke(&EnclaveRequest::RetrieveSecret {
                account: self.settings.signer.uri().to_string(),
                asset_id,
            })
            .await?;

        let matched = response.result.as_bytes() == self.settings.secret.as_bytes();
        if !response.status || !matched {
            // Secrets stay out of logs and reports; only their shape is shown.
            return Err(assertion(
                Step::SecretRetrieved,
                "retrieve returns status true with the stored secret",
                None,
                Some(format!(
                    "status={} result_len={} matches=false",
                    response.status,
                    response.result.len()
                )),
            ));
        }

        Ok(json!({
            "asset_id": asset_id,
            "status": response.status,
            "secret_len": response.result.len(),
            "matched": matched,
        }))
    }

    async fn verify_data(&self, asset_id: AssetId) -> Result<Value, CheckError> {
        let record = self
            .chain
            .query_asset_record(asset_id)
            .await?
            .ok_or_else(|| QueryError::NotFound(format!("asset {asset_id}")))?;

        let signer = self.settings.signer.address().to_string();
        if !record.owner.eq_ignore_ascii_case(&signer) {
            return Err(assertion(
                Step::DataVerified,
                format!("asset {asset_id} is owned by {signer}"),
                Some(record.owner),
                None,
            ));
        }

        let response = self
            .enclave
            .invoke(&EnclaveRequest::AssetData { asset_id })
            .await?;
        if !response.status {
            return Err(assertion(
                Step::DataVerified,
                "enclave asset data query succeeds",
                Some(record.payload),
                Some(response.result),
            ));
        }

        let enclave_uri = offchain_uri(&response.result);
        if let Some(uri) = &enclave_uri {
            if *uri != record.payload {
                return Err(assertion(
                    Step::DataVerified,
                    "enclave offchain URI equals the ledger payload",
                    Some(record.payload),
                    Some(uri.clone()),
                ));
            }
        }

        Ok(json!({
            "asset_id": asset_id,
            "owner": record.owner,
            "payload": record.payload,
            "enclave_offchain_uri": enclave_uri,
        }))
    }

    async fn settle(&self, anchor: u64) -> Result<Value, CheckError> {
        match &self.settings.settlement {
            Settlement::Fixed(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(json!({
                    "mode": "fixed",
                    "anchor_block": anchor,
                    "delay_ms": delay.as_millis() as u64,
                }))
            }
            Settlement::Finality(policy) => {
                let finalized = self.chain.await_finality(anchor, policy).await?;
                Ok(json!({
                    "mode": "finality",
                    "anchor_block": anchor,
                    "finalized_block": finalized,
                }))
            }
        }
    }
}

/// Await `step` unless `cancel` fires first.
async fn attempt<T>(
    step: Step,
    cancel: &CancellationToken,
    work: impl Future<Output = Result<T, CheckError>>,
) -> Result<T, (Step, CheckError)> {
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CheckError::Cancelled),
        result = work => result,
    };
    result.map_err(|e| (step, e))
}

fn assertion(
    step: Step,
    expectation: impl Into<String>,
    chain_observed: Option<String>,
    enclave_observed: Option<String>,
) -> CheckError {
    CheckError::Assertion(AssertionFailure::new(
        step,
        expectation,
        chain_observed,
        enclave_observed,
    ))
}

/// Balance reported by the enclave.
#[derive(Debug, Clone, Copy, PartialEq)]
enum EnclaveBalance {
    /// Integer amount in smallest units, compared exactly
    Raw(u128),
    /// Decimal text, already divided by the scale
    Display(f64),
}

/// Enclave balance (smallest units, integer or decimal text).
fn parse_enclave_balance(result: &str, scale: u128) -> Option<EnclaveBalance> {
    let trimmed = result.trim().trim_matches('"');
    if let Ok(raw) = trimmed.parse::<u128>() {
        return Some(EnclaveBalance::Raw(raw));
    }
    let raw = trimmed.parse::<f64>().ok().filter(|v| v.is_finite())?;
    if scale == 0 {
        return Some(EnclaveBalance::Display(raw));
    }
    Some(EnclaveBalance::Display(raw / scale as f64))
}

/// Display-unit tolerance expressed in smallest units.
fn tolerance_units(tolerance: f64, scale: u128) -> u128 {
    (tolerance * scale.max(1) as f64).floor() as u128
}

/// Offchain URI reported by the enclave's asset data, if present.
///
/// Accepts the URI as a string or as a byte array, at the top level or
/// under `details`.
fn offchain_uri(result: &str) -> Option<String> {
    let data: Value = serde_json::from_str(result).ok()?;
    let field = data
        .get("offchain_uri")
        .or_else(|| data.get("details").and_then(|d| d.get("offchain_uri")))?;

    match field {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let bytes = items
                .iter()
                .map(|v| v.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<Vec<u8>>>()?;
            Some(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => None,
    }
}
