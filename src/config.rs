// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names, default values and the
//! [`CheckerConfig`] assembled from them at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `LEDGER_RPC_URL` | Ledger node endpoint (`ws`, `wss`, `http`, `https`) | `ws://127.0.0.1:9944` |
//! | `ASSET_REGISTRY` | Address of the asset registry contract | Required |
//! | `BALANCE_SCALE` | Smallest-unit to display-unit divisor | `1000000` |
//! | `ENCLAVE_CLI` | Path of the enclave command-line binary | `enclave-cli` |
//! | `ENCLAVE_CLI_ARGS` | Whitespace-separated arguments placed before the subcommand | empty |
//! | `ENCLAVE_TIMEOUT_SECS` | Per-invocation enclave timeout | `60` |
//! | `SIGNER_URI` | Signer derivation string (`//Alice`, `m/...`, hex key) | `//Alice` |
//! | `SIGNER_PEM_PATH` | PEM private key file; `SIGNER_URI` becomes its enclave label | Optional |
//! | `ASSET_PAYLOAD` | Payload of the created asset | `test` |
//! | `SECRET_VALUE` | Secret stored in the enclave | `top_secret` |
//! | `BALANCE_CHECK` | `strict` or `advisory` | `strict` |
//! | `BALANCE_TOLERANCE` | Allowed balance difference in display units | `0` |
//! | `SETTLEMENT_MODE` | `finality` or `fixed` | `finality` |
//! | `SETTLEMENT_DELAY_SECS` | Delay used by `fixed` settlement | `10` |
//! | `FINALITY_TIMEOUT_SECS` | Inclusion and finality poll timeout | `120` |
//! | `POLL_INITIAL_MS` | First poll interval | `500` |
//! | `POLL_MAX_MS` | Poll interval cap | `8000` |
//! | `ASSET_ID_BASELINE` | Enables sequential asset ids starting at this value | Optional |
//! | `CONNECT_RETRIES` | Connection attempts before giving up | `3` |
//! | `CONNECT_RETRY_BACKOFF_MS` | Delay between connection attempts | `1000` |
//! | `RUN_JOURNAL_DIR` | Directory for the JSONL run journal | Optional |
//! | `HOST` | Server bind address (`serve`) | `0.0.0.0` |
//! | `PORT` | Server bind port (`serve`) | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::chain::{
    ChainClient, EvmConnector, LedgerConfig, LedgerSigner, PollPolicy, RetryPolicy,
    DEFAULT_BALANCE_SCALE, DEFAULT_LEDGER_URL,
};
use crate::checker::{
    AssetIdStrategy, BalanceCheck, BalanceMode, CheckSettings, ConsistencyChecker, Settlement,
};
use crate::enclave::CliExecutor;
use crate::journal::RunJournal;

pub const LEDGER_RPC_URL_ENV: &str = "LEDGER_RPC_URL";
pub const ASSET_REGISTRY_ENV: &str = "ASSET_REGISTRY";
pub const BALANCE_SCALE_ENV: &str = "BALANCE_SCALE";
pub const ENCLAVE_CLI_ENV: &str = "ENCLAVE_CLI";
pub const ENCLAVE_CLI_ARGS_ENV: &str = "ENCLAVE_CLI_ARGS";
pub const ENCLAVE_TIMEOUT_SECS_ENV: &str = "ENCLAVE_TIMEOUT_SECS";
pub const SIGNER_URI_ENV: &str = "SIGNER_URI";
pub const SIGNER_PEM_PATH_ENV: &str = "SIGNER_PEM_PATH";
pub const ASSET_PAYLOAD_ENV: &str = "ASSET_PAYLOAD";
pub const SECRET_VALUE_ENV: &str = "SECRET_VALUE";
pub const BALANCE_CHECK_ENV: &str = "BALANCE_CHECK";
pub const BALANCE_TOLERANCE_ENV: &str = "BALANCE_TOLERANCE";
pub const SETTLEMENT_MODE_ENV: &str = "SETTLEMENT_MODE";
pub const SETTLEMENT_DELAY_SECS_ENV: &str = "SETTLEMENT_DELAY_SECS";
pub const FINALITY_TIMEOUT_SECS_ENV: &str = "FINALITY_TIMEOUT_SECS";
pub const POLL_INITIAL_MS_ENV: &str = "POLL_INITIAL_MS";
pub const POLL_MAX_MS_ENV: &str = "POLL_MAX_MS";
pub const ASSET_ID_BASELINE_ENV: &str = "ASSET_ID_BASELINE";
pub const CONNECT_RETRIES_ENV: &str = "CONNECT_RETRIES";
pub const CONNECT_RETRY_BACKOFF_MS_ENV: &str = "CONNECT_RETRY_BACKOFF_MS";

/// Environment variable name for the run journal directory.
///
/// When unset, runs are only reported through logs and the HTTP API.
pub const RUN_JOURNAL_DIR_ENV: &str = "RUN_JOURNAL_DIR";

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_ENCLAVE_CLI: &str = "enclave-cli";
pub const DEFAULT_SIGNER_URI: &str = "//Alice";
pub const DEFAULT_ASSET_PAYLOAD: &str = "test";
pub const DEFAULT_SECRET: &str = "top_secret";
pub const DEFAULT_SETTLEMENT_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

/// Default `RUST_LOG` filter.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid signer: {0}")]
    Signer(String),

    #[error("Failed to read {path}: {reason}")]
    Io { path: String, reason: String },
}

impl ConfigError {
    /// Process exit code for configuration failures.
    pub const EXIT_CODE: i32 = 8;
}

/// Everything needed to build a checker and its driver surfaces.
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    pub ledger: LedgerConfig,
    pub enclave_cli: PathBuf,
    pub enclave_args: Vec<String>,
    pub enclave_timeout: Duration,
    pub signer_uri: String,
    pub signer_pem_path: Option<PathBuf>,
    pub asset_payload: String,
    pub secret: String,
    pub balance_check: BalanceCheck,
    pub settlement: Settlement,
    /// Policy for inclusion and finality polling
    pub poll: PollPolicy,
    pub asset_ids: AssetIdStrategy,
    pub connect_retry: RetryPolicy,
    pub journal_dir: Option<PathBuf>,
    pub host: String,
    pub port: u16,
}

impl CheckerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let registry_address =
            var(ASSET_REGISTRY_ENV).ok_or(ConfigError::Missing(ASSET_REGISTRY_ENV))?;
        let ledger = LedgerConfig {
            rpc_url: var(LEDGER_RPC_URL_ENV).unwrap_or_else(|| DEFAULT_LEDGER_URL.to_string()),
            registry_address,
            balance_scale: parse_or(&var, BALANCE_SCALE_ENV, DEFAULT_BALANCE_SCALE)?,
        };

        let poll_default = PollPolicy::default();
        let poll = PollPolicy {
            initial_interval: interval_ms(
                &var,
                POLL_INITIAL_MS_ENV,
                poll_default.initial_interval,
            )?,
            max_interval: interval_ms(&var, POLL_MAX_MS_ENV, poll_default.max_interval)?,
            timeout: Duration::from_secs(parse_or(
                &var,
                FINALITY_TIMEOUT_SECS_ENV,
                poll_default.timeout.as_secs(),
            )?),
        };

        let settlement = match var(SETTLEMENT_MODE_ENV).as_deref().map(str::trim) {
            None | Some("finality") => Settlement::Finality(poll.clone()),
            Some("fixed") => Settlement::Fixed(Duration::from_secs(parse_or(
                &var,
                SETTLEMENT_DELAY_SECS_ENV,
                DEFAULT_SETTLEMENT_DELAY.as_secs(),
            )?)),
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: SETTLEMENT_MODE_ENV,
                    value: other.to_string(),
                    reason: "expected `finality` or `fixed`".to_string(),
                })
            }
        };

        let mode = match var(BALANCE_CHECK_ENV).as_deref().map(str::trim) {
            None | Some("strict") => BalanceMode::Strict,
            Some("advisory") => BalanceMode::Advisory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: BALANCE_CHECK_ENV,
                    value: other.to_string(),
                    reason: "expected `strict` or `advisory`".to_string(),
                })
            }
        };
        let tolerance: f64 = parse_or(&var, BALANCE_TOLERANCE_ENV, 0.0)?;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(ConfigError::Invalid {
                var: BALANCE_TOLERANCE_ENV,
                value: tolerance.to_string(),
                reason: "must be a non-negative number".to_string(),
            });
        }

        let asset_ids = match var(ASSET_ID_BASELINE_ENV) {
            Some(_) => AssetIdStrategy::Sequential {
                baseline: parse_or(&var, ASSET_ID_BASELINE_ENV, 0)?,
            },
            None => AssetIdStrategy::Captured,
        };

        let retry_default = RetryPolicy::default();
        let connect_retry = RetryPolicy {
            max_attempts: parse_or(&var, CONNECT_RETRIES_ENV, retry_default.max_attempts)?,
            backoff: Duration::from_millis(parse_or(
                &var,
                CONNECT_RETRY_BACKOFF_MS_ENV,
                retry_default.backoff.as_millis() as u64,
            )?),
        };

        Ok(Self {
            ledger,
            enclave_cli: PathBuf::from(
                var(ENCLAVE_CLI_ENV).unwrap_or_else(|| DEFAULT_ENCLAVE_CLI.to_string()),
            ),
            enclave_args: var(ENCLAVE_CLI_ARGS_ENV)
                .map(|args| args.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            enclave_timeout: Duration::from_secs(parse_or(
                &var,
                ENCLAVE_TIMEOUT_SECS_ENV,
                crate::enclave::cli::DEFAULT_INVOCATION_TIMEOUT.as_secs(),
            )?),
            signer_uri: var(SIGNER_URI_ENV).unwrap_or_else(|| DEFAULT_SIGNER_URI.to_string()),
            signer_pem_path: var(SIGNER_PEM_PATH_ENV).map(PathBuf::from),
            asset_payload: var(ASSET_PAYLOAD_ENV)
                .unwrap_or_else(|| DEFAULT_ASSET_PAYLOAD.to_string()),
            secret: var(SECRET_VALUE_ENV).unwrap_or_else(|| DEFAULT_SECRET.to_string()),
            balance_check: BalanceCheck { mode, tolerance },
            settlement,
            poll,
            asset_ids,
            connect_retry,
            journal_dir: var(RUN_JOURNAL_DIR_ENV).map(PathBuf::from),
            host: var(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or(&var, PORT_ENV, DEFAULT_PORT)?,
        })
    }

    /// Resolve the configured signer, reading the PEM file if one is set.
    pub fn load_signer(&self) -> Result<LedgerSigner, ConfigError> {
        let signer = match &self.signer_pem_path {
            Some(path) => {
                let bytes = std::fs::read(path).map_err(|e| ConfigError::Io {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
                LedgerSigner::from_pem(&bytes, self.signer_uri.clone())
            }
            None => LedgerSigner::from_uri(&self.signer_uri),
        };
        signer.map_err(|e| ConfigError::Signer(e.to_string()))
    }

    /// Unconnected ledger client; the node is dialed on first use.
    pub fn chain_client(&self) -> ChainClient {
        ChainClient::new(self.ledger.clone(), Arc::new(EvmConnector))
            .with_connect_retry(self.connect_retry.clone())
            .with_inclusion_poll(self.poll.clone())
    }

    pub fn enclave_executor(&self) -> CliExecutor {
        CliExecutor::new(self.enclave_cli.clone())
            .with_leading_args(self.enclave_args.clone())
            .with_timeout(self.enclave_timeout)
    }

    pub fn check_settings(&self) -> Result<CheckSettings, ConfigError> {
        Ok(CheckSettings {
            signer: self.load_signer()?,
            asset_payload: self.asset_payload.clone(),
            secret: self.secret.clone(),
            balance_check: self.balance_check.clone(),
            settlement: self.settlement.clone(),
            asset_ids: self.asset_ids,
        })
    }

    /// Assemble the checker against the configured node and enclave CLI.
    pub fn build_checker(&self) -> Result<ConsistencyChecker, ConfigError> {
        let checker = ConsistencyChecker::new(
            Arc::new(self.chain_client()),
            Arc::new(self.enclave_executor()),
            self.check_settings()?,
        );

        Ok(match &self.journal_dir {
            Some(dir) => checker.with_journal(RunJournal::new(dir.clone())),
            None => checker,
        })
    }
}

fn parse_or<T, V>(var: &V, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var: name,
            value,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Non-zero polling interval in milliseconds.
fn interval_ms<V>(var: &V, name: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    V: Fn(&str) -> Option<String>,
{
    let ms: u64 = parse_or(var, name, default.as_millis() as u64)?;
    if ms == 0 {
        return Err(ConfigError::Invalid {
            var: name,
            value: ms.to_string(),
            reason: "polling interval must be at least 1 ms".to_string(),
        });
    }
    Ok(Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const REGISTRY: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

    fn load(vars: &[(&str, &str)]) -> Result<CheckerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CheckerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_only_registry_is_set() {
        let config = load(&[(ASSET_REGISTRY_ENV, REGISTRY)]).unwrap();

        assert_eq!(config.ledger.rpc_url, DEFAULT_LEDGER_URL);
        assert_eq!(config.ledger.registry_address, REGISTRY);
        assert_eq!(config.ledger.balance_scale, 1_000_000);
        assert_eq!(config.enclave_cli, PathBuf::from("enclave-cli"));
        assert!(config.enclave_args.is_empty());
        assert_eq!(config.enclave_timeout, Duration::from_secs(60));
        assert_eq!(config.signer_uri, "//Alice");
        assert_eq!(config.asset_payload, "test");
        assert_eq!(config.secret, "top_secret");
        assert_eq!(config.balance_check, BalanceCheck::default());
        assert_eq!(config.settlement, Settlement::Finality(PollPolicy::default()));
        assert_eq!(config.asset_ids, AssetIdStrategy::Captured);
        assert_eq!(config.connect_retry, RetryPolicy::default());
        assert!(config.journal_dir.is_none());
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn registry_is_required() {
        assert!(matches!(
            load(&[]),
            Err(ConfigError::Missing(ASSET_REGISTRY_ENV))
        ));
        assert!(matches!(
            load(&[(ASSET_REGISTRY_ENV, "  ")]),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            (ASSET_REGISTRY_ENV, REGISTRY),
            (LEDGER_RPC_URL_ENV, "http://node:8545"),
            (ENCLAVE_CLI_ARGS_ENV, " -p 9944  -P 2000 "),
            (SETTLEMENT_MODE_ENV, "fixed"),
            (SETTLEMENT_DELAY_SECS_ENV, "3"),
            (BALANCE_CHECK_ENV, "advisory"),
            (BALANCE_TOLERANCE_ENV, "0.5"),
            (ASSET_ID_BASELINE_ENV, "7"),
            (CONNECT_RETRIES_ENV, "5"),
            (RUN_JOURNAL_DIR_ENV, "/tmp/journal"),
        ])
        .unwrap();

        assert_eq!(config.ledger.rpc_url, "http://node:8545");
        assert_eq!(config.enclave_args, vec!["-p", "9944", "-P", "2000"]);
        assert_eq!(config.settlement, Settlement::Fixed(Duration::from_secs(3)));
        assert_eq!(config.balance_check.mode, BalanceMode::Advisory);
        assert_eq!(config.balance_check.tolerance, 0.5);
        assert_eq!(config.asset_ids, AssetIdStrategy::Sequential { baseline: 7 });
        assert_eq!(config.connect_retry.max_attempts, 5);
        assert_eq!(config.journal_dir, Some(PathBuf::from("/tmp/journal")));
    }

    #[test]
    fn finality_settlement_uses_poll_settings() {
        let config = load(&[
            (ASSET_REGISTRY_ENV, REGISTRY),
            (POLL_INITIAL_MS_ENV, "100"),
            (POLL_MAX_MS_ENV, "1000"),
            (FINALITY_TIMEOUT_SECS_ENV, "30"),
        ])
        .unwrap();

        let expected = PollPolicy {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_millis(1000),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(config.settlement, Settlement::Finality(expected.clone()));
        assert_eq!(config.poll, expected);
    }

    #[test]
    fn zero_poll_intervals_are_rejected() {
        let err = load(&[(ASSET_REGISTRY_ENV, REGISTRY), (POLL_INITIAL_MS_ENV, "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: POLL_INITIAL_MS_ENV, .. }));

        let err = load(&[(ASSET_REGISTRY_ENV, REGISTRY), (POLL_MAX_MS_ENV, "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: POLL_MAX_MS_ENV, .. }));
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = load(&[(ASSET_REGISTRY_ENV, REGISTRY), (PORT_ENV, "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: PORT_ENV, .. }));

        let err = load(&[(ASSET_REGISTRY_ENV, REGISTRY), (SETTLEMENT_MODE_ENV, "soon")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: SETTLEMENT_MODE_ENV, .. }));

        let err = load(&[(ASSET_REGISTRY_ENV, REGISTRY), (BALANCE_TOLERANCE_ENV, "-1")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: BALANCE_TOLERANCE_ENV, .. }));
    }

    #[test]
    fn signer_resolves_from_uri() {
        let config = load(&[(ASSET_REGISTRY_ENV, REGISTRY), (SIGNER_URI_ENV, "//Bob")]).unwrap();
        let signer = config.load_signer().unwrap();

        assert_eq!(signer.uri(), "//Bob");
        assert_eq!(
            signer.address().to_string(),
            "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"
        );
    }

    #[test]
    fn unknown_signer_is_a_config_error() {
        let config = load(&[(ASSET_REGISTRY_ENV, REGISTRY), (SIGNER_URI_ENV, "//Mallory")]).unwrap();
        assert!(matches!(config.load_signer(), Err(ConfigError::Signer(_))));
    }

    #[test]
    fn missing_pem_file_is_an_io_error() {
        let config = load(&[
            (ASSET_REGISTRY_ENV, REGISTRY),
            (SIGNER_PEM_PATH_ENV, "/nonexistent/signer.pem"),
        ])
        .unwrap();
        assert!(matches!(config.load_signer(), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn build_checker_does_not_dial() {
        let config = load(&[(ASSET_REGISTRY_ENV, REGISTRY)]).unwrap();
        let checker = config.build_checker().unwrap();

        assert!(!checker.chain().is_connected());
        assert_eq!(checker.settings().secret, "top_secret");
    }
}
