// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request/response protocol spoken with the enclave command interface.
//!
//! Requests map to one subcommand plus positional arguments, separated by
//! `--` so values starting with `-` are never read as flags. Every invocation
//! prints a single JSON object `{"status": bool, "result": ...}` on stdout.
//! The object may be pretty-printed and may be preceded by free-form text
//! (the CLI prints a human-readable prefix on some failures).

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ExecutionError;
use crate::chain::AssetId;

/// Version of the subcommand layout produced by [`EnclaveRequest::args`].
pub const PROTOCOL_VERSION: u32 = 2;

/// A single enclave operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnclaveRequest {
    /// On-chain balance as seen through the enclave CLI
    Balance { account: String },
    /// Store a secret for an asset
    StoreSecret {
        account: String,
        asset_id: AssetId,
        secret: String,
    },
    /// Retrieve the secret stored for an asset
    RetrieveSecret { account: String, asset_id: AssetId },
    /// Asset data as seen through the enclave CLI
    AssetData { asset_id: AssetId },
}

impl EnclaveRequest {
    /// CLI subcommand name.
    pub fn subcommand(&self) -> &'static str {
        match self {
            Self::Balance { .. } => "balance",
            Self::StoreSecret { .. } => "store-nft-secret",
            Self::RetrieveSecret { .. } => "retrieve-nft-secret",
            Self::AssetData { .. } => "nft-data",
        }
    }

    /// Subcommand, `--`, then its positional arguments.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![self.subcommand().to_string(), "--".to_string()];
        match self {
            Self::Balance { account } => args.push(account.clone()),
            Self::StoreSecret {
                account,
                asset_id,
                secret,
            } => {
                args.push(account.clone());
                args.push(asset_id.to_string());
                args.push(secret.clone());
            }
            Self::RetrieveSecret { account, asset_id } => {
                args.push(account.clone());
                args.push(asset_id.to_string());
            }
            Self::AssetData { asset_id } => args.push(asset_id.to_string()),
        }
        args
    }

    /// Asset the request refers to, if any.
    pub fn asset_id(&self) -> Option<AssetId> {
        match self {
            Self::Balance { .. } => None,
            Self::StoreSecret { asset_id, .. }
            | Self::RetrieveSecret { asset_id, .. }
            | Self::AssetData { asset_id } => Some(*asset_id),
        }
    }
}

/// Parsed enclave response.
///
/// `status: false` is an application-level failure reported by a successful
/// invocation; it is not an [`ExecutionError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EnclaveResponse {
    pub status: bool,
    /// Result payload. Non-string JSON results are kept as compact JSON text.
    pub result: String,
}

#[derive(Deserialize)]
struct RawResponse {
    status: bool,
    result: serde_json::Value,
}

impl EnclaveResponse {
    pub fn ok(result: impl Into<String>) -> Self {
        Self {
            status: true,
            result: result.into(),
        }
    }

    pub fn failed(result: impl Into<String>) -> Self {
        Self {
            status: false,
            result: result.into(),
        }
    }

    /// Parse the first `{status, result}` object found in `stdout`.
    pub fn parse(stdout: &str) -> Result<Self, ExecutionError> {
        for (start, _) in stdout.match_indices('{') {
            let mut stream =
                serde_json::Deserializer::from_str(&stdout[start..]).into_iter::<RawResponse>();
            if let Some(Ok(raw)) = stream.next() {
                let result = match raw.result {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Null => {
                        return Err(ExecutionError::Parse(format!(
                            "response with status {} carries a null result",
                            raw.status
                        )))
                    }
                    other => other.to_string(),
                };
                return Ok(Self {
                    status: raw.status,
                    result,
                });
            }
        }

        let preview: String = stdout.trim().chars().take(200).collect();
        Err(ExecutionError::Parse(format!(
            "no status/result object in output: {preview:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_request_args() {
        let request = EnclaveRequest::StoreSecret {
            account: "//Alice".to_string(),
            asset_id: 0,
            secret: "top_secret".to_string(),
        };
        assert_eq!(
            request.args(),
            vec!["store-nft-secret", "--", "//Alice", "0", "top_secret"]
        );
        assert_eq!(request.asset_id(), Some(0));
    }

    #[test]
    fn dash_prefixed_secret_stays_positional() {
        let request = EnclaveRequest::StoreSecret {
            account: "//Alice".to_string(),
            asset_id: 1,
            secret: "--help".to_string(),
        };
        let args = request.args();
        assert_eq!(args[1], "--");
        assert_eq!(args.last().map(String::as_str), Some("--help"));
    }

    #[test]
    fn other_request_args() {
        assert_eq!(
            EnclaveRequest::Balance {
                account: "//Alice".to_string()
            }
            .args(),
            vec!["balance", "--", "//Alice"]
        );
        assert_eq!(
            EnclaveRequest::RetrieveSecret {
                account: "//Bob".to_string(),
                asset_id: 4
            }
            .args(),
            vec!["retrieve-nft-secret", "--", "//Bob", "4"]
        );
        assert_eq!(
            EnclaveRequest::AssetData { asset_id: 9 }.args(),
            vec!["nft-data", "--", "9"]
        );
    }

    #[test]
    fn parses_pretty_printed_response() {
        let stdout = "{\n \"status\": true,\n \"result\": \"top_secret\"\n}\n";
        assert_eq!(
            EnclaveResponse::parse(stdout).unwrap(),
            EnclaveResponse::ok("top_secret")
        );
    }

    #[test]
    fn skips_leading_noise() {
        let stdout = "Failed to store NFT secret{\n \"status\": false,\n \"result\": \"not the owner\"\n}";
        assert_eq!(
            EnclaveResponse::parse(stdout).unwrap(),
            EnclaveResponse::failed("not the owner")
        );
    }

    #[test]
    fn keeps_non_string_results_as_json() {
        let balance = EnclaveResponse::parse(r#"{"status": true, "result": 1500000}"#).unwrap();
        assert_eq!(balance.result, "1500000");

        let data = EnclaveResponse::parse(
            r#"{"status": true, "result": {"owner": "0xabc", "offchain_uri": "test"}}"#,
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&data.result).unwrap();
        assert_eq!(value["offchain_uri"], "test");
    }

    #[test]
    fn empty_result_is_preserved() {
        let response = EnclaveResponse::parse(r#"{"status": true, "result": ""}"#).unwrap();
        assert_eq!(response, EnclaveResponse::ok(""));
    }

    #[test]
    fn brace_in_noise_does_not_hide_response() {
        let stdout = "warning {unbalanced\n{\"status\": true, \"result\": \"x\"}";
        assert_eq!(EnclaveResponse::parse(stdout).unwrap(), EnclaveResponse::ok("x"));
    }

    #[test]
    fn unparseable_output_is_an_error() {
        assert!(matches!(
            EnclaveResponse::parse("No subcommand matched"),
            Err(ExecutionError::Parse(_))
        ));
        assert!(matches!(
            EnclaveResponse::parse(r#"{"result": "missing status"}"#),
            Err(ExecutionError::Parse(_))
        ));
        assert!(matches!(
            EnclaveResponse::parse(""),
            Err(ExecutionError::Parse(_))
        ));
    }

    #[test]
    fn missing_or_null_result_is_an_error() {
        assert!(matches!(
            EnclaveResponse::parse(r#"{"status": true}"#),
            Err(ExecutionError::Parse(_))
        ));
        assert!(matches!(
            EnclaveResponse::parse(r#"{"status": true, "result": null}"#),
            Err(ExecutionError::Parse(_))
        ));
        assert!(matches!(
            EnclaveResponse::parse("stored\n{\"status\": false, \"result\": null}"),
            Err(ExecutionError::Parse(_))
        ));
    }
}
