// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Enclave executor backed by the enclave command-line interface.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::protocol::{EnclaveRequest, EnclaveResponse, PROTOCOL_VERSION};
use super::{EnclaveExecutor, ExecutionError};

/// Default per-invocation timeout.
pub const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Spawns the enclave CLI once per request.
#[derive(Debug, Clone)]
pub struct CliExecutor {
    program: PathBuf,
    /// Arguments placed before the subcommand (node/worker endpoints etc.)
    leading_args: Vec<String>,
    timeout: Duration,
}

impl CliExecutor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            timeout: DEFAULT_INVOCATION_TIMEOUT,
        }
    }

    pub fn with_leading_args(mut self, args: Vec<String>) -> Self {
        self.leading_args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

#[async_trait]
impl EnclaveExecutor for CliExecutor {
    async fn invoke(&self, request: &EnclaveRequest) -> Result<EnclaveResponse, ExecutionError> {
        let program = self.program_name();

        let mut command = Command::new(&self.program);
        command
            .args(&self.leading_args)
            .args(request.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(
            program = %program,
            subcommand = request.subcommand(),
            asset_id = ?request.asset_id(),
            protocol_version = PROTOCOL_VERSION,
            "Invoking enclave CLI"
        );

        let child = command.spawn().map_err(|e| ExecutionError::Spawn {
            program: program.clone(),
            reason: e.to_string(),
        })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ExecutionError::Timeout {
                program: program.clone(),
                timeout: self.timeout,
            })?
            .map_err(|e| ExecutionError::Io {
                program: program.clone(),
                reason: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            return Err(ExecutionError::Exit {
                program,
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        if !stderr.trim().is_empty() {
            tracing::debug!(subcommand = request.subcommand(), stderr = %stderr.trim(), "Enclave CLI stderr");
        }

        let response = EnclaveResponse::parse(&stdout)?;
        tracing::debug!(
            subcommand = request.subcommand(),
            status = response.status,
            result_len = response.result.len(),
            "Enclave CLI responded"
        );

        Ok(response)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    /// Executor running `script` through `/bin/sh -c`; request arguments
    /// arrive as `$1..`.
    fn shell(script: &str) -> CliExecutor {
        CliExecutor::new("/bin/sh")
            .with_leading_args(vec!["-c".to_string(), script.to_string(), "enclave-cli".to_string()])
            .with_timeout(Duration::from_secs(5))
    }

    fn retrieve() -> EnclaveRequest {
        EnclaveRequest::RetrieveSecret {
            account: "//Alice".to_string(),
            asset_id: 0,
        }
    }

    #[tokio::test]
    async fn passes_subcommand_and_arguments() {
        let executor = shell(r#"printf '{"status": true, "result": "%s"}' "$*""#);

        let response = executor
            .invoke(&EnclaveRequest::StoreSecret {
                account: "//Alice".to_string(),
                asset_id: 3,
                secret: "top_secret".to_string(),
            })
            .await
            .unwrap();

        assert!(response.status);
        assert_eq!(response.result, "store-nft-secret -- //Alice 3 top_secret");
    }

    /// Stores `$5` (the secret after `store-nft-secret -- account id`) in
    /// `secret.raw`; retrieve prints the JSON-encoded copy in `secret.json`.
    const SECRET_STORE_SCRIPT: &str = r#"
        dir="$(dirname "$0")"
        case "$1" in
            store-nft-secret)
                printf '%s' "$5" > "$dir/secret.raw"
                printf '{"status": true, "result": ""}'
                ;;
            retrieve-nft-secret)
                printf 'Retrieved secret\n{"status": true, "result": %s}' "$(cat "$dir/secret.json")"
                ;;
            *) exit 2 ;;
        esac
    "#;

    #[tokio::test]
    async fn secrets_round_trip_verbatim() {
        let secrets = [
            "top_secret",
            "two words  and a tab\t",
            r#"quotes " and ' and \ backslash"#,
            "ünïcödé 秘密 🔑",
            "-n",
            "--help",
            "-- trailing",
        ];

        for secret in secrets {
            let dir = tempfile::TempDir::new().unwrap();
            let executor = CliExecutor::new("/bin/sh")
                .with_leading_args(vec![
                    "-c".to_string(),
                    SECRET_STORE_SCRIPT.to_string(),
                    dir.path().join("enclave-cli").display().to_string(),
                ])
                .with_timeout(Duration::from_secs(5));

            let stored = executor
                .invoke(&EnclaveRequest::StoreSecret {
                    account: "//Alice".to_string(),
                    asset_id: 0,
                    secret: secret.to_string(),
                })
                .await
                .unwrap();
            assert_eq!(stored, EnclaveResponse::ok(""), "store of {secret:?}");

            let raw = std::fs::read(dir.path().join("secret.raw")).unwrap();
            assert_eq!(raw, secret.as_bytes(), "argument for {secret:?}");
            std::fs::write(
                dir.path().join("secret.json"),
                serde_json::to_string(secret).unwrap(),
            )
            .unwrap();

            let retrieved = executor.invoke(&retrieve()).await.unwrap();
            assert_eq!(retrieved, EnclaveResponse::ok(secret), "retrieve of {secret:?}");
        }
    }

    #[tokio::test]
    async fn application_failure_is_not_an_execution_error() {
        let executor = shell(
            r#"printf 'Failed to store NFT secret{\n "status": false,\n "result": "not the owner"\n}\n'"#,
        );

        let response = executor.invoke(&retrieve()).await.unwrap();
        assert_eq!(response, EnclaveResponse::failed("not the owner"));
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_execution_error() {
        let executor = shell("echo boom >&2; exit 3");

        match executor.invoke(&retrieve()).await.unwrap_err() {
            ExecutionError::Exit { stderr, .. } => assert_eq!(stderr, "boom"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn crash_with_valid_looking_output_still_fails() {
        let executor = shell(r#"printf '{"status": true, "result": ""}'; kill -9 $$"#);

        assert!(matches!(
            executor.invoke(&retrieve()).await,
            Err(ExecutionError::Exit { .. })
        ));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let executor = CliExecutor::new("/nonexistent/enclave-cli");

        assert!(matches!(
            executor.invoke(&retrieve()).await,
            Err(ExecutionError::Spawn { .. })
        ));
    }

    #[tokio::test]
    async fn garbage_output_is_a_parse_error() {
        let executor = shell("echo 'No subcommand matched'");

        assert!(matches!(
            executor.invoke(&retrieve()).await,
            Err(ExecutionError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn slow_process_times_out() {
        let executor = shell("sleep 5").with_timeout(Duration::from_millis(100));

        assert!(matches!(
            executor.invoke(&retrieve()).await,
            Err(ExecutionError::Timeout { .. })
        ));
    }
}
