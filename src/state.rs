// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::checker::{ConsistencyChecker, RunReport};

#[derive(Clone)]
pub struct AppState {
    pub checker: Arc<ConsistencyChecker>,
    /// Report of the most recent run, passed or failed
    pub latest: Arc<RwLock<Option<RunReport>>>,
    /// Held for the duration of a run; runs never overlap
    pub run_lock: Arc<Mutex<()>>,
    /// Cancelled on shutdown; aborts an in-flight run
    pub shutdown: CancellationToken,
    /// Enclave CLI checked by the readiness probe
    pub enclave_program: Option<PathBuf>,
}

impl AppState {
    pub fn new(checker: ConsistencyChecker, shutdown: CancellationToken) -> Self {
        Self {
            checker: Arc::new(checker),
            latest: Arc::new(RwLock::new(None)),
            run_lock: Arc::new(Mutex::new(())),
            shutdown,
            enclave_program: None,
        }
    }

    pub fn with_enclave_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.enclave_program = Some(program.into());
        self
    }
}
