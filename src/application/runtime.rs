// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Runtime Context
//!
//! This module sets up the resources that live for one run:
//! 1. **Thread Pool**: a dedicated `rayon` pool with one thread per job,
//!    optionally capped by `max_parallel_jobs`.
//! 2. **Cancellation**: a shared flag raised by SIGINT/SIGTERM and polled by
//!    every worker between stages and between features.
//!
//! Connections are not pooled: every job opens and owns its own.

use crate::config::AppConfig;
use crate::domain::errors::{ExtractError, Result};
use log::{info, warn};
use rayon::ThreadPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable handle on the process-wide cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the flag is raised.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ExtractError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// `RuntimeContext` holds the shared resources of a run.
pub struct RuntimeContext {
    pub pool: ThreadPool,
    pub num_threads: usize,
    pub cancel: CancellationToken,
}

impl RuntimeContext {
    /// Builds the worker pool for `job_count` jobs.
    pub fn init(config: &AppConfig, job_count: usize) -> Result<Self> {
        let mut num_threads = job_count.max(1);
        if let Some(cap) = config.max_parallel_jobs {
            num_threads = num_threads.min(cap.max(1));
        }
        info!(
            "Initializing worker pool with {} thread(s) for {} job(s)",
            num_threads, job_count
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("wfs-job-{}", i))
            .build()
            .map_err(|e| {
                ExtractError::ConfigLoadError(format!("Failed to create worker pool: {}", e))
            })?;

        Ok(Self {
            pool,
            num_threads,
            cancel: CancellationToken::new(),
        })
    }

    /// Routes SIGINT/SIGTERM to the cancellation flag. Can only be installed
    /// once per process.
    pub fn install_signal_handler(&self) -> Result<()> {
        let cancel = self.cancel.clone();
        ctrlc::set_handler(move || {
            warn!("Termination requested; cancelling running jobs");
            cancel.cancel();
        })
        .map_err(|e| {
            ExtractError::ConfigLoadError(format!("Failed to install signal handler: {}", e))
        })
    }
}
