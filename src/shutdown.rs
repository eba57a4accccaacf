use anyhow::{Context, Result};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::dispatch::{AgentPool, TrackerSnapshot};
use crate::observability::{DispatchStats, OperationTimer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ShutdownReason {
    /// Workload submitted and every task settled
    Drained,
    /// SIGINT / Ctrl-C
    Signal,
    GraceExpired,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShutdownReport {
    pub reason: ShutdownReason,
    pub tasks: TrackerSnapshot,
    pub stats: DispatchStats,
}

/// Runs a workload against a pool and stops the pool when the work drains,
/// a shutdown signal arrives, or the grace period runs out.
pub struct ShutdownCoordinator {
    pool: Arc<AgentPool>,
    grace: Option<Duration>,
    listen_for_signals: bool,
}

impl ShutdownCoordinator {
    pub fn new(pool: Arc<AgentPool>) -> Self {
        Self {
            pool,
            grace: None,
            listen_for_signals: true,
        }
    }

    /// Stop the pool after `grace` even if tasks are still moving
    pub fn with_grace(mut self, grace: Option<Duration>) -> Self {
        self.grace = grace;
        self
    }

    pub fn without_signal_handler(mut self) -> Self {
        self.listen_for_signals = false;
        self
    }

    /// Drive `workload` (typically the submission loop), then wait for the pool
    /// to drain. Always stops the pool before returning.
    pub async fn run<F>(self, workload: F) -> Result<ShutdownReport>
    where
        F: Future<Output = ()>,
    {
        let signal = wait_for_signal(self.listen_for_signals);
        self.run_until(workload, signal).await
    }

    async fn run_until<F, S>(self, workload: F, signal: S) -> Result<ShutdownReport>
    where
        F: Future<Output = ()>,
        S: Future<Output = Result<()>>,
    {
        let timer = OperationTimer::new("fleet_run");
        let pool = Arc::clone(&self.pool);
        let drained = async {
            workload.await;
            pool.wait_all().await
        };

        let outcome = tokio::select! {
            _ = drained => Ok(ShutdownReason::Drained),
            result = signal => result.map(|()| {
                info!("Shutdown signal received, cancelling in-flight moves");
                ShutdownReason::Signal
            }),
            _ = sleep_for_grace(self.grace) => {
                warn!(
                    pending = self.pool.tracker().pending(),
                    "Grace period expired, cancelling in-flight moves"
                );
                Ok(ShutdownReason::GraceExpired)
            }
        };

        // Stop even when the signal listener failed
        self.pool.stop().await;
        // Movers settle their tasks before exiting, so this returns promptly
        let tasks = self.pool.wait_all().await;
        timer.finish();

        let reason = outcome?;
        Ok(ShutdownReport {
            reason,
            tasks,
            stats: self.pool.metrics(),
        })
    }
}

async fn wait_for_signal(enabled: bool) -> Result<()> {
    if !enabled {
        return std::future::pending().await;
    }
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")
}

async fn sleep_for_grace(grace: Option<Duration>) {
    match grace {
        Some(grace) => tokio::time::sleep(grace).await,
        None => std::future::pending().await,
    }
}
