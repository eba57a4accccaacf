// Agent pool - greedy nearest-agent dispatch over a fixed fleet
// Selection reserves every idle agent, keeps the cheapest and releases the rest
// before the next await point; waiting for a free agent is notification driven.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use super::errors::{DispatchError, PoolError};
use super::selection::{select_candidate, Candidate};
use super::tracker::{CompletionTracker, TaskOutcome, TrackerSnapshot};
use crate::agents::movement::{run_agent, MoverContext};
use crate::agents::{Agent, Reservation};
use crate::config::FleetConfig;
use crate::events::{EventBus, FleetEvent};
use crate::location::{Location, TaskId};
use crate::observability::{DispatchMetrics, DispatchStats};
use crate::priority::Priority;
use crate::telemetry::{create_dispatch_span, generate_correlation_id};

enum PoolPhase {
    Created,
    Running(Vec<JoinHandle<()>>),
    Stopped,
}

/// Fixed fleet of agents plus the dispatcher that feeds them
pub struct AgentPool {
    agents: Vec<Agent>,
    tracker: Arc<CompletionTracker>,
    idle: Arc<Notify>,
    cancel: CancellationToken,
    events: Arc<EventBus>,
    metrics: Arc<DispatchMetrics>,
    phase: Mutex<PoolPhase>,
    next_task: AtomicU64,
    submit_timeout: Option<Duration>,
}

impl AgentPool {
    /// Create `agent_count` agents at the origin with ids `1..=agent_count`.
    /// An empty `priorities` slice ranks agents in pool order.
    pub fn new(agent_count: usize, priorities: &[i64]) -> Result<Self, PoolError> {
        Self::with_start_positions(agent_count, priorities, &[])
    }

    /// Like [`AgentPool::new`] with one start position per agent
    /// (empty means everyone starts at the origin).
    pub fn with_start_positions(
        agent_count: usize,
        priorities: &[i64],
        start_positions: &[Location],
    ) -> Result<Self, PoolError> {
        if agent_count == 0 {
            return Err(PoolError::NoAgents);
        }
        if !priorities.is_empty() && priorities.len() != agent_count {
            return Err(PoolError::PriorityCountMismatch {
                expected: agent_count,
                actual: priorities.len(),
            });
        }
        if !start_positions.is_empty() && start_positions.len() != agent_count {
            return Err(PoolError::PositionCountMismatch {
                expected: agent_count,
                actual: start_positions.len(),
            });
        }

        let idle = Arc::new(Notify::new());
        let agents = (0..agent_count)
            .map(|index| {
                let priority = priorities
                    .get(index)
                    .map(|rank| Priority::new(*rank))
                    .unwrap_or_else(|| Priority::from_index(index));
                let start = start_positions.get(index).copied().unwrap_or(Location::ORIGIN);
                Agent::new(index as u64 + 1, priority, start, Arc::clone(&idle))
            })
            .collect();

        Ok(Self {
            agents,
            tracker: Arc::new(CompletionTracker::new()),
            idle,
            cancel: CancellationToken::new(),
            events: Arc::new(EventBus::new()),
            metrics: Arc::new(DispatchMetrics::new()),
            phase: Mutex::new(PoolPhase::Created),
            next_task: AtomicU64::new(1),
            submit_timeout: None,
        })
    }

    pub fn from_config(config: &FleetConfig) -> Result<Self, PoolError> {
        let pool = Self::with_start_positions(
            config.agents.count,
            &config.agents.priorities,
            &config.agents.start_positions,
        )?;
        Ok(pool.with_submit_timeout(config.dispatch.submit_timeout()))
    }

    /// Default deadline applied by [`AgentPool::submit`]
    pub fn with_submit_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.submit_timeout = timeout;
        self
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn tracker(&self) -> &CompletionTracker {
        &self.tracker
    }

    pub fn metrics(&self) -> DispatchStats {
        self.metrics.get_stats()
    }

    /// Receive every progress event emitted from now on. See
    /// [`EventBus::subscribe`]: the receiver must be drained or dropped.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<FleetEvent> {
        self.events.subscribe()
    }

    /// Spawn one movement task per agent. Must be called within a tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called more than once.
    pub fn start(&self, step_delay: Duration) {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        assert!(
            matches!(*phase, PoolPhase::Created),
            "agent pool started twice"
        );

        let ctx = MoverContext {
            step_delay,
            cancel: self.cancel.clone(),
            tracker: Arc::clone(&self.tracker),
            events: Arc::clone(&self.events),
            metrics: Arc::clone(&self.metrics),
        };

        let handles = self
            .agents
            .iter()
            .filter_map(|agent| {
                let inbox = agent.take_inbox()?;
                Some(tokio::spawn(run_agent(agent.clone(), inbox, ctx.clone())))
            })
            .collect();

        info!(
            agents = self.agents.len(),
            step_delay_ms = step_delay.as_millis() as u64,
            "Agent pool started"
        );
        *phase = PoolPhase::Running(handles);
    }

    /// Dispatch `destination` using the pool's default submit timeout
    pub async fn submit(&self, destination: Location) -> Result<TaskId, DispatchError> {
        let deadline = self.submit_timeout.map(|timeout| Instant::now() + timeout);
        self.submit_with_deadline(destination, deadline).await
    }

    /// Dispatch `destination` to the cheapest available agent, waiting for one to
    /// free up until `deadline`. Returns once the destination sits in the chosen
    /// agent's mailbox.
    pub async fn submit_with_deadline(
        &self,
        destination: Location,
        deadline: Option<Instant>,
    ) -> Result<TaskId, DispatchError> {
        self.ensure_running()?;

        let pending = PendingTask::register(&self.tracker, &self.metrics);
        let task = self.next_task.fetch_add(1, Ordering::Relaxed);
        let correlation_id = generate_correlation_id();
        let span = create_dispatch_span("submit", Some(task), Some(&correlation_id));

        let result = self
            .dispatch(task, destination, deadline)
            .instrument(span)
            .await;

        match result {
            Ok(task) => {
                // The mover settles the task from here on
                pending.handed_off();
                Ok(task)
            }
            Err(e) => {
                if matches!(e, DispatchError::Timeout { .. }) {
                    self.metrics.record_timeout();
                }
                drop(pending);
                Err(e)
            }
        }
    }

    async fn dispatch(
        &self,
        task: TaskId,
        destination: Location,
        deadline: Option<Instant>,
    ) -> Result<TaskId, DispatchError> {
        let started = Instant::now();
        loop {
            if self.cancel.is_cancelled() {
                return Err(DispatchError::Stopped);
            }

            let released = self.idle.notified();
            tokio::pin!(released);
            // Arm before probing so a release during the probe still wakes us
            released.as_mut().enable();

            if let Some(reservation) = self.reserve_cheapest(destination) {
                let agent_id = reservation.agent_id();
                let cost = reservation.estimated_cost(destination);
                let agent = &self.agents[(agent_id - 1) as usize];
                agent.assign(reservation, task, destination)?;

                tracing::Span::current().record("agent.id", agent_id);
                self.metrics.record_assignment();
                info!(
                    task_id = task,
                    agent_id,
                    cost,
                    destination = %destination,
                    "Task assigned"
                );
                return Ok(task);
            }

            self.metrics.record_contention_wait();
            debug!(task_id = task, "No agent available, waiting for a release");

            tokio::select! {
                _ = &mut released => {}
                _ = self.cancel.cancelled() => return Err(DispatchError::Stopped),
                _ = sleep_until_deadline(deadline) => {
                    let waited_ms = started.elapsed().as_millis() as u64;
                    warn!(task_id = task, waited_ms, destination = %destination, "Submission timed out");
                    return Err(DispatchError::Timeout { destination, waited_ms });
                }
            }
        }
    }

    /// Reserve every idle agent, keep the preferred one, release the others
    fn reserve_cheapest(&self, destination: Location) -> Option<Reservation> {
        let mut reservations: Vec<Reservation> = self
            .agents
            .iter()
            .filter_map(Agent::try_reserve)
            .collect();

        let candidates: Vec<Candidate> = reservations.iter().map(Candidate::from).collect();
        let winner = select_candidate(&candidates, destination)?;
        let chosen = reservations.swap_remove(winner);
        // Dropping the losers returns them to Idle and wakes other submitters
        drop(reservations);
        Some(chosen)
    }

    /// Wait until every submitted task has settled
    pub async fn wait_all(&self) -> TrackerSnapshot {
        self.tracker.wait().await
    }

    pub async fn wait_all_timeout(&self, timeout: Duration) -> Result<TrackerSnapshot, DispatchError> {
        tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .map_err(|_| DispatchError::WaitTimeout {
                pending: self.tracker.pending(),
                waited_ms: timeout.as_millis() as u64,
            })
    }

    /// Cancel every movement task, wait for them to exit and mark all agents
    /// Stopped. In-flight tasks are settled as cancelled. Safe to call twice.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let previous = {
            let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *phase, PoolPhase::Stopped)
        };

        if let PoolPhase::Running(handles) = previous {
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Agent movement task ended abnormally");
                }
            }
        }

        for agent in &self.agents {
            agent.mark_stopped();
        }
        self.metrics.log_stats();
        info!("Agent pool stopped");
    }

    pub fn is_running(&self) -> bool {
        matches!(
            *self.phase.lock().unwrap_or_else(PoisonError::into_inner),
            PoolPhase::Running(_)
        ) && !self.cancel.is_cancelled()
    }

    fn ensure_running(&self) -> Result<(), DispatchError> {
        let phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        match *phase {
            PoolPhase::Created => Err(DispatchError::NotStarted),
            PoolPhase::Stopped => Err(DispatchError::Stopped),
            PoolPhase::Running(_) if self.cancel.is_cancelled() => Err(DispatchError::Stopped),
            PoolPhase::Running(_) => Ok(()),
        }
    }
}

/// One tracker unit owned by an in-progress submission. Settles as `Rejected`
/// when dropped before hand-off, which keeps `submit` cancel-safe.
struct PendingTask<'a> {
    tracker: &'a CompletionTracker,
    metrics: &'a DispatchMetrics,
    armed: bool,
}

impl<'a> PendingTask<'a> {
    fn register(tracker: &'a CompletionTracker, metrics: &'a DispatchMetrics) -> Self {
        tracker.add(1);
        metrics.record_submission();
        Self {
            tracker,
            metrics,
            armed: true,
        }
    }

    fn handed_off(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingTask<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.metrics.record_outcome(TaskOutcome::Rejected);
        if let Err(e) = self.tracker.done(TaskOutcome::Rejected) {
            tracing::error!(error = %e, "Completion tracker out of balance");
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
