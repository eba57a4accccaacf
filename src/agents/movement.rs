//! Step-wise movement toward a destination and the per-agent movement task.
//!
//! A path moves diagonally for `min(|dx|, |dy|)` steps and then along the
//! remaining axis, so its length is always the Chebyshev distance between the
//! endpoints. The movement task consumes one [`Assignment`] at a time, walks
//! its path, and settles the task with the completion tracker.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};

use super::agent::{Agent, Assignment};
use crate::dispatch::tracker::{CompletionTracker, TaskOutcome};
use crate::events::{EventBus, FleetEvent};
use crate::location::Location;
use crate::observability::DispatchMetrics;

/// Unit-step positions from `from` (exclusive) to `to` (inclusive)
#[derive(Debug, Clone)]
pub struct Path {
    current: Location,
    destination: Location,
}

impl Path {
    pub fn new(from: Location, to: Location) -> Self {
        Self {
            current: from,
            destination: to,
        }
    }

    /// Number of diagonal steps at the head of the path
    pub fn diagonal_steps(&self) -> u64 {
        let dx = self.current.x.abs_diff(self.destination.x);
        let dy = self.current.y.abs_diff(self.destination.y);
        dx.min(dy)
    }
}

impl Iterator for Path {
    type Item = Location;

    fn next(&mut self) -> Option<Location> {
        if self.current == self.destination {
            return None;
        }
        self.current = self.current.step_toward(self.destination);
        Some(self.current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.current.chebyshev_distance(self.destination) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Path {}

/// Everything a movement task shares with its pool
#[derive(Clone)]
pub(crate) struct MoverContext {
    pub step_delay: Duration,
    pub cancel: CancellationToken,
    pub tracker: Arc<CompletionTracker>,
    pub events: Arc<EventBus>,
    pub metrics: Arc<DispatchMetrics>,
}

enum MoveResult {
    Arrived { steps: u64 },
    Cancelled { steps: u64 },
}

/// Movement loop of one agent; runs until the pool is cancelled
pub(crate) async fn run_agent(
    agent: Agent,
    mut inbox: mpsc::Receiver<Assignment>,
    ctx: MoverContext,
) {
    let span = tracing::info_span!("agent", agent.id = agent.id());
    async move {
        debug!(step_delay_ms = ctx.step_delay.as_millis() as u64, "Agent movement task started");

        loop {
            let assignment = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => break,
                next = inbox.recv() => match next {
                    Some(assignment) => assignment,
                    None => break,
                },
            };

            if let MoveResult::Cancelled { .. } = execute(&agent, assignment, &ctx).await {
                break;
            }
        }

        agent.mark_stopped();
        inbox.close();
        // Anything committed before the mailbox closed is still owed an outcome
        while let Ok(assignment) = inbox.try_recv() {
            let position = assignment.reservation.position();
            ctx.events.emit(FleetEvent::Cancelled {
                agent_id: agent.id(),
                task_id: assignment.task,
                position,
                destination: assignment.destination,
                steps: 0,
            });
            drop(assignment);
            settle(&ctx, TaskOutcome::Cancelled);
        }

        info!(position = %agent.current_position(), "Agent movement task stopped");
    }
    .instrument(span)
    .await
}

async fn execute(agent: &Agent, assignment: Assignment, ctx: &MoverContext) -> MoveResult {
    let Assignment {
        task,
        destination,
        mut reservation,
    } = assignment;
    let start = reservation.position();

    ctx.events.emit(FleetEvent::Departed {
        agent_id: agent.id(),
        task_id: task,
        position: start,
        destination,
    });

    let mut steps = 0u64;
    let mut cancelled = false;
    for next in Path::new(start, destination) {
        if ctx.cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        reservation.set_position(next);
        steps += 1;
        ctx.metrics.record_step();
        ctx.events.emit(FleetEvent::Step {
            agent_id: agent.id(),
            task_id: task,
            position: next,
            destination,
        });

        if !pause(ctx).await {
            cancelled = true;
            break;
        }
    }

    let position = reservation.position();
    if cancelled && position != destination {
        // Stop before releasing so the agent never reappears as Idle
        agent.mark_stopped();
        ctx.events.emit(FleetEvent::Cancelled {
            agent_id: agent.id(),
            task_id: task,
            position,
            destination,
            steps,
        });
        drop(reservation);
        settle(ctx, TaskOutcome::Cancelled);
        return MoveResult::Cancelled { steps };
    }

    ctx.events.emit(FleetEvent::Arrived {
        agent_id: agent.id(),
        task_id: task,
        position,
        steps,
    });
    drop(reservation);
    settle(ctx, TaskOutcome::Completed);
    MoveResult::Arrived { steps }
}

/// Sleep the per-step delay; false when cancelled while waiting
async fn pause(ctx: &MoverContext) -> bool {
    if ctx.step_delay.is_zero() {
        tokio::task::yield_now().await;
        return !ctx.cancel.is_cancelled();
    }
    tokio::select! {
        _ = ctx.cancel.cancelled() => false,
        _ = tokio::time::sleep(ctx.step_delay) => true,
    }
}

fn settle(ctx: &MoverContext, outcome: TaskOutcome) {
    ctx.metrics.record_outcome(outcome);
    if let Err(e) = ctx.tracker.done(outcome) {
        tracing::error!(error = %e, ?outcome, "Completion tracker out of balance");
    }
}
