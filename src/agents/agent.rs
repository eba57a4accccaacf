// Agent handle, exclusivity reservation and single-slot mailbox.
// The reservation is the only lock guarding "one task per agent"; it travels
// inside the mailbox message and is released by the mover when the task settles.

use statig::prelude::*;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Notify, OwnedMutexGuard};
use tracing::{debug, warn};

use super::lifecycle::{AgentLifecycle, AgentStatus, LifecycleEvent};
use crate::dispatch::errors::DispatchError;
use crate::location::{AgentId, Location, TaskId};
use crate::priority::Priority;

/// State only the reservation holder may touch
#[derive(Debug)]
pub(crate) struct AgentSlot {
    position: Location,
}

/// A destination committed to an agent, together with the reservation that proves it
#[derive(Debug)]
pub struct Assignment {
    pub task: TaskId,
    pub destination: Location,
    pub reservation: Reservation,
}

pub(crate) struct AgentCore {
    id: AgentId,
    priority: Priority,
    slot: Arc<tokio::sync::Mutex<AgentSlot>>,
    lifecycle: Mutex<StateMachine<AgentLifecycle>>,
    position: watch::Sender<Location>,
    mailbox: mpsc::Sender<Assignment>,
    inbox: Mutex<Option<mpsc::Receiver<Assignment>>>,
    idle: Arc<Notify>,
}

impl AgentCore {
    fn handle(&self, event: LifecycleEvent) -> AgentStatus {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        lifecycle.handle(&event);
        AgentStatus::from(lifecycle.state())
    }

    fn status(&self) -> AgentStatus {
        let lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        AgentStatus::from(lifecycle.state())
    }
}

/// Cheaply cloneable handle to one mobile agent
#[derive(Clone)]
pub struct Agent {
    core: Arc<AgentCore>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.core.id)
            .field("priority", &self.core.priority)
            .field("position", &self.current_position())
            .field("status", &self.status())
            .finish()
    }
}

impl Agent {
    /// `idle` is raised every time any agent sharing it is released
    pub fn new(id: AgentId, priority: Priority, start: Location, idle: Arc<Notify>) -> Self {
        let (mailbox, inbox) = mpsc::channel(1);
        let (position, _) = watch::channel(start);
        Self {
            core: Arc::new(AgentCore {
                id,
                priority,
                slot: Arc::new(tokio::sync::Mutex::new(AgentSlot { position: start })),
                lifecycle: Mutex::new(AgentLifecycle::new(id).state_machine()),
                position,
                mailbox,
                inbox: Mutex::new(Some(inbox)),
                idle,
            }),
        }
    }

    pub fn id(&self) -> AgentId {
        self.core.id
    }

    pub fn priority(&self) -> Priority {
        self.core.priority
    }

    /// Last published position; may lag an in-progress move
    pub fn current_position(&self) -> Location {
        *self.core.position.borrow()
    }

    /// Subscribe to position updates
    pub fn watch_position(&self) -> watch::Receiver<Location> {
        self.core.position.subscribe()
    }

    pub fn status(&self) -> AgentStatus {
        self.core.status()
    }

    /// Chebyshev distance from the last published position
    pub fn estimated_cost(&self, destination: Location) -> u64 {
        self.current_position().chebyshev_distance(destination)
    }

    /// Non-blocking availability probe. `Some` leaves the agent reserved until the
    /// reservation is committed with [`Agent::assign`] or dropped.
    pub fn try_reserve(&self) -> Option<Reservation> {
        let guard = self.core.slot.clone().try_lock_owned().ok()?;
        match self.core.handle(LifecycleEvent::Reserve) {
            AgentStatus::Reserved => Some(Reservation {
                agent: Arc::clone(&self.core),
                guard: Some(guard),
            }),
            status => {
                debug!(agent_id = self.core.id, ?status, "Agent not reservable");
                None
            }
        }
    }

    /// Commit a destination to this agent's mailbox and return immediately.
    ///
    /// # Panics
    ///
    /// Panics when `reservation` belongs to another agent, or when the mailbox
    /// already holds a destination. Both indicate a scheduler bug.
    pub fn assign(
        &self,
        reservation: Reservation,
        task: TaskId,
        destination: Location,
    ) -> Result<(), DispatchError> {
        assert_eq!(
            reservation.agent_id(),
            self.core.id,
            "reservation for agent {} used to assign agent {}",
            reservation.agent_id(),
            self.core.id
        );

        self.core.handle(LifecycleEvent::Assign { task, destination });
        let assignment = Assignment {
            task,
            destination,
            reservation,
        };

        match self.core.mailbox.try_send(assignment) {
            Ok(()) => Ok(()),
            Err(TrySendError::Closed(assignment)) => {
                warn!(
                    agent_id = self.core.id,
                    task_id = task,
                    "Mailbox closed, agent has stopped"
                );
                drop(assignment);
                Err(DispatchError::Stopped)
            }
            Err(TrySendError::Full(_)) => {
                panic!("agent {} mailbox already holds a destination", self.core.id)
            }
        }
    }

    /// Move to the Stopped terminal state
    pub fn mark_stopped(&self) {
        self.core.handle(LifecycleEvent::Stop);
    }

    /// Hand the mailbox receiver to the movement task; `None` once taken
    pub(crate) fn take_inbox(&self) -> Option<mpsc::Receiver<Assignment>> {
        self.core
            .inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Exclusive claim on an agent, held from a successful probe until the task settles
pub struct Reservation {
    agent: Arc<AgentCore>,
    guard: Option<OwnedMutexGuard<AgentSlot>>,
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("agent_id", &self.agent.id)
            .field("position", &self.position())
            .finish()
    }
}

impl Reservation {
    pub fn agent_id(&self) -> AgentId {
        self.agent.id
    }

    pub fn priority(&self) -> Priority {
        self.agent.priority
    }

    /// Position read under the reservation, stable while it is held
    pub fn position(&self) -> Location {
        self.guard
            .as_ref()
            .map(|slot| slot.position)
            .unwrap_or_else(|| *self.agent.position.borrow())
    }

    pub fn estimated_cost(&self, destination: Location) -> u64 {
        self.position().chebyshev_distance(destination)
    }

    pub(crate) fn set_position(&mut self, position: Location) {
        if let Some(slot) = self.guard.as_mut() {
            slot.position = position;
        }
        self.agent.position.send_replace(position);
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        // Lifecycle first, then unlock, then wake: a woken dispatcher must find
        // the lock free and the agent Idle.
        self.agent.handle(LifecycleEvent::Release);
        drop(self.guard.take());
        self.agent.idle.notify_waiters();
    }
}
