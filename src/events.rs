//! Structured progress events emitted by moving agents.
//!
//! Every event is mirrored into `tracing` and fanned out to any subscriber
//! obtained from [`EventBus::subscribe`]. Text rendering for consoles lives in
//! the `Display` impl and matches the fleet's historical log lines.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::location::{AgentId, Location, TaskId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FleetEvent {
    /// Agent picked up a destination from its mailbox
    Departed {
        agent_id: AgentId,
        task_id: TaskId,
        position: Location,
        destination: Location,
    },
    /// One unit step completed
    Step {
        agent_id: AgentId,
        task_id: TaskId,
        position: Location,
        destination: Location,
    },
    Arrived {
        agent_id: AgentId,
        task_id: TaskId,
        position: Location,
        steps: u64,
    },
    /// Move abandoned because the pool was stopped
    Cancelled {
        agent_id: AgentId,
        task_id: TaskId,
        position: Location,
        destination: Location,
        steps: u64,
    },
}

impl FleetEvent {
    pub fn agent_id(&self) -> AgentId {
        match self {
            FleetEvent::Departed { agent_id, .. }
            | FleetEvent::Step { agent_id, .. }
            | FleetEvent::Arrived { agent_id, .. }
            | FleetEvent::Cancelled { agent_id, .. } => *agent_id,
        }
    }

    pub fn task_id(&self) -> TaskId {
        match self {
            FleetEvent::Departed { task_id, .. }
            | FleetEvent::Step { task_id, .. }
            | FleetEvent::Arrived { task_id, .. }
            | FleetEvent::Cancelled { task_id, .. } => *task_id,
        }
    }

    pub fn position(&self) -> Location {
        match self {
            FleetEvent::Departed { position, .. }
            | FleetEvent::Step { position, .. }
            | FleetEvent::Arrived { position, .. }
            | FleetEvent::Cancelled { position, .. } => *position,
        }
    }

    /// True for the events that settle a task
    pub fn is_terminal(&self) -> bool {
        matches!(self, FleetEvent::Arrived { .. } | FleetEvent::Cancelled { .. })
    }
}

impl fmt::Display for FleetEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FleetEvent::Departed {
                agent_id,
                position,
                destination,
                ..
            }
            | FleetEvent::Step {
                agent_id,
                position,
                destination,
                ..
            } => write!(
                f,
                "worker {agent_id} x: {}, y: {}; dst x: {}, y: {}",
                position.x, position.y, destination.x, destination.y
            ),
            FleetEvent::Arrived {
                agent_id, position, ..
            } => write!(
                f,
                "worker {agent_id} reached the destination x:{}, y:{}",
                position.x, position.y
            ),
            FleetEvent::Cancelled {
                agent_id,
                position,
                destination,
                ..
            } => write!(
                f,
                "worker {agent_id} cancelled at x: {}, y: {}; dst x: {}, y: {}",
                position.x, position.y, destination.x, destination.y
            ),
        }
    }
}

/// Fan-out of fleet events to every live subscriber
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<FleetEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every event emitted from now on.
    ///
    /// The channel is unbounded: a subscriber must keep draining it, or drop the
    /// receiver to be pruned on the next emit. Events queued for a subscriber
    /// that never reads stay in memory for the life of the bus.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<FleetEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tx);
        rx
    }

    pub fn emit(&self, event: FleetEvent) {
        match &event {
            FleetEvent::Step { .. } | FleetEvent::Departed { .. } => debug!(
                agent_id = event.agent_id(),
                task_id = event.task_id(),
                x = event.position().x,
                y = event.position().y,
                "{event}"
            ),
            FleetEvent::Arrived { steps, .. } => info!(
                agent_id = event.agent_id(),
                task_id = event.task_id(),
                steps = steps,
                "{event}"
            ),
            FleetEvent::Cancelled { steps, .. } => warn!(
                agent_id = event.agent_id(),
                task_id = event.task_id(),
                steps = steps,
                "{event}"
            ),
        }

        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Dropped receivers are pruned on the next emit
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(agent_id: AgentId, x: i64, y: i64) -> FleetEvent {
        FleetEvent::Step {
            agent_id,
            task_id: 1,
            position: Location::new(x, y),
            destination: Location::new(3, 3),
        }
    }

    #[test]
    fn test_display_matches_console_format() {
        assert_eq!(step(1, 1, 1).to_string(), "worker 1 x: 1, y: 1; dst x: 3, y: 3");

        let arrived = FleetEvent::Arrived {
            agent_id: 2,
            task_id: 4,
            position: Location::new(-3, -6),
            steps: 6,
        };
        assert_eq!(arrived.to_string(), "worker 2 reached the destination x:-3, y:-6");
    }

    #[test]
    fn test_event_serializes_with_kind_tag() {
        let json = serde_json::to_value(step(3, 2, 2)).unwrap();
        assert_eq!(json["kind"], "step");
        assert_eq!(json["agent_id"], 3);
        assert_eq!(json["position"]["x"], 2);
        assert_eq!(json["destination"]["y"], 3);
    }

    #[test]
    fn test_bus_fans_out_and_prunes_closed_subscribers() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(second);
        bus.emit(step(1, 1, 1));

        assert_eq!(first.try_recv().unwrap(), step(1, 1, 1));
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_dropped_backlogged_subscriber_is_pruned() {
        let bus = EventBus::new();
        let backlog = bus.subscribe();
        for x in 0..100 {
            bus.emit(step(1, x, x));
        }
        assert_eq!(backlog.len(), 100);

        drop(backlog);
        bus.emit(step(1, 0, 0));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_terminal_events() {
        assert!(!step(1, 0, 0).is_terminal());
        assert!(FleetEvent::Arrived {
            agent_id: 1,
            task_id: 1,
            position: Location::ORIGIN,
            steps: 0,
        }
        .is_terminal());
    }
}
