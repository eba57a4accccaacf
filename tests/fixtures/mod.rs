/// Shared helpers for fleet integration tests
use fleet_dispatch::{AgentId, FleetEvent, Location, TaskId};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// Destinations used by the reference fleet run
#[allow(dead_code)]
pub const REFERENCE_DESTINATIONS: [Location; 6] = [
    Location::new(-2, -3),
    Location::new(-2, 2),
    Location::new(3, -7),
    Location::new(7, 4),
    Location::new(5, -1),
    Location::new(-3, -6),
];

/// Collect events until `terminal` tasks have settled (arrived or cancelled)
pub async fn collect_until_settled(
    events: &mut UnboundedReceiver<FleetEvent>,
    terminal: usize,
) -> Vec<FleetEvent> {
    let mut collected = Vec::new();
    let mut settled = 0;
    while settled < terminal {
        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("timed out waiting for fleet events")
            .expect("event stream closed early");
        if event.is_terminal() {
            settled += 1;
        }
        collected.push(event);
    }
    collected
}

/// Everything observed about one task in an event stream
#[derive(Debug, Default, Clone)]
#[allow(dead_code)]
pub struct TaskTrace {
    pub agent_id: AgentId,
    pub start: Option<Location>,
    pub destination: Option<Location>,
    pub steps_seen: u64,
    pub final_position: Option<Location>,
    pub reported_steps: Option<u64>,
    pub cancelled: bool,
}

#[allow(dead_code)]
pub fn traces_by_task(events: &[FleetEvent]) -> HashMap<TaskId, TaskTrace> {
    let mut traces: HashMap<TaskId, TaskTrace> = HashMap::new();
    for event in events {
        let trace = traces.entry(event.task_id()).or_default();
        trace.agent_id = event.agent_id();
        match event {
            FleetEvent::Departed {
                position,
                destination,
                ..
            } => {
                trace.start = Some(*position);
                trace.destination = Some(*destination);
            }
            FleetEvent::Step { .. } => trace.steps_seen += 1,
            FleetEvent::Arrived { position, steps, .. } => {
                trace.final_position = Some(*position);
                trace.reported_steps = Some(*steps);
            }
            FleetEvent::Cancelled { position, steps, .. } => {
                trace.final_position = Some(*position);
                trace.reported_steps = Some(*steps);
                trace.cancelled = true;
            }
        }
    }
    traces
}

/// Panics if any agent's events interleave two tasks: every agent must run
/// Departed, Step*, Arrived|Cancelled for one task before starting the next.
#[allow(dead_code)]
pub fn assert_one_task_per_agent(events: &[FleetEvent]) {
    let mut in_flight: HashMap<AgentId, TaskId> = HashMap::new();
    for event in events {
        let agent = event.agent_id();
        let task = event.task_id();
        match event {
            FleetEvent::Departed { .. } => {
                if let Some(current) = in_flight.insert(agent, task) {
                    panic!("agent {agent} started task {task} while task {current} was in flight");
                }
            }
            FleetEvent::Step { .. } => {
                assert_eq!(in_flight.get(&agent), Some(&task), "step for a task agent {agent} does not hold");
            }
            FleetEvent::Arrived { .. } | FleetEvent::Cancelled { .. } => {
                // Tasks drained from a closed mailbox settle without departing
                if let Some(current) = in_flight.remove(&agent) {
                    assert_eq!(current, task, "agent {agent} settled a task it was not moving");
                }
            }
        }
    }
}
