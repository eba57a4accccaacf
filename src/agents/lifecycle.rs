use serde::{Deserialize, Serialize};
use statig::prelude::*;

use crate::location::{AgentId, Location, TaskId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    /// Dispatcher obtained the agent's exclusivity guard
    Reserve,
    /// Destination committed to the mailbox
    Assign { task: TaskId, destination: Location },
    /// Exclusivity guard dropped, either unused or after the move finished
    Release,
    /// Pool shutdown
    Stop,
}

/// Externally visible agent status, derived from the lifecycle machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    Idle,
    Reserved,
    Moving { task: TaskId, destination: Location },
    Stopped,
}

impl AgentStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, AgentStatus::Idle)
    }

    pub fn current_task(&self) -> Option<TaskId> {
        match self {
            AgentStatus::Moving { task, .. } => Some(*task),
            _ => None,
        }
    }
}

pub struct AgentLifecycle {
    pub agent_id: AgentId,
}

impl AgentLifecycle {
    pub fn new(agent_id: AgentId) -> Self {
        Self { agent_id }
    }
}

#[state_machine(initial = "State::idle()", state(derive(Debug, Clone, PartialEq, Eq)))]
impl AgentLifecycle {
    #[state]
    fn idle(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Reserve => Transition(State::reserved()),
            LifecycleEvent::Stop => {
                tracing::debug!(agent_id = self.agent_id, "Idle agent stopped");
                Transition(State::stopped())
            }
            _ => Handled,
        }
    }

    #[state]
    fn reserved(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Assign { task, destination } => {
                tracing::debug!(
                    agent_id = self.agent_id,
                    task_id = task,
                    destination = %destination,
                    "Agent committed to task"
                );
                Transition(State::moving(*task, *destination))
            }
            LifecycleEvent::Release => Transition(State::idle()),
            LifecycleEvent::Stop => Transition(State::stopped()),
            LifecycleEvent::Reserve => Handled,
        }
    }

    #[state]
    fn moving(
        &mut self,
        task: &mut TaskId,
        destination: &mut Location,
        event: &LifecycleEvent,
    ) -> Outcome<State> {
        match event {
            LifecycleEvent::Release => Transition(State::idle()),
            LifecycleEvent::Stop => {
                tracing::debug!(
                    agent_id = self.agent_id,
                    task_id = *task,
                    destination = %destination,
                    "Moving agent stopped"
                );
                Transition(State::stopped())
            }
            _ => Handled,
        }
    }

    #[state]
    fn stopped(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        let _ = event;
        Handled
    }
}

impl From<&State> for AgentStatus {
    fn from(state: &State) -> Self {
        match state {
            State::Idle {} => AgentStatus::Idle,
            State::Reserved {} => AgentStatus::Reserved,
            State::Moving { task, destination } => AgentStatus::Moving {
                task: *task,
                destination: *destination,
            },
            State::Stopped {} => AgentStatus::Stopped,
        }
    }
}
