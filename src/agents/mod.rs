// Mobile agents: exclusivity reservation, lifecycle state machine and movement

pub mod agent;
pub mod lifecycle;
pub mod movement;

pub use agent::{Agent, Assignment, Reservation};
pub use lifecycle::{AgentLifecycle, AgentStatus, LifecycleEvent};
pub use movement::Path;
