use crate::agents::Reservation;
use crate::location::{AgentId, Location};
use crate::priority::Priority;

/// One reserved agent as seen by the selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub agent_id: AgentId,
    pub priority: Priority,
    pub position: Location,
}

impl Candidate {
    pub fn cost(&self, destination: Location) -> u64 {
        self.position.chebyshev_distance(destination)
    }
}

impl From<&Reservation> for Candidate {
    fn from(reservation: &Reservation) -> Self {
        Self {
            agent_id: reservation.agent_id(),
            priority: reservation.priority(),
            position: reservation.position(),
        }
    }
}

/// Index of the preferred candidate: lowest cost, then lowest priority value,
/// then lowest agent id.
pub fn select_candidate(candidates: &[Candidate], destination: Location) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .min_by_key(|(_, c)| (c.cost(destination), c.priority, c.agent_id))
        .map(|(index, _)| index)
}
