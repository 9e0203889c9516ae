use std::fmt;

/// Position of the scheduler within an iteration.
///
/// `Idle -> Polling -> Updating -> Recording -> Submitted -> Presented -> Polling`;
/// `ShuttingDown` is terminal and reachable from every phase.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Phase {
    Idle,
    Polling,
    Updating,
    Recording,
    Submitted,
    Presented,
    ShuttingDown,
}

impl Phase {
    /// Whether `self -> to` is an edge of the state machine.
    pub fn can_transition_to(self, to: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, to),
            (_, ShuttingDown)
                | (Idle, Polling)
                | (Polling, Updating)
                | (Updating, Recording)
                | (Recording, Submitted)
                | (Submitted, Presented)
                | (Presented, Polling)
        ) && self != ShuttingDown
    }

    #[inline]
    pub fn is_terminal(self) -> bool {
        self == Phase::ShuttingDown
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_edges() {
        let cycle = [
            Phase::Idle,
            Phase::Polling,
            Phase::Updating,
            Phase::Recording,
            Phase::Submitted,
            Phase::Presented,
            Phase::Polling,
        ];
        for pair in cycle.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(!Phase::Updating.can_transition_to(Phase::Presented));
        assert!(!Phase::Presented.can_transition_to(Phase::Updating));
    }

    #[test]
    fn shutting_down_is_reachable_and_terminal() {
        assert!(Phase::Recording.can_transition_to(Phase::ShuttingDown));
        assert!(Phase::Idle.can_transition_to(Phase::ShuttingDown));
        assert!(!Phase::ShuttingDown.can_transition_to(Phase::Polling));
        assert!(Phase::ShuttingDown.is_terminal());
    }
}
