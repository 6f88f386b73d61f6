//! Task state machine
//!
//! `Resolving -> Spawning -> Running -> {Exited, Killed, Failed}`

use serde::{Deserialize, Serialize};

/// Possible states of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    /// Looking up the definition and the executable
    Resolving,

    /// Waiting for the OS to create the process
    Spawning,

    /// Process is running
    Running,

    /// Process exited on its own
    Exited,

    /// Process ended after a kill request
    Killed,

    /// Exit status could not be observed
    Failed,
}

impl TaskState {
    /// Check if this is a terminal state (cannot transition further)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Exited | TaskState::Killed | TaskState::Failed
        )
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        use TaskState::*;
        match (self, next) {
            (Resolving, Spawning) => true,
            (Resolving, Failed) | (Spawning, Failed) => true,
            (Spawning, Running) => true,
            (Running, Exited) | (Running, Killed) | (Running, Failed) => true,
            _ => false,
        }
    }

    /// Get display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            TaskState::Resolving => "Resolving",
            TaskState::Spawning => "Spawning",
            TaskState::Running => "Running",
            TaskState::Exited => "Exited",
            TaskState::Killed => "Killed",
            TaskState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        assert!(TaskState::Resolving.can_transition_to(TaskState::Spawning));
        assert!(TaskState::Spawning.can_transition_to(TaskState::Running));
        assert!(TaskState::Running.can_transition_to(TaskState::Killed));
        assert!(!TaskState::Exited.can_transition_to(TaskState::Running));
        assert!(!TaskState::Killed.can_transition_to(TaskState::Exited));
        assert!(!TaskState::Resolving.can_transition_to(TaskState::Running));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Exited.is_terminal());
        assert!(TaskState::Failed.is_terminal());
    }
}
