/// Task state definitions for tracking crawl progress
///
/// Every task starts `Queued`, passes through `Fetching` when a request is
/// issued, and ends in exactly one terminal state. Tasks discarded before any
/// request (depth limit, already processed, robots.txt) go straight from
/// `Queued` to `Skipped`.
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Waiting in the frontier
    Queued,

    /// Request in flight
    Fetching,

    // ===== Terminal States =====
    /// Fetched with status 200 and handled by content kind
    Processed,

    /// Discarded without a successful fetch being needed
    Skipped,

    /// Fetch or processing failed
    Failed,
}

impl TaskState {
    /// Returns true if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Skipped | Self::Failed)
    }

    /// Returns true if `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Fetching)
                | (Self::Queued, Self::Skipped)
                | (Self::Fetching, Self::Processed)
                | (Self::Fetching, Self::Skipped)
                | (Self::Fetching, Self::Failed)
        )
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Fetching => "fetching",
            Self::Processed => "processed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    /// Returns None if the string doesn't match any known state
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "fetching" => Some(Self::Fetching),
            "processed" => Some(Self::Processed),
            "skipped" => Some(Self::Skipped),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn all_states() -> [Self; 5] {
        [
            Self::Queued,
            Self::Fetching,
            Self::Processed,
            Self::Skipped,
            Self::Failed,
        ]
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_terminal() {
        assert!(!TaskState::Queued.is_terminal());
        assert!(!TaskState::Fetching.is_terminal());

        assert!(TaskState::Processed.is_terminal());
        assert!(TaskState::Skipped.is_terminal());
        assert!(TaskState::Failed.is_terminal());
    }

    #[test]
    fn test_legal_transitions() {
        assert!(TaskState::Queued.can_transition_to(TaskState::Fetching));
        assert!(TaskState::Queued.can_transition_to(TaskState::Skipped));
        assert!(TaskState::Fetching.can_transition_to(TaskState::Processed));
        assert!(TaskState::Fetching.can_transition_to(TaskState::Failed));
    }

    #[test]
    fn test_illegal_transitions() {
        // A task cannot succeed or fail without a request
        assert!(!TaskState::Queued.can_transition_to(TaskState::Processed));
        assert!(!TaskState::Queued.can_transition_to(TaskState::Failed));

        // Terminal states stay put
        for from in [TaskState::Processed, TaskState::Skipped, TaskState::Failed] {
            for to in TaskState::all_states() {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_db_string_roundtrip() {
        for state in TaskState::all_states() {
            assert_eq!(TaskState::from_db_string(state.to_db_string()), Some(state));
        }
        assert_eq!(TaskState::from_db_string("invalid"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(TaskState::Processed.to_string(), "processed");
        assert_eq!(format!("{}", TaskState::Skipped), "skipped");
    }
}
