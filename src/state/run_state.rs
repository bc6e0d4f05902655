/// Run lifecycle states and operation log statuses
use crate::state::Phase;
use std::fmt;

/// Lifecycle of one orchestrated run
///
/// `Idle -> Initializing -> Active(phase)* -> Cleanup -> Done`, with
/// `Failed` reachable from any active state. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Initializing,
    Active(Phase),
    Cleanup,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true for the states in which work can fail the run
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Initializing | Self::Active(_) | Self::Cleanup)
    }

    /// Checks whether the state machine allows moving to `next`
    ///
    /// Phase ordering within a mode is enforced by the orchestrator; here
    /// any phase may follow initialization or another phase.
    pub fn can_transition_to(&self, next: RunState) -> bool {
        match (self, next) {
            (Self::Idle, Self::Initializing) => true,
            (Self::Initializing, Self::Active(_)) => true,
            (Self::Initializing, Self::Cleanup) => true,
            (Self::Active(current), Self::Active(next_phase)) => *current != next_phase,
            (Self::Active(_), Self::Cleanup) => true,
            (Self::Cleanup, Self::Done) => true,
            (state, Self::Failed) => state.is_active(),
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Initializing => write!(f, "initializing"),
            Self::Active(phase) => write!(f, "{}", phase),
            Self::Cleanup => write!(f, "cleanup"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Status of an operation log row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationStatus {
    Running,
    Completed,
    Failed,
    Interrupted,
}

impl OperationStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Interrupted => "interrupted",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "interrupted" => Some(Self::Interrupted),
            _ => None,
        }
    }

    /// A finalized row is never updated again
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
