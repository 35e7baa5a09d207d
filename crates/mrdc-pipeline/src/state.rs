use std::fmt;

use serde::Serialize;

/// Lifecycle of one table's pipeline
///
/// `Pending → Fetching → Normalizing → Validating → Ready`, or `Failed`
/// from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Pending,
    Fetching,
    Normalizing,
    Validating,
    Ready,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }

    pub fn can_transition(self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Pending, Fetching) | (Fetching, Normalizing) | (Normalizing, Validating) | (Validating, Ready) => {
                true
            }
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Normalizing => "normalizing",
            Self::Validating => "validating",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::PipelineState::*;

    #[test]
    fn forward_path_only() {
        assert!(Pending.can_transition(Fetching));
        assert!(Fetching.can_transition(Normalizing));
        assert!(Normalizing.can_transition(Validating));
        assert!(Validating.can_transition(Ready));
        assert!(!Fetching.can_transition(Validating));
        assert!(!Ready.can_transition(Fetching));
    }

    #[test]
    fn failed_from_any_live_state() {
        for s in [Pending, Fetching, Normalizing, Validating] {
            assert!(s.can_transition(Failed), "{s}");
        }
        assert!(!Ready.can_transition(Failed));
        assert!(!Failed.can_transition(Failed));
    }
}
