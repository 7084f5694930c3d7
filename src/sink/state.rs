//! Streaming lifecycle state shared by all sinks

/// Sink lifecycle state machine
///
/// The lifecycle is cyclic: teardown always lands back in `Idle`, so a sink
/// can be reconfigured and restreamed indefinitely. Transitions are
/// validated centrally so every sink variant behaves identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// No format negotiated, nothing streaming; the initial and terminal state
    Idle,

    /// Format negotiated, buffers sized, ready for `stream_on`
    Configured,

    /// Frames are flowing; `get`/`send` are legal
    Streaming,

    /// An abort cancelled in-flight work; only `stream_off` makes progress
    Aborting,
}

impl SinkState {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: SinkState) -> bool {
        use SinkState::*;

        match (self, target) {
            // Format negotiation, including renegotiation before streaming
            (Idle, Configured) => true,
            (Configured, Configured) => true,

            (Configured, Streaming) => true,

            (Streaming, Aborting) => true,

            // stream_off is legal from any state
            (_, Idle) => true,

            // Self-transitions
            (a, b) if *a == b => true,

            // All other transitions invalid
            _ => false,
        }
    }

    /// Get a human-readable description of this state
    pub fn description(&self) -> &'static str {
        match self {
            SinkState::Idle => "Idle",
            SinkState::Configured => "Configured",
            SinkState::Streaming => "Streaming",
            SinkState::Aborting => "Aborting",
        }
    }

    /// Check if `get`/`send` are currently legal
    pub fn is_streaming(&self) -> bool {
        matches!(self, SinkState::Streaming)
    }

    /// Check if the sink has a negotiated format
    pub fn is_configured(&self) -> bool {
        matches!(self, SinkState::Configured)
    }

    /// Check if the sink is fully stopped
    pub fn is_idle(&self) -> bool {
        matches!(self, SinkState::Idle)
    }
}

impl std::fmt::Display for SinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(SinkState::Idle.can_transition_to(SinkState::Configured));
        assert!(SinkState::Configured.can_transition_to(SinkState::Configured));
        assert!(SinkState::Configured.can_transition_to(SinkState::Streaming));
        assert!(SinkState::Streaming.can_transition_to(SinkState::Aborting));

        // stream_off from anywhere
        assert!(SinkState::Idle.can_transition_to(SinkState::Idle));
        assert!(SinkState::Configured.can_transition_to(SinkState::Idle));
        assert!(SinkState::Streaming.can_transition_to(SinkState::Idle));
        assert!(SinkState::Aborting.can_transition_to(SinkState::Idle));

        // Self-transitions
        assert!(SinkState::Streaming.can_transition_to(SinkState::Streaming));
        assert!(SinkState::Aborting.can_transition_to(SinkState::Aborting));
    }

    #[test]
    fn test_invalid_transitions() {
        // Must configure before streaming
        assert!(!SinkState::Idle.can_transition_to(SinkState::Streaming));
        // Cannot abort what is not streaming
        assert!(!SinkState::Idle.can_transition_to(SinkState::Aborting));
        assert!(!SinkState::Configured.can_transition_to(SinkState::Aborting));
        // No renegotiation or restart without passing through Idle
        assert!(!SinkState::Streaming.can_transition_to(SinkState::Configured));
        assert!(!SinkState::Aborting.can_transition_to(SinkState::Configured));
        assert!(!SinkState::Aborting.can_transition_to(SinkState::Streaming));
    }

    #[test]
    fn test_state_checks() {
        assert!(SinkState::Idle.is_idle());
        assert!(!SinkState::Idle.is_streaming());

        assert!(SinkState::Configured.is_configured());
        assert!(!SinkState::Configured.is_streaming());

        assert!(SinkState::Streaming.is_streaming());
        assert!(!SinkState::Streaming.is_idle());

        assert!(!SinkState::Aborting.is_streaming());
        assert!(!SinkState::Aborting.is_idle());
    }
}
