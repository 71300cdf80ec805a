//! Cycle state machine
//!
//! ```text
//! Stopped   --Start-------------------> Waiting
//! Waiting   --TimerElapsed------------> DataReady
//! Sampling  --SamplingDone------------> DataReady
//! DataReady --PassBegin{continuous}---> Waiting   (timer restarts at pass start)
//! DataReady --PassEnd-----------------> Waiting
//! any       --Stop--------------------> Stopped
//! ```

/// Controller state, the only state that persists across cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CycleState {
    /// No cycles run until started
    Stopped,
    /// Holding until the interval elapses
    #[default]
    Waiting,
    /// Reserved for multi-frame capture; collapses to `DataReady`
    Sampling,
    /// Next advance runs a pass
    DataReady,
}

impl std::fmt::Display for CycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Waiting => "waiting",
            Self::Sampling => "sampling",
            Self::DataReady => "data_ready",
        };
        f.write_str(name)
    }
}

/// Inputs driving the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleEvent {
    Start,
    Stop,
    /// Interval has not elapsed yet
    TimerPending,
    /// Interval has elapsed
    TimerElapsed,
    /// Multi-frame sampling finished
    SamplingDone,
    /// A pass is about to run
    PassBegin { continuous: bool },
    /// A pass finished, successfully or not
    PassEnd,
}

/// Transition table. Pairs not listed leave the state unchanged.
pub fn transition(state: CycleState, event: CycleEvent) -> CycleState {
    use CycleEvent as E;
    use CycleState as S;

    match (state, event) {
        (_, E::Stop) => S::Stopped,
        (S::Stopped, E::Start) => S::Waiting,
        (S::Stopped, _) => S::Stopped,

        (S::Waiting, E::TimerElapsed) => S::DataReady,
        (S::Sampling, E::SamplingDone) => S::DataReady,

        (S::DataReady, E::PassBegin { continuous: true }) => S::Waiting,
        (S::DataReady, E::PassBegin { continuous: false }) => S::DataReady,

        (S::DataReady | S::Waiting | S::Sampling, E::PassEnd) => S::Waiting,

        (state, _) => state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CycleEvent as E;
    use CycleState as S;

    #[test]
    fn initial_state_is_waiting() {
        assert_eq!(CycleState::default(), S::Waiting);
    }

    #[test]
    fn waiting_holds_until_timer() {
        assert_eq!(transition(S::Waiting, E::TimerPending), S::Waiting);
        assert_eq!(transition(S::Waiting, E::TimerElapsed), S::DataReady);
    }

    #[test]
    fn continuous_returns_to_waiting_before_pass() {
        assert_eq!(
            transition(S::DataReady, E::PassBegin { continuous: true }),
            S::Waiting
        );
        assert_eq!(
            transition(S::DataReady, E::PassBegin { continuous: false }),
            S::DataReady
        );
        assert_eq!(transition(S::DataReady, E::PassEnd), S::Waiting);
        assert_eq!(transition(S::Waiting, E::PassEnd), S::Waiting);
    }

    #[test]
    fn sampling_collapses_to_data_ready() {
        assert_eq!(transition(S::Sampling, E::SamplingDone), S::DataReady);
        assert_eq!(transition(S::Sampling, E::TimerPending), S::Sampling);
    }

    #[test]
    fn stopped_only_leaves_on_start() {
        for event in [
            E::TimerElapsed,
            E::TimerPending,
            E::SamplingDone,
            E::PassBegin { continuous: true },
            E::PassEnd,
        ] {
            assert_eq!(transition(S::Stopped, event), S::Stopped, "{event:?}");
        }
        assert_eq!(transition(S::Stopped, E::Start), S::Waiting);
    }

    #[test]
    fn stop_wins_from_every_state() {
        for state in [S::Waiting, S::Sampling, S::DataReady, S::Stopped] {
            assert_eq!(transition(state, E::Stop), S::Stopped);
        }
    }

    #[test]
    fn start_is_noop_when_running() {
        assert_eq!(transition(S::Waiting, E::Start), S::Waiting);
        assert_eq!(transition(S::DataReady, E::Start), S::DataReady);
    }
}
