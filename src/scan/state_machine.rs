use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Opening,
    Running,
    Stopping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Start,
    Opened,
    OpenFailed,
    StopRequested,
    EndOfStream,
    DurationElapsed,
    ReadFailed,
    Closed,
}

impl RunState {
    /// Next state, or `None` when the trigger is not valid here.
    pub fn transition(&self, trigger: Trigger) -> Option<RunState> {
        match (self, trigger) {
            (RunState::Idle, Trigger::Start) => Some(RunState::Opening),

            (RunState::Opening, Trigger::Opened) => Some(RunState::Running),
            (RunState::Opening, Trigger::OpenFailed) => Some(RunState::Idle),

            (
                RunState::Running,
                Trigger::StopRequested
                | Trigger::EndOfStream
                | Trigger::DurationElapsed
                | Trigger::ReadFailed,
            ) => Some(RunState::Stopping),

            (RunState::Stopping, Trigger::Closed) => Some(RunState::Idle),

            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, RunState::Idle)
    }
}

pub struct RunStateMachine {
    state: RunState,
    transition_count: u32,
}

impl RunStateMachine {
    pub fn new() -> Self {
        Self {
            state: RunState::Idle,
            transition_count: 0,
        }
    }

    /// Applies the trigger. A rejected trigger leaves the state unchanged.
    pub fn fire(&mut self, trigger: Trigger) -> Option<RunState> {
        let next = self.state.transition(trigger)?;
        self.state = next;
        self.transition_count += 1;
        Some(next)
    }

    pub fn current_state(&self) -> RunState {
        self.state
    }

    pub fn transition_count(&self) -> u32 {
        self.transition_count
    }

    pub fn reset(&mut self) {
        self.state = RunState::Idle;
        self.transition_count = 0;
    }
}

impl Default for RunStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_run_cycle() {
        let mut sm = RunStateMachine::new();
        assert_eq!(sm.current_state(), RunState::Idle);

        assert_eq!(sm.fire(Trigger::Start), Some(RunState::Opening));
        assert_eq!(sm.fire(Trigger::Opened), Some(RunState::Running));
        assert_eq!(sm.fire(Trigger::DurationElapsed), Some(RunState::Stopping));
        assert_eq!(sm.fire(Trigger::Closed), Some(RunState::Idle));
        assert_eq!(sm.transition_count(), 4);
    }

    #[test]
    fn test_open_failure_returns_to_idle() {
        let mut sm = RunStateMachine::new();
        sm.fire(Trigger::Start);
        assert_eq!(sm.fire(Trigger::OpenFailed), Some(RunState::Idle));
        assert!(!sm.current_state().is_active());
    }

    #[test]
    fn test_every_stop_reason_leads_to_stopping() {
        for trigger in [
            Trigger::StopRequested,
            Trigger::EndOfStream,
            Trigger::DurationElapsed,
            Trigger::ReadFailed,
        ] {
            assert_eq!(
                RunState::Running.transition(trigger),
                Some(RunState::Stopping)
            );
        }
    }

    #[test]
    fn test_invalid_trigger_rejected() {
        let mut sm = RunStateMachine::new();
        assert_eq!(sm.fire(Trigger::Opened), None);
        assert_eq!(sm.current_state(), RunState::Idle);
        assert_eq!(sm.transition_count(), 0);

        assert_eq!(RunState::Stopping.transition(Trigger::Start), None);
        assert_eq!(RunState::Running.transition(Trigger::Closed), None);
    }

    #[test]
    fn test_reset() {
        let mut sm = RunStateMachine::new();
        sm.fire(Trigger::Start);
        sm.reset();
        assert_eq!(sm.current_state(), RunState::Idle);
        assert_eq!(sm.transition_count(), 0);
    }
}
