//! Agent lifecycle as a pure transition table.
//!
//! [`transition`] decides the next status and the side effects the scheduler
//! must carry out; it never touches timers or the gateway itself.

use std::fmt;

use tradeloop_models::{AgentStatus, SessionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Start,
    Pause,
    Stop,
    /// Error ceiling exceeded.
    Fault,
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleAction::Start => "start",
            LifecycleAction::Pause => "pause",
            LifecycleAction::Stop => "stop",
            LifecycleAction::Fault => "fault",
        })
    }
}

/// Outcome of applying an action to a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: AgentStatus,
    pub to: AgentStatus,
    /// Cancel the running timer, if there is one.
    pub cancel_timer: bool,
    pub arm_timer: bool,
    /// Install the permission set and open a session.
    pub activate: bool,
    /// Remove the permission set and close the session with this status.
    pub deactivate: Option<SessionStatus>,
}

impl Transition {
    fn noop(status: AgentStatus) -> Self {
        Self {
            from: status,
            to: status,
            cancel_timer: false,
            arm_timer: false,
            activate: false,
            deactivate: None,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.from == self.to
            && !self.cancel_timer
            && !self.arm_timer
            && !self.activate
            && self.deactivate.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: AgentStatus,
    pub action: LifecycleAction,
}

pub fn transition(
    from: AgentStatus,
    action: LifecycleAction,
) -> Result<Transition, InvalidTransition> {
    use AgentStatus::*;

    let invalid = Err(InvalidTransition { from, action });
    match action {
        // Start always re-arms; only a deactivated agent needs a new session.
        LifecycleAction::Start => Ok(Transition {
            from,
            to: Active,
            cancel_timer: true,
            arm_timer: true,
            activate: matches!(from, Stopped | Error),
            deactivate: None,
        }),
        LifecycleAction::Pause => match from {
            Active => Ok(Transition {
                cancel_timer: true,
                to: Paused,
                ..Transition::noop(from)
            }),
            Paused => Ok(Transition::noop(from)),
            Stopped | Error => invalid,
        },
        LifecycleAction::Stop => match from {
            Stopped => Ok(Transition::noop(from)),
            Active | Paused | Error => Ok(Transition {
                to: Stopped,
                cancel_timer: true,
                deactivate: Some(SessionStatus::Completed),
                ..Transition::noop(from)
            }),
        },
        LifecycleAction::Fault => match from {
            Active | Paused => Ok(Transition {
                to: Error,
                cancel_timer: true,
                deactivate: Some(SessionStatus::Error),
                ..Transition::noop(from)
            }),
            Error => Ok(Transition::noop(from)),
            Stopped => invalid,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AgentStatus::*;

    const ALL: [AgentStatus; 4] = [Active, Paused, Stopped, Error];

    #[test]
    fn start_is_valid_from_every_state() {
        for from in ALL {
            let t = transition(from, LifecycleAction::Start).unwrap();
            assert_eq!(t.to, Active);
            assert!(t.arm_timer && t.cancel_timer);
            assert_eq!(t.activate, matches!(from, Stopped | Error));
            assert!(t.deactivate.is_none());
        }
    }

    #[test]
    fn pause() {
        let t = transition(Active, LifecycleAction::Pause).unwrap();
        assert_eq!(t.to, Paused);
        assert!(t.cancel_timer);
        assert!(t.deactivate.is_none());

        assert!(transition(Paused, LifecycleAction::Pause).unwrap().is_noop());
        assert!(transition(Stopped, LifecycleAction::Pause).is_err());
        assert!(transition(Error, LifecycleAction::Pause).is_err());
    }

    #[test]
    fn stop_closes_session_unless_already_stopped() {
        for from in [Active, Paused, Error] {
            let t = transition(from, LifecycleAction::Stop).unwrap();
            assert_eq!(t.to, Stopped);
            assert_eq!(t.deactivate, Some(SessionStatus::Completed));
        }
        assert!(transition(Stopped, LifecycleAction::Stop).unwrap().is_noop());
    }

    #[test]
    fn fault_reachable_from_all_but_stopped() {
        for from in [Active, Paused] {
            let t = transition(from, LifecycleAction::Fault).unwrap();
            assert_eq!(t.to, Error);
            assert_eq!(t.deactivate, Some(SessionStatus::Error));
        }
        assert!(transition(Error, LifecycleAction::Fault).unwrap().is_noop());
        assert_eq!(
            transition(Stopped, LifecycleAction::Fault),
            Err(InvalidTransition {
                from: Stopped,
                action: LifecycleAction::Fault
            })
        );
    }

    #[test]
    fn only_active_agents_keep_a_timer() {
        for from in ALL {
            for action in [
                LifecycleAction::Start,
                LifecycleAction::Pause,
                LifecycleAction::Stop,
                LifecycleAction::Fault,
            ] {
                if let Ok(t) = transition(from, action) {
                    assert_eq!(t.arm_timer, t.to == Active, "{from:?} {action:?}");
                }
            }
        }
    }
}
