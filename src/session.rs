//! Session lifecycle driven by runtime notifications.
//!
//! The runtime alone decides which state the session is in. This module turns
//! each notification into a [`Transition`] with [`next_state`], then
//! [`SessionLifecycle::apply`] performs the entry action against the runtime.

use tracing::{info, warn};

use crate::error::Result;
use crate::runtime::{RuntimeEvent, SessionControl};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unknown,
    Idle,
    Ready,
    Synchronized,
    Visible,
    Focused,
    Stopping,
    Exiting,
    LossPending,
}

impl SessionState {
    pub const ALL: [SessionState; 9] = [
        Self::Unknown,
        Self::Idle,
        Self::Ready,
        Self::Synchronized,
        Self::Visible,
        Self::Focused,
        Self::Stopping,
        Self::Exiting,
        Self::LossPending,
    ];

    /// States in which frame timing and input calls are allowed.
    pub fn is_running(self) -> bool {
        matches!(
            self,
            Self::Ready | Self::Synchronized | Self::Visible | Self::Focused
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Exiting | Self::LossPending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Idle => "idle",
            Self::Ready => "ready",
            Self::Synchronized => "synchronized",
            Self::Visible => "visible",
            Self::Focused => "focused",
            Self::Stopping => "stopping",
            Self::Exiting => "exiting",
            Self::LossPending => "loss-pending",
        }
    }
}

/// Lifecycle-relevant notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    InstanceLossPending,
}

/// What has to happen when a state is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryAction {
    None,
    BeginSession,
    EndSession,
    Terminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub state: SessionState,
    pub action: EntryAction,
}

/// Whether the outer loop keeps going after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Exit,
}

pub fn next_state(_current: SessionState, event: SessionEvent) -> Transition {
    let state = match event {
        SessionEvent::StateChanged(state) => state,
        SessionEvent::InstanceLossPending => SessionState::LossPending,
    };
    let action = match state {
        SessionState::Ready => EntryAction::BeginSession,
        SessionState::Stopping => EntryAction::EndSession,
        SessionState::Exiting | SessionState::LossPending => EntryAction::Terminate,
        _ => EntryAction::None,
    };
    Transition { state, action }
}

/// Current session state plus the running flag that gates input and frames.
#[derive(Debug, Default)]
pub struct SessionLifecycle {
    state: SessionState,
    running: bool,
}

impl SessionLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_focused(&self) -> bool {
        self.state == SessionState::Focused
    }

    /// Visible or focused: frames are actually displayed.
    pub fn is_visible(&self) -> bool {
        matches!(self.state, SessionState::Visible | SessionState::Focused)
    }

    pub fn is_terminated(&self) -> bool {
        self.state.is_terminal()
    }

    /// Applies one lifecycle event, issuing begin/end requests as needed.
    ///
    /// A failed begin or end request is fatal and returned as an error; the
    /// running flag is already cleared when that happens.
    pub fn apply(
        &mut self,
        event: SessionEvent,
        control: &mut impl SessionControl,
    ) -> Result<LoopControl> {
        let transition = next_state(self.state, event);
        info!(
            from = self.state.as_str(),
            to = transition.state.as_str(),
            "session state changed"
        );
        self.state = transition.state;

        match transition.action {
            EntryAction::BeginSession => {
                if let Err(err) = control.begin_session() {
                    self.running = false;
                    return Err(err);
                }
            }
            EntryAction::EndSession => {
                self.running = false;
                control.end_session()?;
            }
            EntryAction::Terminate => {
                self.running = false;
                return Ok(LoopControl::Exit);
            }
            EntryAction::None => {}
        }

        self.running = transition.state.is_running();
        Ok(LoopControl::Continue)
    }

    /// Routes a raw runtime event; events without lifecycle meaning are logged
    /// and ignored.
    pub fn handle_event(
        &mut self,
        event: RuntimeEvent,
        control: &mut impl SessionControl,
    ) -> Result<LoopControl> {
        match event {
            RuntimeEvent::SessionStateChanged(state) => {
                self.apply(SessionEvent::StateChanged(state), control)
            }
            RuntimeEvent::InstanceLossPending => {
                self.apply(SessionEvent::InstanceLossPending, control)
            }
            RuntimeEvent::EventsLost(count) => {
                warn!(count, "runtime dropped events");
                Ok(LoopControl::Continue)
            }
        }
    }
}
