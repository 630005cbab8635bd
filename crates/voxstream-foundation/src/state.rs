use crate::error::AppError;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;

/// Lifecycle of one streaming session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Initializing,
    Running,
    Recovering { from_error: String },
    Stopping,
    Stopped,
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            SessionState::Initializing => "Initializing",
            SessionState::Running => "Running",
            SessionState::Recovering { .. } => "Recovering",
            SessionState::Stopping => "Stopping",
            SessionState::Stopped => "Stopped",
        }
    }
}

pub struct StateManager {
    state: Arc<RwLock<SessionState>>,
    state_tx: Sender<SessionState>,
    state_rx: Receiver<SessionState>,
}

impl StateManager {
    pub fn new() -> Self {
        let (state_tx, state_rx) = crossbeam_channel::unbounded();
        Self {
            state: Arc::new(RwLock::new(SessionState::Initializing)),
            state_tx,
            state_rx,
        }
    }

    pub fn transition(&self, new_state: SessionState) -> Result<(), AppError> {
        let mut current = self.state.write();

        let valid = matches!(
            (&*current, &new_state),
            (SessionState::Initializing, SessionState::Running)
                | (SessionState::Running, SessionState::Recovering { .. })
                | (SessionState::Running, SessionState::Stopping)
                | (SessionState::Recovering { .. }, SessionState::Running)
                | (SessionState::Recovering { .. }, SessionState::Stopping)
                | (SessionState::Stopping, SessionState::Stopped)
        );

        if !valid {
            return Err(AppError::InvalidTransition {
                from: current.name().to_string(),
                to: new_state.name().to_string(),
            });
        }

        tracing::info!("Session state: {:?} -> {:?}", *current, new_state);
        *current = new_state.clone();
        let _ = self.state_tx.send(new_state);
        Ok(())
    }

    pub fn current(&self) -> SessionState {
        self.state.read().clone()
    }

    /// True while the session should keep capturing and streaming.
    pub fn is_active(&self) -> bool {
        matches!(
            *self.state.read(),
            SessionState::Running | SessionState::Recovering { .. }
        )
    }

    pub fn subscribe(&self) -> Receiver<SessionState> {
        self.state_rx.clone()
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}
