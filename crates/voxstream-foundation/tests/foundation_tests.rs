//! Foundation crate tests
//!
//! Tests cover:
//! - Session state machine (legal and illegal transitions)
//! - Error types and recovery strategies

use voxstream_foundation::error::{AppError, AudioError, RecoveryStrategy};
use voxstream_foundation::state::{SessionState, StateManager};

// ─── State Machine Tests ────────────────────────────────────────────

#[test]
fn session_starts_initializing() {
    let mgr = StateManager::new();
    assert_eq!(mgr.current(), SessionState::Initializing);
    assert!(!mgr.is_active());
}

#[test]
fn full_lifecycle_is_legal() {
    let mgr = StateManager::new();
    mgr.transition(SessionState::Running).unwrap();
    assert!(mgr.is_active());
    mgr.transition(SessionState::Stopping).unwrap();
    mgr.transition(SessionState::Stopped).unwrap();
    assert_eq!(mgr.current(), SessionState::Stopped);
    assert!(!mgr.is_active());
}

#[test]
fn recovery_roundtrip_is_legal() {
    let mgr = StateManager::new();
    mgr.transition(SessionState::Running).unwrap();
    mgr.transition(SessionState::Recovering {
        from_error: "device disconnected".into(),
    })
    .unwrap();
    assert!(mgr.is_active());
    mgr.transition(SessionState::Running).unwrap();
}

#[test]
fn cannot_skip_to_stopped() {
    let mgr = StateManager::new();
    let err = mgr.transition(SessionState::Stopped).unwrap_err();
    match err {
        AppError::InvalidTransition { from, to } => {
            assert_eq!(from, "Initializing");
            assert_eq!(to, "Stopped");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn cannot_restart_after_stopped() {
    let mgr = StateManager::new();
    mgr.transition(SessionState::Running).unwrap();
    mgr.transition(SessionState::Stopping).unwrap();
    mgr.transition(SessionState::Stopped).unwrap();
    assert!(mgr.transition(SessionState::Running).is_err());
}

#[test]
fn subscribers_observe_transitions() {
    let mgr = StateManager::new();
    let rx = mgr.subscribe();
    mgr.transition(SessionState::Running).unwrap();
    mgr.transition(SessionState::Stopping).unwrap();
    assert_eq!(rx.recv().unwrap(), SessionState::Running);
    assert_eq!(rx.recv().unwrap(), SessionState::Stopping);
}

// ─── Error Tests ────────────────────────────────────────────────────

#[test]
fn audio_error_wraps_into_app_error() {
    let err: AppError = AudioError::DeviceDisconnected.into();
    assert!(matches!(
        err.recovery_strategy(),
        RecoveryStrategy::Retry { .. }
    ));
}

#[test]
fn missing_device_falls_back_to_default() {
    let err: AppError = AudioError::DeviceNotFound {
        name: Some("USB Mic".into()),
    }
    .into();
    match err.recovery_strategy() {
        RecoveryStrategy::Fallback { to } => assert_eq!(to, "default"),
        other => panic!("unexpected strategy: {other:?}"),
    }
}

#[test]
fn overflow_is_ignorable() {
    let err: AppError = AudioError::BufferOverflow { count: 480 }.into();
    assert!(matches!(err.recovery_strategy(), RecoveryStrategy::Ignore));
}

#[test]
fn error_display_names_the_device() {
    let err = AudioError::DeviceNotFound {
        name: Some("pipewire".into()),
    };
    assert!(err.to_string().contains("pipewire"));
}
