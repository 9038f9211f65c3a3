//! Registration and initialization across simulated restarts.

mod common;

use std::fs;

use common::{FakeControlPlane, Harness, ISSUED_ACCESS_KEY, ISSUED_DEVICE_ID, PROJECT_ID};
use edgeplane_agent::{AgentError, CredentialStore, RegistrationState};
use edgeplane_core::{ACCESS_KEY_FILENAME, DEVICE_ID_FILENAME};

fn store(state_dir: &std::path::Path) -> CredentialStore {
    CredentialStore::new(state_dir, PROJECT_ID)
}

// ============================================================================
// Fresh Registration
// ============================================================================

#[tokio::test]
async fn test_fresh_device_registers_once_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    let mut agent = harness.agent(dir.path());

    let identity = agent.initialize().await.unwrap();

    assert_eq!(harness.control_plane.register_calls(), 1);
    assert_eq!(agent.registration_state(), RegistrationState::Registered);

    let store = store(dir.path());
    assert_eq!(store.read(&[DEVICE_ID_FILENAME]).unwrap(), ISSUED_DEVICE_ID.as_bytes());
    assert_eq!(store.read(&[ACCESS_KEY_FILENAME]).unwrap(), ISSUED_ACCESS_KEY.as_bytes());

    assert_eq!(identity.project_id(), PROJECT_ID);
    assert_eq!(identity.device_id(), ISSUED_DEVICE_ID);
    assert_eq!(identity.access_key(), ISSUED_ACCESS_KEY);
    assert_eq!(harness.control_plane.authenticated(), Some(identity));
}

#[tokio::test]
async fn test_initialize_twice_registers_once() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    let mut agent = harness.agent(dir.path());

    let first = agent.initialize().await.unwrap();
    let second = agent.initialize().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(harness.control_plane.register_calls(), 1);
}

// ============================================================================
// Restarts
// ============================================================================

#[tokio::test]
async fn test_restarts_never_reregister() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();

    for _ in 0..4 {
        let mut agent = harness.agent(dir.path());
        let identity = agent.initialize().await.unwrap();
        assert_eq!(identity.device_id(), ISSUED_DEVICE_ID);
        assert_eq!(identity.access_key(), ISSUED_ACCESS_KEY);
    }

    assert_eq!(harness.control_plane.register_calls(), 1);
}

#[tokio::test]
async fn test_existing_credentials_are_loaded_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    store.write(b"dev_from_disk\n", &[DEVICE_ID_FILENAME]).unwrap();
    store.write(b"key_from_disk\n", &[ACCESS_KEY_FILENAME]).unwrap();

    let harness = Harness::new();
    let mut agent = harness.agent(dir.path());
    agent.initialize().await.unwrap();

    assert_eq!(harness.control_plane.register_calls(), 0);
    let injected = harness.control_plane.authenticated().unwrap();
    assert_eq!(injected.device_id(), "dev_from_disk");
    assert_eq!(injected.access_key(), "key_from_disk");

    // Loading never rewrites the files.
    assert_eq!(store.read(&[DEVICE_ID_FILENAME]).unwrap(), b"dev_from_disk\n");
}

// ============================================================================
// Fatal Paths
// ============================================================================

#[tokio::test]
async fn test_rejected_registration_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new().with_control_plane(FakeControlPlane::rejecting_registration());
    let mut agent = harness.agent(dir.path());

    let err = agent.initialize().await.unwrap_err();

    assert!(matches!(err, AgentError::RegistrationFailed(_)));
    assert!(err.is_fatal());
    assert_eq!(harness.control_plane.register_calls(), 1);
    assert_eq!(agent.registration_state(), RegistrationState::Unregistered);
    assert!(harness.control_plane.authenticated().is_none());

    let store = store(dir.path());
    assert!(!store.exists(&[ACCESS_KEY_FILENAME]));
    assert!(!store.exists(&[DEVICE_ID_FILENAME]));
}

#[tokio::test]
async fn test_failed_initialization_never_starts_loops() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new().with_control_plane(FakeControlPlane::rejecting_registration());
    let agent = harness.agent(dir.path());

    let result = agent.run_until(std::future::pending()).await;

    assert!(matches!(result, Err(AgentError::RegistrationFailed(_))));
    assert_eq!(harness.control_plane.bundle_calls(), 0);
    assert_eq!(harness.connector.calls(), 0);
    assert_eq!(harness.info.calls(), 0);
}

#[tokio::test]
async fn test_start_requires_initialization() {
    let dir = tempfile::tempdir().unwrap();
    let agent = Harness::new().agent(dir.path());

    assert!(matches!(agent.start(), Err(AgentError::Internal(_))));
}

#[cfg(unix)]
#[tokio::test]
async fn test_unreadable_state_is_fatal_without_registering() {
    let dir = tempfile::tempdir().unwrap();
    // A regular file where the state directory should be.
    let state_dir = dir.path().join("state");
    fs::write(&state_dir, b"not a directory").unwrap();

    let harness = Harness::new();
    let mut agent = harness.agent(&state_dir);

    let err = agent.initialize().await.unwrap_err();
    assert!(matches!(err, AgentError::CredentialCheck { .. }));
    assert_eq!(harness.control_plane.register_calls(), 0);
}

#[tokio::test]
async fn test_registration_without_token_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    let mut config = common::config(dir.path());
    config.device.registration_token = "   ".into();

    let mut agent = edgeplane_agent::AgentBuilder::new(config)
        .with_registrar(harness.control_plane.clone())
        .with_bundle_source(harness.control_plane.clone())
        .with_supervisor(harness.supervisor.clone())
        .with_connector(harness.connector.clone())
        .with_info_reporter(harness.info.clone())
        .build()
        .unwrap();

    assert!(matches!(
        agent.initialize().await,
        Err(AgentError::MissingRegistrationToken)
    ));
    assert_eq!(harness.control_plane.register_calls(), 0);
}

// ============================================================================
// Partial On-Disk State
// ============================================================================

#[tokio::test]
async fn test_device_id_without_access_key_reregisters() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    store.write(b"dev_stale", &[DEVICE_ID_FILENAME]).unwrap();

    let harness = Harness::new();
    let identity = harness.agent(dir.path()).initialize().await.unwrap();

    assert_eq!(harness.control_plane.register_calls(), 1);
    assert_eq!(identity.device_id(), ISSUED_DEVICE_ID);
    assert_eq!(store.read(&[DEVICE_ID_FILENAME]).unwrap(), ISSUED_DEVICE_ID.as_bytes());
}

#[tokio::test]
async fn test_access_key_without_device_id_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    store.write(b"key_orphan", &[ACCESS_KEY_FILENAME]).unwrap();

    let harness = Harness::new();
    let err = harness.agent(dir.path()).initialize().await.unwrap_err();

    assert!(matches!(err, AgentError::PartialRegistration { .. }));
    assert_eq!(harness.control_plane.register_calls(), 0);
    assert_eq!(store.read(&[ACCESS_KEY_FILENAME]).unwrap(), b"key_orphan");
}
