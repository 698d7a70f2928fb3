//! Integration tests for snapshot repositories and the service container.

use std::fs;
use std::sync::Arc;
use std::thread;

use orgtree::config::Settings;
use orgtree::domain::{NodeAttrs, NodeKind, OrgUnitAttrs, TreeSnapshot, UnitType};
use orgtree::infrastructure::di::ServiceContainer;
use orgtree::infrastructure::{lock_path, InMemoryRepository, InfraError, JsonFileRepository, TreeRepository};
use orgtree::util::testing;
use rstest::{fixture, rstest};
use tempfile::TempDir;

fn company(name: &str) -> NodeAttrs {
    NodeAttrs::OrgUnit(OrgUnitAttrs::new(name, name, UnitType::Company))
}

struct Workspace {
    _dir: TempDir,
    settings: Settings,
}

#[fixture]
fn workspace() -> Workspace {
    testing::init_test_setup();
    let dir = TempDir::new().unwrap();
    let settings = Settings {
        data_file: dir.path().join("nested").join("tree.json"),
        ..Settings::default()
    };
    Workspace { _dir: dir, settings }
}

// ============================================================
// JsonFileRepository
// ============================================================

#[rstest]
fn given_missing_file_when_loading_then_none(workspace: Workspace) {
    let repo = JsonFileRepository::new(&workspace.settings.data_file);
    assert!(repo.load().unwrap().is_none());
}

#[rstest]
fn given_snapshot_when_saved_then_file_created_and_loaded_back(workspace: Workspace) {
    // Arrange
    let repo = JsonFileRepository::new(&workspace.settings.data_file);
    let container = ServiceContainer::new(workspace.settings.clone());
    let service = container.open().unwrap();
    service
        .create_node(None, None, NodeKind::OrgUnit, None, company("Acme"))
        .unwrap();
    let snapshot = service.snapshot().unwrap();

    // Act
    repo.save(&snapshot, Some(0)).unwrap();

    // Assert
    let content = fs::read_to_string(repo.path()).unwrap();
    assert!(content.ends_with('\n'));
    assert!(content.contains("\"kind\": \"org-unit\""));
    assert_eq!(repo.load().unwrap(), Some(snapshot));
}

#[rstest]
fn given_file_moved_on_when_saving_with_old_base_then_stale_file(workspace: Workspace) {
    let repo = JsonFileRepository::new(&workspace.settings.data_file);
    let mut snapshot = TreeSnapshot::empty();
    snapshot.version = 3;
    repo.save(&snapshot, None).unwrap();

    let err = repo.save(&TreeSnapshot::empty(), Some(2)).unwrap_err();

    assert!(matches!(err, InfraError::StaleFile { expected: 2, actual: 3 }));
    assert_eq!(repo.load().unwrap().unwrap().version, 3);
}

#[rstest]
fn given_save_completed_when_checking_dir_then_lock_released(workspace: Workspace) {
    let repo = JsonFileRepository::new(&workspace.settings.data_file);

    repo.save(&TreeSnapshot::empty(), None).unwrap();
    repo.save(&TreeSnapshot::empty(), Some(0)).unwrap();

    assert!(!lock_path(repo.path()).exists());
}

#[rstest]
fn given_writer_holding_lock_when_saving_then_locked_and_file_untouched(workspace: Workspace) {
    // Arrange: another writer is between its version check and its rename
    let repo = JsonFileRepository::new(&workspace.settings.data_file);
    let mut stored = TreeSnapshot::empty();
    stored.version = 2;
    repo.save(&stored, None).unwrap();
    let lock = lock_path(repo.path());
    fs::write(&lock, "").unwrap();

    // Act
    let err = repo.save(&TreeSnapshot::empty(), Some(2)).unwrap_err();

    // Assert
    assert!(matches!(&err, InfraError::Locked { path } if *path == lock));
    assert_eq!(repo.load().unwrap().unwrap().version, 2);
    assert!(lock.exists(), "a foreign lock must not be removed");
}

#[rstest]
fn given_stale_base_when_saving_then_lock_released(workspace: Workspace) {
    let repo = JsonFileRepository::new(&workspace.settings.data_file);
    let mut stored = TreeSnapshot::empty();
    stored.version = 5;
    repo.save(&stored, None).unwrap();

    let err = repo.save(&TreeSnapshot::empty(), Some(4)).unwrap_err();

    assert!(matches!(err, InfraError::StaleFile { expected: 4, actual: 5 }));
    assert!(!lock_path(repo.path()).exists());
}

#[rstest]
fn given_corrupt_file_when_loading_then_serialization_error(workspace: Workspace) {
    let path = &workspace.settings.data_file;
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, "{ not json").unwrap();

    let err = JsonFileRepository::new(path).load().unwrap_err();

    assert!(matches!(err, InfraError::Serialization { .. }));
}

// ============================================================
// ServiceContainer
// ============================================================

#[rstest]
fn given_container_when_persisted_and_reopened_then_tree_survives(workspace: Workspace) {
    // Arrange
    let container = ServiceContainer::new(workspace.settings.clone());
    let service = container.open().unwrap();
    let base = service.version().unwrap();
    let acme = service
        .create_node(None, None, NodeKind::OrgUnit, None, company("Acme"))
        .unwrap()
        .value
        .id;

    // Act
    let saved = container.persist(&service, base).unwrap();
    let reopened = ServiceContainer::new(workspace.settings).open().unwrap();

    // Assert
    assert_eq!(saved, 1);
    assert_eq!(reopened.version().unwrap(), 1);
    assert_eq!(reopened.get(acme).unwrap().name(), "Acme");
}

#[rstest]
fn given_two_sessions_when_both_persist_then_second_is_stale(workspace: Workspace) {
    let first = ServiceContainer::new(workspace.settings.clone());
    let second = ServiceContainer::new(workspace.settings.clone());
    let a = first.open().unwrap();
    let b = second.open().unwrap();
    a.create_node(None, None, NodeKind::OrgUnit, None, company("Acme")).unwrap();
    b.create_node(None, None, NodeKind::OrgUnit, None, company("Globex")).unwrap();

    first.persist(&a, 0).unwrap();
    let err = second.persist(&b, 0).unwrap_err();

    assert!(matches!(err, InfraError::StaleFile { expected: 0, actual: 1 }));
}

#[rstest]
fn given_concurrent_saves_from_same_base_when_racing_then_exactly_one_lands(workspace: Workspace) {
    let repo = JsonFileRepository::new(&workspace.settings.data_file);
    repo.save(&TreeSnapshot::empty(), None).unwrap();
    let mut next = TreeSnapshot::empty();
    next.version = 1;

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let repo = repo.clone();
                let next = next.clone();
                s.spawn(move || repo.save(&next, Some(0)))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().filter_map(|r| r.as_ref().err()).all(|e| matches!(
        e,
        InfraError::StaleFile { expected: 0, actual: 1 } | InfraError::Locked { .. }
    )));
    assert_eq!(repo.load().unwrap().unwrap().version, 1);
    assert!(!lock_path(repo.path()).exists());
}

#[test]
fn given_in_memory_repository_when_used_by_container_then_round_trips() {
    testing::init_test_setup();
    let repo = Arc::new(InMemoryRepository::new());
    let container = ServiceContainer::with_deps(Settings::default(), repo.clone());
    let service = container.open().unwrap();
    service
        .create_node(Some(0), None, NodeKind::OrgUnit, None, company("Acme"))
        .unwrap();

    container.persist(&service, 0).unwrap();

    let stored = repo.load().unwrap().unwrap();
    assert_eq!(stored.version, 1);
    assert_eq!(stored.nodes.len(), 1);
}

#[test]
fn given_stored_snapshot_when_opened_then_version_carried_over() {
    let mut snapshot = TreeSnapshot::empty();
    snapshot.version = 41;
    let container = ServiceContainer::with_deps(
        Settings::default(),
        Arc::new(InMemoryRepository::with_snapshot(snapshot)),
    );

    let service = container.open().unwrap();

    assert_eq!(service.version().unwrap(), 41);
}
