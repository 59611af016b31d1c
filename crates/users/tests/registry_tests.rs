//! Integration tests for the identity registry

use std::sync::Arc;
use std::thread;

use parley_users::{PresenceStatus, UpdateUserRequest, User, UserError, UserRegistry};

fn seeded_registry() -> UserRegistry {
    let registry = UserRegistry::new();
    registry
        .register(User::new("alice", "Alice").with_avatar("https://example.com/a.png"))
        .unwrap();
    registry
        .register(User::new("bob", "Bob").with_email("bob@example.com"))
        .unwrap();
    registry
}

#[test]
fn test_registry_crud_flow() {
    let registry = seeded_registry();

    let updated = registry
        .update(
            "alice",
            &UpdateUserRequest {
                display_name: Some("Alice L.".to_string()),
                presence: Some(PresenceStatus::Available),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(updated.display_name, "Alice L.");
    assert_eq!(registry.get("alice").unwrap(), updated);

    let removed = registry.remove("bob").unwrap();
    assert_eq!(removed.email.as_deref(), Some("bob@example.com"));
    assert!(matches!(registry.get("bob"), Err(UserError::UserNotFound { .. })));
    assert!(registry.resolve("bob").is_tombstone());
}

#[test]
fn test_invalid_registrations_are_rejected() {
    let registry = UserRegistry::new();

    assert!(matches!(
        registry.register(User::new("", "Nobody")),
        Err(UserError::Validation { .. })
    ));
    assert!(matches!(
        registry.register(User::new("carol", "  ")),
        Err(UserError::Validation { .. })
    ));
    assert!(registry.is_empty());
}

#[test]
fn test_invalid_update_leaves_profile_unchanged() {
    let registry = seeded_registry();

    let result = registry.update(
        "bob",
        &UpdateUserRequest {
            display_name: Some(String::new()),
            ..Default::default()
        },
    );
    assert!(result.is_err());
    assert_eq!(registry.get("bob").unwrap().display_name, "Bob");
}

#[test]
fn test_reregistration_after_removal() {
    let registry = seeded_registry();
    registry.remove("alice").unwrap();
    assert!(registry.is_removed("alice"));

    registry.register(User::new("alice", "Alice Again")).unwrap();
    assert!(!registry.is_removed("alice"));
    assert!(!registry.resolve("alice").is_tombstone());
}

#[test]
fn test_concurrent_readers_and_writers() {
    let registry = Arc::new(UserRegistry::new());

    let writers: Vec<_> = (0..8)
        .map(|i| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                registry
                    .register(User::new(format!("user-{i}"), format!("User {i}")))
                    .unwrap();
            })
        })
        .collect();

    let reader = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            for _ in 0..100 {
                let _ = registry.list();
            }
        })
    };

    for handle in writers {
        handle.join().unwrap();
    }
    reader.join().unwrap();

    assert_eq!(registry.len(), 8);
}
