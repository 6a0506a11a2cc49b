//! A `put` that violates a unique-index constraint must leave the
//! byte-store byte-for-byte as it was before the call — no partial write
//! from the primary blob or from any index family.

use std::sync::Arc;

use themis_entity::{Entity, FieldValue};
use themis_index::IndexEngine;
use themis_store::{ByteStore, MemoryStore};

fn user(pk: &str, email: &str) -> Entity {
    let mut e = Entity::new(pk);
    e.set_field("email", FieldValue::Str(email.to_string()));
    e
}

#[test]
fn put_enforces_unique_constraint_atomically() {
    let store = Arc::new(MemoryStore::new());
    let engine = IndexEngine::new(store.clone() as Arc<dyn ByteStore>);
    engine.create_index("users", "email", true).unwrap();

    engine.put("users", &user("u1", "alice@example.com")).unwrap();

    let before = store.snapshot();
    let result = engine.put("users", &user("u2", "alice@example.com"));
    assert!(result.is_err());
    let after = store.snapshot();

    assert_eq!(before, after, "a rejected unique-constraint put must not mutate the store at all");
}

#[test]
fn put_allows_same_pk_to_rewrite_its_own_unique_value() {
    let store = Arc::new(MemoryStore::new());
    let engine = IndexEngine::new(store as Arc<dyn ByteStore>);
    engine.create_index("users", "email", true).unwrap();

    engine.put("users", &user("u1", "alice@example.com")).unwrap();
    engine.put("users", &user("u1", "alice2@example.com")).unwrap();

    assert_eq!(engine.scan_equal("users", "email", "alice2@example.com"), vec!["u1".to_string()]);
    assert!(engine.scan_equal("users", "email", "alice@example.com").is_empty());
}

#[test]
fn concurrent_puts_for_the_same_unique_value_admit_only_one() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(IndexEngine::new(store as Arc<dyn ByteStore>));
    engine.create_index("users", "email", true).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = engine.clone();
            std::thread::spawn(move || engine.put("users", &user(&format!("u{i}"), "shared@example.com")))
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let ok_count = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok_count, 1, "exactly one concurrent put should win the unique value");
    assert_eq!(engine.scan_equal("users", "email", "shared@example.com").len(), 1);
}
