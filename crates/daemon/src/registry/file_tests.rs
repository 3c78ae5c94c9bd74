// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::{TimeZone, Utc};
use std::collections::BTreeSet;

fn entry(address: &str) -> HandlerEntry {
    let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let methods: BTreeSet<String> = ["echo".to_string()].into();
    HandlerEntry::new(address, methods, now)
}

#[test]
fn missing_file_is_an_empty_registry() {
    let dir = tempfile::tempdir().unwrap();
    let entries = load(&dir.path().join("registry.toml")).unwrap();
    assert!(entries.is_empty());
}

#[test]
fn save_then_load_roundtrips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.toml");

    let mut entries = BTreeMap::new();
    entries.insert("worker-a".to_string(), entry("127.0.0.1:4244"));
    entries.insert("worker-b".to_string(), entry("127.0.0.1:4245"));
    save_atomic(&path, &entries).unwrap();

    let loaded = load(&path).unwrap();
    assert_eq!(loaded, entries);
}

#[test]
fn document_is_human_readable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.toml");

    let mut entries = BTreeMap::new();
    entries.insert("worker-a".to_string(), entry("127.0.0.1:4244"));
    save_atomic(&path, &entries).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("[worker-a]"), "got: {text}");
    assert!(text.contains("address = \"127.0.0.1:4244\""), "got: {text}");
    // No temp file left behind.
    assert!(!path.with_extension("tmp").exists());
}

#[test]
fn garbage_file_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.toml");
    std::fs::write(&path, "not = [valid").unwrap();
    assert!(matches!(load(&path).unwrap_err(), RegistryFileError::Parse(_)));
}
