// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn upsert_generates_an_id_when_absent() {
    let store = FleetStore::new();
    let fleet = store.upsert(None, "Lobby screens".into(), vec!["d1".into()]);
    assert!(!fleet.id.is_empty());
    assert_eq!(store.get(&fleet.id).unwrap().name, "Lobby screens");
}

#[test]
fn upsert_replaces_an_existing_fleet() {
    let store = FleetStore::new();
    store.upsert(Some("lobby".into()), "Lobby".into(), vec!["d1".into()]);
    store.upsert(Some("lobby".into()), "Lobby v2".into(), vec!["d2".into(), "d3".into()]);

    let fleet = store.get("lobby").unwrap();
    assert_eq!(fleet.name, "Lobby v2");
    assert_eq!(fleet.members, vec!["d2".to_owned(), "d3".to_owned()]);
    assert_eq!(store.len(), 1);
}

#[test]
fn members_are_deduplicated_order_preserved() {
    let store = FleetStore::new();
    let fleet = store.upsert(
        Some("f".into()),
        "F".into(),
        vec!["d2".into(), "d1".into(), "d2".into(), String::new(), "d3".into()],
    );
    assert_eq!(fleet.members, vec!["d2".to_owned(), "d1".to_owned(), "d3".to_owned()]);
}

#[test]
fn list_is_sorted_by_id() {
    let store = FleetStore::new();
    store.upsert(Some("b".into()), "B".into(), vec![]);
    store.upsert(Some("a".into()), "A".into(), vec![]);
    let ids: Vec<String> = store.list().into_iter().map(|f| f.id).collect();
    assert_eq!(ids, vec!["a".to_owned(), "b".to_owned()]);
}

#[test]
fn remove_reports_existence() {
    let store = FleetStore::new();
    store.upsert(Some("x".into()), "X".into(), vec![]);
    assert!(store.remove("x"));
    assert!(!store.remove("x"));
    assert!(store.is_empty());
}

#[test]
fn members_of_unknown_fleet_is_none() {
    let store = FleetStore::new();
    assert!(store.members_of("ghost").is_none());

    store.upsert(Some("known".into()), "Known".into(), vec!["d1".into()]);
    assert_eq!(store.members_of("known").unwrap(), vec!["d1".to_owned()]);
}
