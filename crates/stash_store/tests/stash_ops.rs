//! Engine operation tests: round-trips, overlays, terminal removes, find
//! predicates, and section/GUID boundary behaviour.

mod common;

use common::{fields, new_stash};
use stash_store::{CancelFlag, FieldValue, StashError};

#[test]
fn insert_then_get_round_trip() {
    let stash = new_stash();
    let to = fields(&[
        ("tag", "#t0".into()),
        ("text", "hello".into()),
        ("int_value", 0i64.into()),
    ]);

    let guid = stash.insert(1, to.clone()).unwrap();
    assert!(!guid.is_empty());
    assert_eq!(stash.get(&guid).unwrap(), to);
}

#[test]
fn update_overlays_values() {
    let stash = new_stash();
    let guid = stash.insert(2, fields(&[("a", 1i64.into())])).unwrap();

    stash
        .update(&guid, fields(&[("a", 2i64.into()), ("b", "x".into())]))
        .unwrap();

    assert_eq!(
        stash.get(&guid).unwrap(),
        fields(&[("a", 2i64.into()), ("b", "x".into())])
    );
}

#[test]
fn replace_overwrites_the_field_set() {
    let stash = new_stash();
    let guid = stash
        .insert(1, fields(&[("a", 1i64.into()), ("b", "x".into())]))
        .unwrap();

    stash.replace(&guid, fields(&[("c", 3i64.into())])).unwrap();

    assert_eq!(stash.get(&guid).unwrap(), fields(&[("c", 3i64.into())]));
}

#[test]
fn remove_is_terminal() {
    let stash = new_stash();
    let guid = stash.insert(3, fields(&[("k", "v".into())])).unwrap();

    stash.remove(&guid).unwrap();
    assert_eq!(stash.get(&guid), Err(StashError::RecordNotFound));
    assert_eq!(
        stash.update(&guid, fields(&[("k", "w".into())])),
        Err(StashError::RecordNotFound)
    );
    assert_eq!(stash.get(&guid), Err(StashError::RecordNotFound));
    assert_eq!(stash.remove(&guid), Err(StashError::RecordNotFound));
}

#[test]
fn find_applies_the_predicate() {
    let stash = new_stash();
    for int_val in [1i64, 20, 3] {
        stash
            .insert(
                1,
                fields(&[
                    ("tag", "#tag1".into()),
                    ("text", "sample text".into()),
                    ("int_val", int_val.into()),
                ]),
            )
            .unwrap();
    }

    let records = stash
        .find(1, &CancelFlag::new(), |fields| {
            match fields.get("int_val") {
                Some(FieldValue::Int(v)) if *v < 10 => (true, false),
                _ => (false, false),
            }
        })
        .unwrap();

    assert_eq!(records.len(), 2);
    let mut values: Vec<i64> = records
        .iter()
        .map(|record| match record.fields.get("int_val") {
            Some(FieldValue::Int(v)) => *v,
            other => panic!("unexpected int_val: {other:?}"),
        })
        .collect();
    values.sort_unstable();
    assert_eq!(values, [1, 3]);
}

#[test]
fn find_stops_when_the_predicate_says_so() {
    let stash = new_stash();
    for i in 0..5i64 {
        stash.insert(1, fields(&[("n", i.into())])).unwrap();
    }

    let records = stash
        .find(1, &CancelFlag::new(), |_| (true, true))
        .unwrap();
    assert_eq!(records.len(), 1);
}

#[test]
fn find_only_sees_the_requested_section() {
    let stash = new_stash();
    let in_section = stash.insert(1, fields(&[("n", 1i64.into())])).unwrap();
    stash.insert(2, fields(&[("n", 2i64.into())])).unwrap();

    let records = stash
        .find(1, &CancelFlag::new(), |_| (true, false))
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].guid, in_section);
}

#[test]
fn cancelled_find_returns_early() {
    let stash = new_stash();
    stash.insert(1, fields(&[("n", 1i64.into())])).unwrap();

    let cancel = CancelFlag::new();
    cancel.cancel();
    let records = stash.find(1, &cancel, |_| (true, false)).unwrap();
    assert!(records.is_empty());
}

#[test]
fn reserved_sections_are_rejected() {
    let stash = new_stash();
    assert_eq!(
        stash.insert(0, fields(&[("k", "v".into())])),
        Err(StashError::InvalidSection)
    );
    assert_eq!(
        stash.insert(255, fields(&[("k", "v".into())])),
        Err(StashError::InvalidSection)
    );
    // Every data section is accepted.
    assert!(stash.insert(1, fields(&[])).is_ok());
    assert!(stash.insert(254, fields(&[])).is_ok());
}

#[test]
fn unknown_guid_misses() {
    let stash = new_stash();
    assert_eq!(
        stash.get("no-such-guid"),
        Err(StashError::RecordNotFound)
    );
    assert_eq!(
        stash.update("no-such-guid", fields(&[("k", "v".into())])),
        Err(StashError::RecordNotFound)
    );
    assert_eq!(stash.remove("no-such-guid"), Err(StashError::RecordNotFound));
}

#[test]
fn empty_field_set_round_trips() {
    let stash = new_stash();
    let guid = stash.insert(1, fields(&[])).unwrap();
    assert!(!guid.is_empty());
    assert!(stash.get(&guid).unwrap().is_empty());
}

#[test]
fn find_tracks_the_live_record_set() {
    let stash = new_stash();
    let mut live = Vec::new();

    for i in 0..20i64 {
        let guid = stash.insert(7, fields(&[("n", i.into())])).unwrap();
        live.push(guid);
    }
    // Remove every third record; update a few others.
    let mut removed = Vec::new();
    for (i, guid) in live.clone().into_iter().enumerate() {
        if i % 3 == 0 {
            stash.remove(&guid).unwrap();
            removed.push(guid);
        } else if i % 3 == 1 {
            stash
                .update(&guid, fields(&[("n", (-1i64).into())]))
                .unwrap();
        }
    }
    live.retain(|guid| !removed.contains(guid));

    let mut reported: Vec<_> = stash
        .find(7, &CancelFlag::new(), |_| (true, false))
        .unwrap()
        .into_iter()
        .map(|record| record.guid)
        .collect();
    reported.sort();
    live.sort();
    assert_eq!(reported, live);
}

#[test]
fn guids_stay_unique_across_records() {
    let stash = new_stash();
    let mut guids: Vec<_> = (0..64)
        .map(|i| stash.insert(1, fields(&[("n", i64::from(i).into())])).unwrap())
        .collect();
    guids.sort();
    guids.dedup();
    assert_eq!(guids.len(), 64);
}
