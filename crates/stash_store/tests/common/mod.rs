//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stash_store::{Config, FieldValue, Stash};

pub fn config_at(store_file: &Path, restore: bool) -> Config {
    Config {
        store_file: store_file.to_path_buf(),
        store_interval: Duration::ZERO,
        restore,
    }
}

/// Engine bound to `store_file`, optionally restoring it.
pub fn stash_at(store_file: &Path, restore: bool) -> Stash {
    Stash::new(&config_at(store_file, restore)).expect("construct stash")
}

/// Engine with no on-disk state: restore off, throwaway path.
pub fn new_stash() -> Stash {
    stash_at(&std::env::temp_dir().join("stash-tests-unused.data"), false)
}

pub fn fields(pairs: &[(&str, FieldValue)]) -> HashMap<String, FieldValue> {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// The three-field record shape the torture workers insert.
pub fn record_for(i: i64) -> HashMap<String, FieldValue> {
    HashMap::from([
        ("tag".to_string(), FieldValue::Str(format!("#tag{i}"))),
        ("text".to_string(), FieldValue::Str(format!("sample text {i}"))),
        (format!("int_val{i}"), FieldValue::Int(i)),
    ])
}

/// Deterministic varied field sets, mixing int and string fields.
pub fn generated_records(
    seed: u64,
    count: usize,
    fields_per_record: usize,
) -> Vec<HashMap<String, FieldValue>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            (0..fields_per_record)
                .map(|k| {
                    if rng.gen_bool(0.5) {
                        (
                            format!("int_val_{k}"),
                            FieldValue::Int(rng.gen_range(-1000..1000)),
                        )
                    } else {
                        (
                            format!("string_val_{k}"),
                            FieldValue::Str(format!("test string {}", rng.gen_range(0..1000))),
                        )
                    }
                })
                .collect()
        })
        .collect()
}
