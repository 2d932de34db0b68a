//! Request coalescing: collapses concurrent callers that share a key onto
//! one execution of the underlying work function.
//!
//! This is a deduplication primitive, not a lock: at most one execution is in
//! flight per key, and callers with different keys never exclude each other.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

struct Call<T> {
    result: Mutex<Option<T>>,
    done: Condvar,
}

pub struct SingleFlight<K, T> {
    calls: Mutex<HashMap<K, Arc<Call<T>>>>,
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    pub fn new() -> Self {
        SingleFlight {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Run `work` under `key`, or attach to an in-flight call with the same
    /// key and receive its result.
    pub fn run<F>(&self, key: K, work: F) -> T
    where
        F: FnOnce() -> T,
    {
        let call = {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = calls.get(&key) {
                let call = Arc::clone(existing);
                drop(calls);
                return Self::wait(&call);
            }
            let call = Arc::new(Call {
                result: Mutex::new(None),
                done: Condvar::new(),
            });
            calls.insert(key.clone(), Arc::clone(&call));
            call
        };

        let value = work();

        {
            let mut slot = call.result.lock().unwrap_or_else(PoisonError::into_inner);
            *slot = Some(value.clone());
        }
        call.done.notify_all();
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);

        value
    }

    fn wait(call: &Call<T>) -> T {
        let mut slot = call.result.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(value) = slot.as_ref() {
                return value.clone();
            }
            slot = call
                .done
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl<K, T> Default for SingleFlight<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
