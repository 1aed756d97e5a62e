//! Per-instance scratch storage

use destroyclaim_core::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Untyped key/value storage owned by one extension or claim.
///
/// Callbacks only ever see shared references, so the map sits behind a lock.
/// Values are JSON so anything a callback needs to carry between phases can
/// be stored without the engine knowing its type.
#[derive(Debug, Default)]
pub struct ScratchState {
    entries: Mutex<HashMap<String, Value>>,
}

impl ScratchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        check_key(key)?;
        Ok(self.lock().get(key).cloned())
    }

    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        check_key(key)?;
        self.lock().insert(key.to_string(), value);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        // A poisoned map still holds consistent JSON values.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::invalid_argument("state key must be a non-empty string"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_then_get() {
        let state = ScratchState::new();
        assert!(state.is_empty());
        state.set("attempts", json!(2)).unwrap();
        assert_eq!(state.get("attempts").unwrap(), Some(json!(2)));
        assert_eq!(state.get("missing").unwrap(), None);
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn overwrite_replaces_value() {
        let state = ScratchState::new();
        state.set("k", json!("a")).unwrap();
        state.set("k", json!({"b": true})).unwrap();
        assert_eq!(state.get("k").unwrap(), Some(json!({"b": true})));
    }

    #[test]
    fn empty_key_is_rejected() {
        let state = ScratchState::new();
        assert!(matches!(state.get(""), Err(Error::InvalidArgument(_))));
        assert!(matches!(state.set("", json!(1)), Err(Error::InvalidArgument(_))));
    }
}
