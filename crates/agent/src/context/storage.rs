//! Typed key-value storage owned by an [`AgentContext`](super::AgentContext).
//!
//! Every slot is keyed by a stable string. Reads are type-checked and fail
//! loudly: a missing slot and a slot holding the wrong type are both errors,
//! never a silently-defaulted value.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::AgentError;

/// A typed handle to one storage slot.
///
/// ```
/// use weft_agent::context::StorageKey;
///
/// const ATTEMPTS: StorageKey<u32> = StorageKey::new("attempts");
/// assert_eq!(ATTEMPTS.name(), "attempts");
/// ```
pub struct StorageKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StorageKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for StorageKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StorageKey<T> {}

impl<T> std::fmt::Debug for StorageKey<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageKey<{}>({})", type_name::<T>(), self.name)
    }
}

/// Per-run values written by nodes and features.
#[derive(Default)]
pub struct ContextStorage {
    slots: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl ContextStorage {
    pub fn insert<T: Any + Send + Sync>(&mut self, key: StorageKey<T>, value: T) {
        self.slots.insert(key.name, Box::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self, key: StorageKey<T>) -> Result<&T, AgentError> {
        self.slots
            .get(key.name)
            .ok_or_else(|| AgentError::StorageMissing(key.name.to_string()))?
            .downcast_ref::<T>()
            .ok_or_else(|| AgentError::StorageTypeMismatch {
                key: key.name.to_string(),
                expected: type_name::<T>(),
            })
    }

    pub fn get_mut<T: Any + Send + Sync>(&mut self, key: StorageKey<T>) -> Result<&mut T, AgentError> {
        self.slots
            .get_mut(key.name)
            .ok_or_else(|| AgentError::StorageMissing(key.name.to_string()))?
            .downcast_mut::<T>()
            .ok_or_else(|| AgentError::StorageTypeMismatch {
                key: key.name.to_string(),
                expected: type_name::<T>(),
            })
    }

    pub fn contains<T>(&self, key: StorageKey<T>) -> bool {
        self.slots.contains_key(key.name)
    }

    /// Remove a slot, returning its value if it held a `T`.
    pub fn remove<T: Any + Send + Sync>(&mut self, key: StorageKey<T>) -> Option<T> {
        let boxed = self.slots.remove(key.name)?;
        boxed.downcast::<T>().ok().map(|b| *b)
    }
}

/// Installed feature instances, keyed by each feature's stable key.
#[derive(Clone, Default)]
pub struct FeatureSet {
    features: HashMap<&'static str, Arc<dyn Any + Send + Sync>>,
}

impl FeatureSet {
    /// Add a feature. Returns `false` if the key was already taken.
    pub fn insert<F: Any + Send + Sync>(&mut self, key: &'static str, feature: Arc<F>) -> bool {
        if self.features.contains_key(key) {
            return false;
        }
        self.features.insert(key, feature);
        true
    }

    pub fn get<F: Any + Send + Sync>(&self, key: &'static str) -> Result<Arc<F>, AgentError> {
        let feature = self
            .features
            .get(key)
            .ok_or_else(|| AgentError::FeatureNotInstalled(key.to_string()))?;
        Arc::clone(feature)
            .downcast::<F>()
            .map_err(|_| AgentError::FeatureTypeMismatch {
                key: key.to_string(),
                expected: type_name::<F>(),
            })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.features.contains_key(key)
    }

    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys: Vec<_> = self.features.keys().copied().collect();
        keys.sort_unstable();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNTER: StorageKey<u32> = StorageKey::new("counter");
    const COUNTER_AS_TEXT: StorageKey<String> = StorageKey::new("counter");

    #[test]
    fn typed_slots_fail_loudly() {
        let mut storage = ContextStorage::default();
        assert!(matches!(storage.get(COUNTER), Err(AgentError::StorageMissing(_))));

        storage.insert(COUNTER, 1);
        *storage.get_mut(COUNTER).unwrap() += 1;
        assert_eq!(*storage.get(COUNTER).unwrap(), 2);

        let err = storage.get(COUNTER_AS_TEXT).unwrap_err();
        assert!(matches!(err, AgentError::StorageTypeMismatch { .. }));

        assert_eq!(storage.remove(COUNTER), Some(2));
        assert!(!storage.contains(COUNTER));
    }

    #[test]
    fn features_are_unique_and_type_checked() {
        let mut set = FeatureSet::default();
        assert!(set.insert("tracing", Arc::new(5u8)));
        assert!(!set.insert("tracing", Arc::new(6u8)));

        assert_eq!(*set.get::<u8>("tracing").unwrap(), 5);
        assert!(matches!(
            set.get::<String>("tracing"),
            Err(AgentError::FeatureTypeMismatch { .. })
        ));
        assert!(matches!(
            set.get::<u8>("persistency"),
            Err(AgentError::FeatureNotInstalled(_))
        ));
    }
}
