use std::collections::HashSet;
use std::hash::Hash;

use dashmap::DashMap;

/// Counts of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileStats {
    /// Keys written from the fresh result set.
    pub upserted: usize,
    /// Previously cached keys absent from the fresh result set.
    pub removed: usize,
}

impl ReconcileStats {
    /// Adds another pass to this one.
    pub fn absorb(&mut self, other: ReconcileStats) {
        self.upserted += other.upserted;
        self.removed += other.removed;
    }
}

/// Two-level map whose keys are grouped by a reload scope.
pub(crate) struct ScopedMap<S, K, V>
where
    S: Eq + Hash + Clone,
    K: Eq + Hash + Clone,
{
    entries: DashMap<(S, K), V>,
    index: DashMap<S, HashSet<K>>,
}

impl<S, K, V> Default for ScopedMap<S, K, V>
where
    S: Eq + Hash + Clone,
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            index: DashMap::new(),
        }
    }
}

impl<S, K, V> ScopedMap<S, K, V>
where
    S: Eq + Hash + Clone,
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub(crate) fn get(&self, scope: &S, key: &K) -> Option<V> {
        self.entries
            .get(&(scope.clone(), key.clone()))
            .map(|entry| entry.value().clone())
    }

    pub(crate) fn keys(&self, scope: &S) -> Vec<K> {
        self.index
            .get(scope)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn entries(&self, scope: &S) -> Vec<(K, V)> {
        self.keys(scope)
            .into_iter()
            .filter_map(|key| self.get(scope, &key).map(|value| (key, value)))
            .collect()
    }

    pub(crate) fn scopes(&self) -> Vec<S> {
        self.index.iter().map(|entry| entry.key().clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Replaces the content of one scope with `fresh`.
    ///
    /// Fresh keys are written first, stale keys are removed afterwards.
    pub(crate) fn replace_scope(&self, scope: S, fresh: Vec<(K, V)>) -> ReconcileStats {
        let fresh_keys: HashSet<K> = fresh.iter().map(|(key, _)| key.clone()).collect();
        let upserted = fresh.len();

        self.index
            .entry(scope.clone())
            .or_default()
            .extend(fresh_keys.iter().cloned());

        for (key, value) in fresh {
            self.entries.insert((scope.clone(), key), value);
        }

        let stale: Vec<K> = self
            .index
            .get(&scope)
            .map(|keys| {
                keys.iter()
                    .filter(|key| !fresh_keys.contains(*key))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        for key in &stale {
            self.entries.remove(&(scope.clone(), key.clone()));
        }

        if fresh_keys.is_empty() {
            self.index.remove(&scope);
        } else {
            self.index.insert(scope, fresh_keys);
        }

        ReconcileStats {
            upserted,
            removed: stale.len(),
        }
    }
}
