use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use indexmap::IndexMap;

/// Fingerprint of a joint configuration
///
/// Two keys are equal only when both the hash and the bit patterns of
/// every value match, so a hash collision never returns a wrong entry.
#[derive(Debug, Clone)]
pub struct ConfigKey {
    fingerprint: u64,
    bits: Vec<u64>,
}

impl ConfigKey {
    pub fn new(values: &[f64]) -> Self {
        let bits: Vec<u64> = values.iter().map(|v| v.to_bits()).collect();
        let mut hasher = DefaultHasher::new();
        bits.hash(&mut hasher);
        Self {
            fingerprint: hasher.finish(),
            bits,
        }
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn values(&self) -> Vec<f64> {
        self.bits.iter().map(|b| f64::from_bits(*b)).collect()
    }

    #[cfg(test)]
    fn with_fingerprint(values: &[f64], fingerprint: u64) -> Self {
        Self {
            fingerprint,
            ..Self::new(values)
        }
    }
}

impl PartialEq for ConfigKey {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint && self.bits == other.bits
    }
}

impl Eq for ConfigKey {}

impl Hash for ConfigKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.fingerprint);
    }
}

/// Small memo store with least-recently-used eviction
///
/// Entries are ordered from the least to the most recently used one.
/// Not thread safe: use one instance per worker.
#[derive(Debug, Clone)]
pub struct Cache<K, V, const CAPACITY: usize>
where
    K: Hash + Eq,
{
    entries: IndexMap<K, V>,
}

impl<K, V, const CAPACITY: usize> Cache<K, V, CAPACITY>
where
    K: Hash + Eq,
{
    const NON_ZERO_CAPACITY: () = assert!(CAPACITY > 0, "cache capacity must be positive");

    /// Fails to compile when `CAPACITY` is zero
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NON_ZERO_CAPACITY;
        Self {
            entries: IndexMap::with_capacity(CAPACITY),
        }
    }

    /// Look up `key` and mark it as the most recently used entry on a hit
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let index = self.entries.get_index_of(key)?;
        let last = self.entries.len() - 1;
        self.entries.move_index(index, last);
        self.entries.get_index(last).map(|(_, v)| v)
    }

    /// Insert `value`, evicting the least recently used entry when full
    pub fn put(&mut self, key: K, value: V) {
        if let Some(index) = self.entries.get_index_of(&key) {
            self.entries[index] = value;
            let last = self.entries.len() - 1;
            self.entries.move_index(index, last);
            return;
        }
        if self.entries.len() == CAPACITY {
            self.entries.shift_remove_index(0);
        }
        self.entries.insert(key, value);
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        CAPACITY
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<K, V, const CAPACITY: usize> Default for Cache<K, V, CAPACITY>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_key_equality() {
        let a = ConfigKey::new(&[0.1, 0.2]);
        let b = ConfigKey::new(&[0.1, 0.2]);
        let c = ConfigKey::new(&[0.1, 0.2000000001]);
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a, c);
        assert_eq!(a.values(), vec![0.1, 0.2]);
        // bit patterns differ
        assert_ne!(ConfigKey::new(&[0.0]), ConfigKey::new(&[-0.0]));
    }

    #[test]
    fn test_fingerprint_collision_is_a_miss() {
        let mut cache = Cache::<ConfigKey, usize, 4>::new();
        cache.put(ConfigKey::with_fingerprint(&[1.0, 2.0], 42), 1);
        let colliding = ConfigKey::with_fingerprint(&[3.0, 4.0], 42);
        assert!(cache.get(&colliding).is_none());
        assert_eq!(
            cache.get(&ConfigKey::with_fingerprint(&[1.0, 2.0], 42)),
            Some(&1)
        );
    }

    #[test]
    fn test_lru_eviction() {
        let mut cache = Cache::<u32, u32, 3>::new();
        cache.put(1, 10);
        cache.put(2, 20);
        cache.put(3, 30);
        // 1 becomes the most recently used one
        assert_eq!(cache.get(&1), Some(&10));
        cache.put(4, 40);
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&2));
        assert!(cache.contains(&1));
        assert!(cache.contains(&3));
        assert!(cache.contains(&4));
    }

    #[test]
    fn test_put_existing_key_refreshes() {
        let mut cache = Cache::<u32, u32, 2>::new();
        cache.put(1, 10);
        cache.put(2, 20);
        cache.put(1, 11);
        cache.put(3, 30);
        assert_eq!(cache.get(&1), Some(&11));
        assert!(cache.get(&2).is_none());
        assert_eq!(cache.capacity(), 2);
    }
}
